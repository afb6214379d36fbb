//! Access token records, lifecycle helpers, and builders.

// self
use crate::{_prelude::*, auth::token::secret::TokenSecret};

/// Which principal a token speaks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
	/// Scoped to a signed-in end user; refreshed by an external subsystem.
	Delegated,
	/// Represents the application itself; minted by the client-credentials exchange.
	AppOnly,
}
impl TokenKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			TokenKind::Delegated => "delegated",
			TokenKind::AppOnly => "app_only",
		}
	}
}
impl Display for TokenKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Current lifecycle status for an access token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// Token may be attached to requests.
	Usable,
	/// Token is inside the safety margin before expiry and should be replaced.
	Expiring,
	/// Token exceeded its expiry instant.
	Expired,
}

/// Errors produced by [`AccessTokenBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum AccessTokenBuilderError {
	/// Issued when no token value was provided.
	#[error("Access token is required.")]
	MissingValue,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
}

/// Bearer credential with its expiry and granted scope.
#[derive(Clone, Serialize, Deserialize)]
pub struct AccessToken {
	/// Token value; callers must avoid logging it.
	pub value: TokenSecret,
	/// Principal the token represents.
	pub kind: TokenKind,
	/// Scope string returned by the issuer (may be empty).
	pub scope: String,
	/// Instant the token was minted.
	pub issued_at: OffsetDateTime,
	/// Instant after which the issuer rejects the token.
	pub expires_at: OffsetDateTime,
}
impl AccessToken {
	/// Returns a builder for the given token kind.
	pub fn builder(kind: TokenKind) -> AccessTokenBuilder {
		AccessTokenBuilder::new(kind)
	}

	/// Computes the lifecycle status at `instant`, treating the last `margin` before expiry as
	/// [`TokenStatus::Expiring`].
	pub fn status_at(&self, instant: OffsetDateTime, margin: Duration) -> TokenStatus {
		if instant >= self.expires_at {
			return TokenStatus::Expired;
		}
		if instant >= self.expires_at - margin {
			return TokenStatus::Expiring;
		}

		TokenStatus::Usable
	}

	/// Returns `true` while `instant < expires_at - margin`.
	pub fn is_usable_at(&self, instant: OffsetDateTime, margin: Duration) -> bool {
		matches!(self.status_at(instant, margin), TokenStatus::Usable)
	}

	/// Convenience helper that checks usability against the current UTC instant.
	pub fn is_usable(&self, margin: Duration) -> bool {
		self.is_usable_at(OffsetDateTime::now_utc(), margin)
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessToken")
			.field("value", &"<redacted>")
			.field("kind", &self.kind)
			.field("scope", &self.scope)
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Builder for [`AccessToken`].
#[derive(Clone, Debug)]
pub struct AccessTokenBuilder {
	kind: TokenKind,
	value: Option<TokenSecret>,
	scope: String,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl AccessTokenBuilder {
	fn new(kind: TokenKind) -> Self {
		Self {
			kind,
			value: None,
			scope: String::new(),
			issued_at: None,
			expires_at: None,
			expires_in: None,
		}
	}

	/// Provides the token value.
	pub fn value(mut self, token: impl Into<String>) -> Self {
		self.value = Some(TokenSecret::new(token));

		self
	}

	/// Sets the granted scope string.
	pub fn scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = scope.into();

		self
	}

	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Consumes the builder and produces an [`AccessToken`].
	pub fn build(self) -> Result<AccessToken, AccessTokenBuilderError> {
		let value = self.value.ok_or(AccessTokenBuilderError::MissingValue)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) => issued_at + delta,
			(None, None) => return Err(AccessTokenBuilderError::MissingExpiry),
		};

		Ok(AccessToken { value, kind: self.kind, scope: self.scope, issued_at, expires_at })
	}
}
