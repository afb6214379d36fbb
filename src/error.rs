//! Gateway-level error types shared across the token store, gateway, and pagination layers.

// self
use crate::_prelude::*;

/// Gateway-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical gateway error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// The application-only credential exchange was rejected or could not complete.
	#[error("Application token exchange failed: {reason}.")]
	TokenExchangeFailed {
		/// Provider- or gateway-supplied reason string.
		reason: String,
		/// HTTP status code returned by the token endpoint, when available.
		status: Option<u16>,
	},
	/// The upstream budget is spent until `reset_at`; the gateway waits this out internally.
	#[error("Upstream rate limit is exhausted until {reset_at}.")]
	RateLimitExceeded {
		/// Instant at which the upstream window resets.
		reset_at: OffsetDateTime,
	},
	/// Upstream answered with a non-success status.
	#[error("Upstream responded with HTTP {status}.")]
	UpstreamHttp {
		/// HTTP status code.
		status: u16,
		/// Truncated response body, when one was returned.
		body_preview: Option<String>,
	},
	/// Upstream returned a body that could not be decoded into the requested type.
	#[error("Upstream returned a body that could not be decoded.")]
	Decode {
		/// Structured parsing failure including the JSON path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code of the response.
		status: u16,
	},
	/// The operation was superseded or aborted; consumers must never surface it as a failure.
	#[error("Request was cancelled.")]
	Cancelled,
}
impl Error {
	/// Returns `true` when the error represents a superseded or aborted operation.
	pub fn is_cancelled(&self) -> bool {
		matches!(self, Self::Cancelled)
	}

	/// HTTP status attached to the error, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::TokenExchangeFailed { status, .. } => *status,
			Self::UpstreamHttp { status, .. } | Self::Decode { status, .. } => Some(*status),
			_ => None,
		}
	}

	/// Returns `true` when repeating the same call may succeed.
	pub fn is_retryable(&self) -> bool {
		!matches!(self, Self::Cancelled | Self::Config(_))
	}
}

/// Configuration and validation failures raised by the gateway.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// A configured or requested URL cannot be parsed.
	#[error("URL `{value}` is invalid.")]
	InvalidUrl {
		/// Offending input.
		value: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A caller-supplied header cannot be encoded.
	#[error("Header `{name}` has an invalid value.")]
	InvalidHeader {
		/// Header name.
		name: String,
	},
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}

	pub(crate) fn invalid_url(value: impl Into<String>, source: url::ParseError) -> Self {
		Self::InvalidUrl { value: value.into(), source }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO, deadlines).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the upstream.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the upstream.")]
	Io(#[from] std::io::Error),
	/// The request did not complete within the configured deadline.
	#[error("Upstream request timed out after {after}.")]
	TimedOut {
		/// Deadline that elapsed.
		after: Duration,
	},
	/// The transport reported a failure without a structured cause.
	#[error("HTTP client error occurred while calling the upstream: {message}.")]
	Other {
		/// Transport-supplied message.
		message: String,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
