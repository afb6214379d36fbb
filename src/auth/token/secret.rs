//! Redacting wrapper for bearer token material.

// self
use crate::_prelude::*;

/// Token secret that keeps bearer material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Renders the secret as an `Authorization: bearer …` header value.
	///
	/// Returns `None` when the secret contains bytes that are not valid in a header.
	pub fn bearer_header(&self) -> Option<HeaderValue> {
		let mut value = HeaderValue::from_str(&format!("bearer {}", self.0)).ok()?;

		value.set_sensitive(true);

		Some(value)
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}
