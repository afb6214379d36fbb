//! In-memory delegated token slot written by the sign-in subsystem.

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, TokenKind},
	store::DelegatedTokenSource,
};

/// Shared, cloneable slot holding the signed-in user's token.
///
/// The sign-in subsystem owns refreshes and calls [`set`](Self::set) or [`clear`](Self::clear);
/// the gateway only reads the slot.
#[derive(Clone, Debug, Default)]
pub struct SharedDelegatedToken(Arc<RwLock<Option<AccessToken>>>);
impl SharedDelegatedToken {
	/// Replaces the current token.
	///
	/// Tokens of any other kind are stored with their kind rewritten to
	/// [`TokenKind::Delegated`], since the slot only ever speaks for the user.
	pub fn set(&self, mut token: AccessToken) {
		token.kind = TokenKind::Delegated;

		*self.0.write() = Some(token);
	}

	/// Removes the current token (user signed out).
	pub fn clear(&self) {
		self.0.write().take();
	}

	/// Returns `true` while a token is stored, regardless of expiry.
	pub fn is_signed_in(&self) -> bool {
		self.0.read().is_some()
	}
}
impl DelegatedTokenSource for SharedDelegatedToken {
	fn delegated_token(&self) -> Option<AccessToken> {
		self.0.read().clone()
	}
}
