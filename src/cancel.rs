//! Revocable cancellation scopes for outbound work.

// crates.io
use tokio::sync::watch;
// self
use crate::_prelude::*;

/// Cancellation handle carried by every outbound fetch.
///
/// Clones share the same flag. Once [`cancel`](Self::cancel) is called, work running under
/// [`run`](Self::run) resolves to [`Error::Cancelled`] and any result it produced afterwards
/// is discarded.
#[derive(Clone, Debug)]
pub struct CancelScope {
	flag: Arc<watch::Sender<bool>>,
}
impl CancelScope {
	/// Creates a live scope.
	pub fn new() -> Self {
		Self { flag: Arc::new(watch::Sender::new(false)) }
	}

	/// Revokes the scope. Idempotent.
	pub fn cancel(&self) {
		self.flag.send_replace(true);
	}

	/// Returns `true` once the scope has been revoked.
	pub fn is_cancelled(&self) -> bool {
		*self.flag.borrow()
	}

	/// Resolves when the scope is revoked.
	pub async fn cancelled(&self) {
		let mut rx = self.flag.subscribe();

		// The sender lives in `self`, so the channel cannot close while awaited.
		let _ = rx.wait_for(|cancelled| *cancelled).await;
	}

	/// Runs `fut` under this scope.
	///
	/// Returns [`Error::Cancelled`] when the scope is revoked before or while `fut` runs, and also
	/// when `fut` finishes but the scope was revoked in the meantime.
	pub async fn run<F, T>(&self, fut: F) -> Result<T>
	where
		F: Future<Output = Result<T>>,
	{
		if self.is_cancelled() {
			return Err(Error::Cancelled);
		}

		let result = tokio::select! {
			biased;
			_ = self.cancelled() => Err(Error::Cancelled),
			result = fut => result,
		};

		if self.is_cancelled() { Err(Error::Cancelled) } else { result }
	}
}
impl Default for CancelScope {
	fn default() -> Self {
		Self::new()
	}
}
