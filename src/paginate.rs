//! Cursor pagination for continuous-scroll feeds.
//!
//! A [`PaginationController`] owns one feed's [`PaginationState`]: the de-duplicated item list,
//! the forward-only cursor, and the loading, exhaustion, and error flags. Page loads are strictly
//! sequential per controller and every load runs under a
//! [`CancelScope`](crate::cancel::CancelScope) so superseded results are dropped silently.
//! Failures are retried with capped exponential backoff on a revocable task; once the ceiling is
//! reached the error becomes terminal until [`PaginationController::retry`] or
//! [`PaginationController::refresh`] is called.
//!
//! Rendering layers drive loads through [`ProximitySignal`]s, which the controller debounces
//! before calling [`PaginationController::load_more`].

mod controller;
mod listing;
mod proximity;
mod retry;
mod state;

pub use controller::*;
pub use listing::*;
pub use proximity::*;
pub use retry::*;
pub use state::*;

// self
use crate::_prelude::*;

/// Tunables for a [`PaginationController`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
	/// Delay before the first retry, in milliseconds.
	pub retry_base_ms: u64,
	/// Upper bound for any retry delay, in milliseconds.
	pub retry_cap_ms: u64,
	/// Consecutive failures after which the error becomes terminal.
	pub max_retries: u32,
	/// Window in which proximity signals are coalesced, in milliseconds.
	pub debounce_ms: u64,
	/// Pages of already-seen items skipped in a row before a load gives up for now.
	pub empty_page_skip_cap: u32,
	/// Whether [`ProximitySignal::Preload`] triggers a fetch.
	pub preload_enabled: bool,
}
impl Default for PaginationConfig {
	fn default() -> Self {
		Self {
			retry_base_ms: 1_000,
			retry_cap_ms: 10_000,
			max_retries: 3,
			debounce_ms: 200,
			empty_page_skip_cap: 10,
			preload_enabled: true,
		}
	}
}
