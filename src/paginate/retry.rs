// std
use std::time::Duration as StdDuration;
// self
use crate::paginate::PaginationConfig;

/// Capped exponential backoff for failed page loads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Delay after the first failure.
	pub base: StdDuration,
	/// Largest delay ever returned.
	pub cap: StdDuration,
	/// Consecutive failures that end automatic retries.
	pub max_retries: u32,
}
impl RetryPolicy {
	/// Delay before retrying after `failures` consecutive failures (1-based).
	///
	/// Grows as `base × 2^(failures − 1)` and never exceeds `cap`.
	pub fn delay_for(&self, failures: u32) -> StdDuration {
		let exponent = failures.saturating_sub(1).min(31);

		self.base.saturating_mul(1_u32 << exponent).min(self.cap)
	}

	/// Returns `true` while another automatic retry is allowed after `failures` failures.
	pub fn allows(&self, failures: u32) -> bool {
		failures < self.max_retries
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self::from(&PaginationConfig::default())
	}
}
impl From<&PaginationConfig> for RetryPolicy {
	fn from(config: &PaginationConfig) -> Self {
		Self {
			base: StdDuration::from_millis(config.retry_base_ms),
			cap: StdDuration::from_millis(config.retry_cap_ms),
			max_retries: config.max_retries,
		}
	}
}
