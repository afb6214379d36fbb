//! Upstream rate-limit window tracking.
//!
//! The upstream reports its budget through `x-ratelimit-*` response headers. The
//! [`RateLimitTracker`] overwrites its shared [`RateLimitWindow`] whenever a response carries
//! those headers, leaves it untouched when they are absent, and rolls the window back to the full
//! budget once the reset instant passes.

// self
use crate::{_prelude::*, obs};

/// Header carrying the remaining request budget (may be fractional).
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
/// Header carrying the number of requests spent in the current window.
pub const USED_HEADER: &str = "x-ratelimit-used";
/// Header carrying the seconds left until the window resets.
pub const RESET_HEADER: &str = "x-ratelimit-reset";
/// Header carrying the total budget of the window, when the upstream sends it.
pub const LIMIT_HEADER: &str = "x-ratelimit-limit";

/// Budget policy for one upstream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
	/// Full budget assumed for a fresh window.
	pub limit: u32,
	/// Length of a window in seconds, used when rolling over without upstream guidance.
	pub window_secs: u32,
	/// Requests are held back once `remaining` drops to this value.
	pub safety_buffer: u32,
	/// A low-budget signal is emitted when `remaining` drops below this value.
	pub low_budget_threshold: u32,
}
impl RateLimitConfig {
	/// Window length as a [`Duration`].
	pub fn window(&self) -> Duration {
		Duration::seconds(i64::from(self.window_secs))
	}
}
impl Default for RateLimitConfig {
	fn default() -> Self {
		Self { limit: 600, window_secs: 600, safety_buffer: 5, low_budget_threshold: 10 }
	}
}

/// Snapshot of the upstream budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitWindow {
	/// Requests left in the window.
	pub remaining: u32,
	/// Requests spent in the window.
	pub used: u32,
	/// Total budget of the window.
	pub limit: u32,
	/// Instant at which the upstream restores the full budget.
	pub reset_at: OffsetDateTime,
}
impl RateLimitWindow {
	/// Fresh window with the full budget starting at `now`.
	pub fn full(config: &RateLimitConfig, now: OffsetDateTime) -> Self {
		Self {
			remaining: config.limit,
			used: 0,
			limit: config.limit,
			reset_at: now + config.window(),
		}
	}

	/// Returns `true` once the reset instant has passed.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.reset_at
	}
}

/// Result of feeding a response into the tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BudgetSignal {
	/// The response carried no budget metadata.
	Untouched,
	/// The window was updated and the budget is comfortable.
	Healthy,
	/// The window was updated and the budget is below the low-budget threshold.
	Low,
}

/// Process-wide budget tracker shared by every gateway call.
#[derive(Debug)]
pub struct RateLimitTracker {
	config: RateLimitConfig,
	window: Mutex<RateLimitWindow>,
}
impl RateLimitTracker {
	/// Creates a tracker with a full window starting now.
	pub fn new(config: RateLimitConfig) -> Self {
		Self::starting_at(config, OffsetDateTime::now_utc())
	}

	/// Creates a tracker with a full window starting at `now`.
	pub fn starting_at(config: RateLimitConfig, now: OffsetDateTime) -> Self {
		Self { window: Mutex::new(RateLimitWindow::full(&config, now)), config }
	}

	/// Budget policy in effect.
	pub fn config(&self) -> &RateLimitConfig {
		&self.config
	}

	/// Copy of the current window.
	pub fn snapshot(&self) -> RateLimitWindow {
		*self.window.lock()
	}

	/// Feeds response headers into the window using the current clock.
	pub fn observe(&self, headers: &HeaderMap) -> BudgetSignal {
		self.observe_at(headers, OffsetDateTime::now_utc())
	}

	/// Feeds response headers into the window as if observed at `now`.
	///
	/// Headers that are present overwrite the matching fields; a response without any of them
	/// leaves the window exactly as it was.
	pub fn observe_at(&self, headers: &HeaderMap, now: OffsetDateTime) -> BudgetSignal {
		let remaining = header_number(headers, REMAINING_HEADER);
		let used = header_number(headers, USED_HEADER);
		let reset_in = header_number(headers, RESET_HEADER);
		let limit = header_number(headers, LIMIT_HEADER);

		if remaining.is_none() && used.is_none() && reset_in.is_none() && limit.is_none() {
			return BudgetSignal::Untouched;
		}

		let window = {
			let mut window = self.window.lock();

			if let Some(value) = remaining {
				window.remaining = value;
			}
			if let Some(value) = used {
				window.used = value;
			}
			if let Some(secs) = reset_in {
				window.reset_at = now + Duration::seconds(i64::from(secs));
			}

			match limit {
				Some(value) => window.limit = value,
				None if remaining.is_some() && used.is_some() =>
					window.limit = window.remaining.saturating_add(window.used),
				None => {},
			}

			*window
		};

		obs::record_rate_limit_remaining(f64::from(window.remaining));

		if window.remaining < self.config.low_budget_threshold {
			let reset_in_secs = (window.reset_at - now).whole_seconds();

			obs::record_low_budget(f64::from(window.remaining), reset_in_secs);

			BudgetSignal::Low
		} else {
			BudgetSignal::Healthy
		}
	}

	/// Marks the budget as spent for `delay` after `now`, as asked by a `Retry-After` hint.
	///
	/// The hint overwrites the reset instant the same way a fresh `x-ratelimit-reset` would.
	pub fn hold_for_at(&self, delay: Duration, now: OffsetDateTime) {
		let window = {
			let mut window = self.window.lock();

			window.remaining = 0;
			window.used = window.limit;
			window.reset_at = now + delay.max(Duration::ZERO);

			*window
		};

		obs::record_rate_limit_remaining(0.);
		obs::record_low_budget(0., (window.reset_at - now).whole_seconds());
	}

	/// Returns `true` when the budget is inside the safety buffer and the window has not reset.
	///
	/// An expired window is restored to the full budget as part of the check.
	pub fn is_limited_at(&self, now: OffsetDateTime) -> bool {
		let mut window = self.window.lock();

		if window.is_expired_at(now) {
			*window = RateLimitWindow::full(&self.config, now);

			return false;
		}

		window.remaining <= self.config.safety_buffer
	}

	/// Convenience helper that checks the window against the current clock.
	pub fn is_limited(&self) -> bool {
		self.is_limited_at(OffsetDateTime::now_utc())
	}

	/// Returns [`Error::RateLimitExceeded`] while [`is_limited_at`](Self::is_limited_at) holds.
	pub fn ensure_available_at(&self, now: OffsetDateTime) -> Result<()> {
		if self.is_limited_at(now) {
			return Err(Error::RateLimitExceeded { reset_at: self.window.lock().reset_at });
		}

		Ok(())
	}
}
impl Default for RateLimitTracker {
	fn default() -> Self {
		Self::new(RateLimitConfig::default())
	}
}

fn header_number(headers: &HeaderMap, name: &str) -> Option<u32> {
	let raw = headers.get(name)?.to_str().ok()?.trim();
	let value = raw.parse::<f64>().ok()?;

	if !value.is_finite() || value < 0. {
		return None;
	}

	// Fractional budgets round down so the safety buffer stays conservative.
	Some(value.floor().min(f64::from(u32::MAX)) as u32)
}
