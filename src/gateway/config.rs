// std
use std::time::Duration as StdDuration;
// crates.io
use rand::Rng;
// self
use crate::_prelude::*;

/// Randomized delay applied before every dispatch to stay under upstream burst limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacingPolicy {
	/// Lower bound of the delay in milliseconds.
	pub min_ms: u64,
	/// Upper bound of the delay in milliseconds (inclusive).
	pub max_ms: u64,
}
impl PacingPolicy {
	/// Policy that never delays.
	pub const fn disabled() -> Self {
		Self { min_ms: 0, max_ms: 0 }
	}

	/// Policy that always waits exactly `ms` milliseconds.
	pub const fn fixed(ms: u64) -> Self {
		Self { min_ms: ms, max_ms: ms }
	}

	/// Draws one delay uniformly from the configured range.
	pub fn sample(&self) -> StdDuration {
		let low = self.min_ms.min(self.max_ms);
		let high = self.min_ms.max(self.max_ms);

		if high == 0 {
			return StdDuration::ZERO;
		}

		let ms = if low == high { low } else { rand::rng().random_range(low..=high) };

		StdDuration::from_millis(ms)
	}
}
impl Default for PacingPolicy {
	fn default() -> Self {
		Self { min_ms: 2_000, max_ms: 3_000 }
	}
}

/// Tunables for [`Gateway`](crate::gateway::Gateway) dispatch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
	/// Identifying `User-Agent` attached when the caller did not set one.
	pub user_agent: String,
	/// Pre-dispatch pacing delay.
	pub pacing: PacingPolicy,
	/// Extra wait added on top of the rate-limit reset instant.
	pub reset_buffer_ms: u64,
	/// Deadline for one upstream request, from dispatch to full body.
	pub request_timeout_ms: u64,
	/// Tokens are treated as expired this long before their advertised expiry.
	pub token_safety_margin_secs: u64,
}
impl GatewayConfig {
	/// `User-Agent` sent when none is configured.
	pub const DEFAULT_USER_AGENT: &'static str =
		concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

	/// Overrides the pacing policy.
	pub fn with_pacing(mut self, pacing: PacingPolicy) -> Self {
		self.pacing = pacing;

		self
	}

	/// Overrides the identifying `User-Agent`.
	pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.user_agent = user_agent.into();

		self
	}

	/// Overrides the per-request deadline.
	pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout_ms = duration_ms(timeout);

		self
	}

	/// Overrides the buffer added after a rate-limit reset.
	pub fn with_reset_buffer(mut self, buffer: Duration) -> Self {
		self.reset_buffer_ms = duration_ms(buffer);

		self
	}

	/// Overrides the token safety margin.
	pub fn with_token_safety_margin(mut self, margin: Duration) -> Self {
		self.token_safety_margin_secs = u64::try_from(margin.whole_seconds()).unwrap_or(0);

		self
	}

	/// Per-request deadline.
	pub fn request_timeout(&self) -> Duration {
		millis(self.request_timeout_ms)
	}

	/// Buffer added after a rate-limit reset.
	pub fn reset_buffer(&self) -> Duration {
		millis(self.reset_buffer_ms)
	}

	/// Token safety margin.
	pub fn token_safety_margin(&self) -> Duration {
		Duration::seconds(i64::try_from(self.token_safety_margin_secs).unwrap_or(i64::MAX))
	}
}
impl Default for GatewayConfig {
	fn default() -> Self {
		Self {
			user_agent: Self::DEFAULT_USER_AGENT.into(),
			pacing: PacingPolicy::default(),
			reset_buffer_ms: 1_000,
			request_timeout_ms: 30_000,
			token_safety_margin_secs: 60,
		}
	}
}

fn millis(ms: u64) -> Duration {
	Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
}

fn duration_ms(duration: Duration) -> u64 {
	u64::try_from(duration.whole_milliseconds()).unwrap_or(0)
}
