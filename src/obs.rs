//! Optional observability helpers for gateway operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `paged_gateway.op` with the `op` (operation)
//!   and `stage` (call site) fields, plus a warning whenever the upstream budget runs low.
//! - Enable `metrics` to increment the `paged_gateway_op_total` counter for every
//!   attempt/success/failure/cancellation, labeled by `op` + `outcome`, and to publish the
//!   `paged_gateway_rate_limit_remaining` gauge.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operation kinds observed by the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// Application-only client-credentials exchange.
	TokenExchange,
	/// Upstream content request dispatched by the gateway.
	Fetch,
	/// One page load driven by a pagination controller.
	PageLoad,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::TokenExchange => "token_exchange",
			OpKind::Fetch => "fetch",
			OpKind::PageLoad => "page_load",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to a gateway helper.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
	/// Superseded or aborted work whose result was discarded.
	Cancelled,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
			OpOutcome::Cancelled => "cancelled",
		}
	}

	/// Classifies a finished operation.
	pub fn of<T>(result: &Result<T>) -> Self {
		match result {
			Ok(_) => OpOutcome::Success,
			Err(err) if err.is_cancelled() => OpOutcome::Cancelled,
			Err(_) => OpOutcome::Failure,
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
