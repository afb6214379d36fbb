// self
use crate::obs::{OpKind, OpOutcome};

/// Records an operation outcome via the global metrics recorder (when enabled).
pub fn record_op_outcome(kind: OpKind, outcome: OpOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"paged_gateway_op_total",
			"op" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Publishes the remaining upstream budget after a response carried rate-limit metadata.
pub fn record_rate_limit_remaining(remaining: f64) {
	#[cfg(feature = "metrics")]
	{
		metrics::gauge!("paged_gateway_rate_limit_remaining").set(remaining);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = remaining;
	}
}

/// Emits the non-fatal low-budget signal.
pub fn record_low_budget(remaining: f64, reset_in_secs: i64) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(remaining, reset_in_secs, "upstream rate-limit budget is running low");
	}
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("paged_gateway_low_budget_total").increment(1);
	}

	#[cfg(not(any(feature = "tracing", feature = "metrics")))]
	{
		let _ = (remaining, reset_in_secs);
	}
}
