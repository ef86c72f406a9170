//! Metric helpers for `connection_throttle`.
//!
//! This module defines metric names and simple helper functions
//! wrapping the [`metrics`](https://docs.rs/metrics) crate. Without the
//! `metrics` feature the helpers compile to no-ops.

#[cfg(feature = "metrics")]
use metrics::counter;

/// Name of the counter tracking executed connect attempts.
pub const ATTEMPTS_TOTAL: &str = "connection_throttle_attempts_total";
/// Name of the counter tracking requests that never reached the connector.
pub const REJECTIONS_TOTAL: &str = "connection_throttle_rejections_total";
/// Name of the counter tracking failed or timed-out attempts.
pub const FAILURES_TOTAL: &str = "connection_throttle_failures_total";

/// Why a request was turned away before running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// The sliding window was full.
    RateLimited,
    /// A newer request displaced it.
    Superseded,
    /// The pending window was cleared.
    Cancelled,
}

impl Rejection {
    /// Label value recorded under the `reason` key.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Rejection::RateLimited => "rate_limited",
            Rejection::Superseded => "superseded",
            Rejection::Cancelled => "cancelled",
        }
    }
}

/// Record an executed connect attempt.
pub fn inc_attempts() {
    #[cfg(feature = "metrics")]
    counter!(ATTEMPTS_TOTAL).increment(1);
}

/// Record `count` rejected requests for the given reason.
pub fn inc_rejections(reason: Rejection, count: u64) {
    #[cfg(feature = "metrics")]
    counter!(REJECTIONS_TOTAL, "reason" => reason.as_str()).increment(count);
    #[cfg(not(feature = "metrics"))]
    let _ = (reason, count);
}

/// Record a failed attempt.
pub fn inc_failures() {
    #[cfg(feature = "metrics")]
    counter!(FAILURES_TOTAL).increment(1);
}
