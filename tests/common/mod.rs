//! Shared utilities for integration tests.
//!
//! Provides manager fixtures with short, test-friendly delays so scenarios
//! can run on Tokio's paused clock.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::time::Duration;

use connection_throttle::{ConnectionThrottlingManager, ThrottleConfig};
use rstest::fixture;

/// Shared result type for integration tests.
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Debounce delay used by [`test_config`].
pub const DEBOUNCE: Duration = Duration::from_millis(100);
/// Retry base delay used by [`test_config`].
pub const RETRY_DELAY: Duration = Duration::from_millis(200);
/// Rate-limit window used by [`test_config`].
pub const WINDOW: Duration = Duration::from_millis(1000);

/// Configuration with short delays and a generous retry budget.
#[must_use]
pub fn test_config() -> ThrottleConfig {
    ThrottleConfig {
        debounce_delay: DEBOUNCE,
        max_retries: 4,
        retry_delay: RETRY_DELAY,
        connection_timeout: Duration::from_millis(500),
        max_attempts_per_window: 5,
        rate_limit_window: WINDOW,
        enforce_timeout: false,
    }
}

#[fixture]
pub fn manager() -> ConnectionThrottlingManager { ConnectionThrottlingManager::new(test_config()) }
