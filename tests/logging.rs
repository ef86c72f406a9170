//! Tests for log output emitted by the throttling manager.

use std::time::Duration;

use connection_throttle::{ConnectionThrottlingManager, ThrottleConfig};
use connection_throttle_testing::{LoggerHandle, ScriptedConnector, connect_expect, connect_expect_err, logger};
use rstest::rstest;
use serial_test::serial;
use tokio::time;

/// Rate-limit rejections are logged at warn level with the service name.
#[rstest]
#[tokio::test]
#[serial(logging)]
async fn rate_limit_rejection_logs_warning(mut logger: LoggerHandle) {
    time::pause();
    logger.clear();
    let manager = ConnectionThrottlingManager::new(ThrottleConfig {
        debounce_delay: Duration::from_millis(10),
        max_attempts_per_window: 1,
        ..ThrottleConfig::default()
    });
    let connector = ScriptedConnector::succeeding();
    connect_expect!(manager.debounce_connection("bookings", connector.connect_fn(), None));
    let _ = connect_expect_err!(manager.debounce_connection("bookings", connector.connect_fn(), None));

    let warnings = logger.take_matching(log::Level::Warn, "connection rate limit exceeded");
    assert_eq!(warnings.len(), 1, "expected one rate-limit warning");
    assert!(warnings[0].contains("bookings"));
}

/// Resets are logged at info level.
#[rstest]
#[tokio::test]
#[serial(logging)]
async fn reset_logs_info(mut logger: LoggerHandle) {
    time::pause();
    logger.clear();
    let manager = ConnectionThrottlingManager::default();
    let connector = ScriptedConnector::succeeding();
    connect_expect!(manager.debounce_connection("swaps", connector.connect_fn(), Some(Duration::from_millis(1))));
    manager.reset_connection_tracking("swaps");

    let resets = logger.take_matching(log::Level::Info, "connection tracking reset");
    assert_eq!(resets.len(), 1);
}
