//! Diagnostic snapshots of throttling state.

use tokio::time::Instant;

/// Throttling state of one service at the moment it was queried.
///
/// A service that was never seen reports [`ConnectionStatus::default`]:
/// connectable, idle, with no recorded attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// Whether a new attempt would be allowed right now.
    pub can_connect: bool,
    /// A connect callback is currently executing.
    pub is_connecting: bool,
    /// A debounce timer is scheduled or a connect callback is executing.
    pub is_pending: bool,
    /// Attempts since the last success.
    pub attempt_count: u32,
    /// When the most recent attempt started.
    pub last_attempt: Option<Instant>,
    /// Earliest instant the back-off permits another attempt.
    pub next_allowed_attempt: Option<Instant>,
    /// Attempts counted against the current rate-limit window.
    pub attempts_in_window: usize,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            can_connect: true,
            is_connecting: false,
            is_pending: false,
            attempt_count: 0,
            last_attempt: None,
            next_allowed_attempt: None,
            attempts_in_window: 0,
        }
    }
}

/// Connection flag combined with the throttling verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CheckerStatus {
    pub is_connected: bool,
    pub can_connect: bool,
    pub throttling: ConnectionStatus,
}
