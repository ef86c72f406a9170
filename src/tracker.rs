//! Per-service attempt bookkeeping.
//!
//! A [`Tracker`] records when attempts ran, how many have failed since the
//! last success, and which callers wait on the current debounce window. It
//! is owned by the manager and only touched while the manager holds the
//! service's map entry.

use std::{collections::VecDeque, time::Duration};

use tokio::{sync::oneshot, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::{config::ThrottleConfig, error::ThrottleError};

/// Window slots reserved up front; larger budgets grow on demand.
const PREALLOCATED_WINDOW_SLOTS: usize = 16;

pub(crate) type Outcome = Result<(), ThrottleError>;
pub(crate) type Waiter = oneshot::Sender<Outcome>;

/// Timer scheduled for a debounce window.
///
/// `generation` identifies the schedule so a timer that fires after being
/// replaced or cleared can tell it no longer owns the tracker.
#[derive(Debug)]
pub(crate) struct DebounceTimer {
    pub(crate) generation: u64,
    pub(crate) token: CancellationToken,
}

#[derive(Debug, Default)]
pub(crate) struct Tracker {
    pub(crate) last_attempt: Option<Instant>,
    pub(crate) attempt_count: u32,
    /// Generation of the attempt currently executing, if any.
    pub(crate) connecting: Option<u64>,
    pub(crate) debounce_timer: Option<DebounceTimer>,
    pub(crate) attempt_timestamps: VecDeque<Instant>,
    pub(crate) waiters: Vec<Waiter>,
    next_generation: u64,
}

impl Tracker {
    pub(crate) fn with_window_capacity(capacity: usize) -> Self {
        Self {
            attempt_timestamps: VecDeque::with_capacity(capacity.min(PREALLOCATED_WINDOW_SLOTS)),
            ..Self::default()
        }
    }

    pub(crate) fn next_generation(&mut self) -> u64 {
        self.next_generation = self.next_generation.wrapping_add(1);
        self.next_generation
    }

    pub(crate) fn is_connecting(&self) -> bool { self.connecting.is_some() }

    pub(crate) fn is_pending(&self) -> bool {
        self.debounce_timer.is_some() || self.is_connecting()
    }

    /// Drop attempt timestamps that fell out of the sliding window.
    ///
    /// Entries exactly `window` old are discarded.
    pub(crate) fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.attempt_timestamps.front() {
            if now.saturating_duration_since(oldest) < window {
                break;
            }
            self.attempt_timestamps.pop_front();
        }
    }

    pub(crate) fn attempts_in_window(&self) -> usize { self.attempt_timestamps.len() }

    pub(crate) fn window_saturated(&self, config: &ThrottleConfig) -> bool {
        self.attempts_in_window() >= config.max_attempts_per_window
    }

    /// Earliest instant the back-off allows another attempt.
    pub(crate) fn next_allowed_attempt(&self, config: &ThrottleConfig) -> Option<Instant> {
        if self.attempt_count == 0 {
            return None;
        }
        let last = self.last_attempt?;
        let delay = config.backoff_delay(self.attempt_count);
        Some(last.checked_add(delay).unwrap_or_else(far_future))
    }

    pub(crate) fn can_connect(&self, now: Instant, config: &ThrottleConfig) -> bool {
        if self.is_pending() || self.window_saturated(config) {
            return false;
        }
        if self
            .next_allowed_attempt(config)
            .is_some_and(|allowed| now < allowed)
        {
            return false;
        }
        self.attempt_count < config.max_retries
    }

    /// Cancel the pending timer, if any.
    pub(crate) fn cancel_timer(&mut self) -> bool {
        match self.debounce_timer.take() {
            Some(timer) => {
                timer.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Fail every queued waiter with the error built by `make_error`.
    ///
    /// Returns the number of waiters released.
    pub(crate) fn fail_waiters(&mut self, make_error: impl Fn() -> ThrottleError) -> usize {
        let waiters = std::mem::take(&mut self.waiters);
        let count = waiters.len();
        for waiter in waiters {
            // The caller may have dropped its future; nothing to report then.
            let _ = waiter.send(Err(make_error()));
        }
        count
    }

    /// Record that an attempt starts now.
    pub(crate) fn begin_attempt(&mut self, generation: u64, now: Instant, window: Duration) {
        self.connecting = Some(generation);
        self.last_attempt = Some(now);
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.attempt_timestamps.push_back(now);
        self.prune(now, window);
    }

    /// Record the end of the attempt tagged `generation`.
    pub(crate) fn finish_attempt(&mut self, generation: u64, succeeded: bool) {
        if self.connecting == Some(generation) {
            self.connecting = None;
        }
        if succeeded {
            self.attempt_count = 0;
        }
    }

    pub(crate) fn reset(&mut self) {
        self.attempt_count = 0;
        self.last_attempt = None;
        self.attempt_timestamps.clear();
        self.connecting = None;
    }
}

// Roughly thirty years ahead; used when a back-off overflows `Instant`.
fn far_future() -> Instant { Instant::now() + Duration::from_secs(86_400 * 365 * 30) }

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use tokio::time::{self, Duration};

    use super::*;

    #[fixture]
    fn config() -> ThrottleConfig {
        ThrottleConfig {
            retry_delay: Duration::from_millis(100),
            max_retries: 3,
            max_attempts_per_window: 2,
            rate_limit_window: Duration::from_millis(1000),
            ..ThrottleConfig::default()
        }
    }

    #[rstest]
    #[case(0)]
    #[case(5)]
    #[case(usize::MAX)]
    fn window_preallocation_is_bounded(#[case] budget: usize) {
        let tracker = Tracker::with_window_capacity(budget);
        assert!(tracker.attempt_timestamps.is_empty());
        assert!(tracker.attempt_timestamps.capacity() >= budget.min(PREALLOCATED_WINDOW_SLOTS));
    }

    #[rstest]
    #[tokio::test]
    async fn prune_discards_entries_outside_window(config: ThrottleConfig) {
        time::pause();
        let mut tracker = Tracker::default();
        let window = config.rate_limit_window;
        tracker.begin_attempt(1, Instant::now(), window);
        time::advance(Duration::from_millis(600)).await;
        tracker.begin_attempt(2, Instant::now(), window);
        assert_eq!(tracker.attempts_in_window(), 2);

        time::advance(Duration::from_millis(400)).await;
        tracker.prune(Instant::now(), window);
        assert_eq!(tracker.attempts_in_window(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn backoff_blocks_until_elapsed(config: ThrottleConfig) {
        time::pause();
        let mut tracker = Tracker::default();
        tracker.begin_attempt(1, Instant::now(), config.rate_limit_window);
        tracker.finish_attempt(1, false);
        assert!(!tracker.can_connect(Instant::now(), &config));

        time::advance(Duration::from_millis(99)).await;
        assert!(!tracker.can_connect(Instant::now(), &config));
        time::advance(Duration::from_millis(1)).await;
        assert!(tracker.can_connect(Instant::now(), &config));
    }

    #[rstest]
    #[tokio::test]
    async fn finish_from_stale_generation_keeps_connecting(config: ThrottleConfig) {
        time::pause();
        let mut tracker = Tracker::default();
        tracker.begin_attempt(1, Instant::now(), config.rate_limit_window);
        tracker.begin_attempt(2, Instant::now(), config.rate_limit_window);
        tracker.finish_attempt(1, true);
        assert!(tracker.is_connecting());
        assert_eq!(tracker.attempt_count, 0);
    }

    #[rstest]
    #[tokio::test]
    async fn fail_waiters_releases_every_caller() {
        let mut tracker = Tracker::default();
        let (tx_a, rx_a) = oneshot::channel();
        let (tx_b, rx_b) = oneshot::channel();
        tracker.waiters.extend([tx_a, tx_b]);

        let released = tracker.fail_waiters(|| ThrottleError::Cancelled {
            service: "svc".into(),
        });

        assert_eq!(released, 2);
        for rx in [rx_a, rx_b] {
            let outcome = rx.await.expect("waiter dropped");
            assert!(matches!(outcome, Err(ThrottleError::Cancelled { .. })));
        }
        assert!(tracker.waiters.is_empty());
    }
}
