//! Debouncing, back-off and rate limiting around connection attempts.
//!
//! [`ConnectionThrottlingManager`] coalesces bursts of connect requests per
//! service into a single delayed attempt, spaces out retries with an
//! exponential back-off, and caps attempts inside a sliding window. Each
//! service moves through `idle → pending → executing → idle`; the pending
//! timer and the callers waiting on it live in the service's tracker so the
//! window can be cancelled deterministically.
//!
//! The manager never retries by itself. Every outcome, including rejections,
//! is reported through the [`PendingConnection`] returned to the caller.

use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, PoisonError, RwLock},
    task::{Context, Poll},
    time::Duration,
};

use dashmap::DashMap;
use tokio::{
    sync::oneshot,
    time::{self, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::{ThrottleConfig, ThrottleConfigUpdate},
    error::{BoxError, ThrottleError},
    metrics::{self, Rejection},
    status::ConnectionStatus,
    tracker::{DebounceTimer, Outcome, Tracker},
};

/// Shared state behind every [`ConnectionThrottlingManager`] clone.
#[derive(Debug)]
struct ManagerInner {
    config: RwLock<ThrottleConfig>,
    trackers: DashMap<String, Tracker>,
}

/// Cloneable handle gating connection attempts per service.
///
/// Clones share configuration and trackers. Construct one per process (or
/// per test) and pass it to whatever needs to connect.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use connection_throttle::{ConnectionThrottlingManager, ThrottleConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let manager = ConnectionThrottlingManager::new(ThrottleConfig {
///     debounce_delay: Duration::from_millis(10),
///     ..ThrottleConfig::default()
/// });
///
/// manager
///     .debounce_connection("notifications", || async { Ok::<_, std::io::Error>(()) }, None)
///     .await
///     .expect("connect failed");
/// assert_eq!(manager.connection_status("notifications").attempt_count, 0);
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct ConnectionThrottlingManager {
    inner: Arc<ManagerInner>,
}

impl Default for ConnectionThrottlingManager {
    fn default() -> Self { Self::new(ThrottleConfig::default()) }
}

impl ConnectionThrottlingManager {
    /// Create a manager using `config` after [normalizing](ThrottleConfig::normalized) it.
    #[must_use]
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config: RwLock::new(config.normalized()),
                trackers: DashMap::new(),
            }),
        }
    }

    /// Return the active configuration.
    #[must_use]
    pub fn config(&self) -> ThrottleConfig { self.inner.config() }

    /// Apply a partial or full configuration replacement.
    ///
    /// Takes effect for every later scheduling decision. Timers already
    /// scheduled keep the delay they captured.
    pub fn update_config(&self, update: impl Into<ThrottleConfigUpdate>) {
        let update: ThrottleConfigUpdate = update.into();
        let mut config = self
            .inner
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        update.apply(&mut config);
        *config = config.normalized();
        debug!(config = ?*config, "throttle configuration updated");
    }

    /// Request a connection for `service`, coalescing bursts of requests.
    ///
    /// The request is registered before this function returns: an earlier
    /// request still waiting on its debounce timer is failed with
    /// [`ThrottleError::Superseded`] and a fresh timer of `delay` (or the
    /// configured `debounce_delay`) is scheduled. When the timer fires
    /// `connect` runs once and its outcome resolves the returned future.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// The returned future resolves to [`ThrottleError::RateLimitExceeded`]
    /// immediately when the sliding window is full, to
    /// [`ThrottleError::Superseded`] or [`ThrottleError::Cancelled`] when the
    /// request is displaced, and to [`ThrottleError::Connect`] or
    /// [`ThrottleError::Timeout`] when the attempt itself fails.
    pub fn debounce_connection<F, Fut, E>(
        &self,
        service: impl Into<String>,
        connect: F,
        delay: Option<Duration>,
    ) -> PendingConnection
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let service = service.into();
        let config = self.config();
        let now = Instant::now();

        let mut tracker = self
            .inner
            .trackers
            .entry(service.clone())
            .or_insert_with(|| Tracker::with_window_capacity(config.max_attempts_per_window));
        tracker.prune(now, config.rate_limit_window);
        if tracker.window_saturated(&config) {
            let attempts = tracker.attempts_in_window();
            drop(tracker);
            warn!(%service, attempts, "connection rate limit exceeded");
            metrics::inc_rejections(Rejection::RateLimited, 1);
            return PendingConnection::ready(
                service.clone(),
                Err(ThrottleError::RateLimitExceeded { service }),
            );
        }

        tracker.cancel_timer();
        let superseded = tracker.fail_waiters(|| ThrottleError::Superseded {
            service: service.clone(),
        });
        let (tx, rx) = oneshot::channel();
        tracker.waiters.push(tx);
        let generation = tracker.next_generation();
        let token = CancellationToken::new();
        tracker.debounce_timer = Some(DebounceTimer {
            generation,
            token: token.clone(),
        });
        drop(tracker);

        if superseded > 0 {
            debug!(%service, superseded, "superseded pending connection requests");
            metrics::inc_rejections(Rejection::Superseded, superseded as u64);
        }

        let delay = delay.unwrap_or(config.debounce_delay);
        debug!(%service, ?delay, "connection attempt scheduled");
        let inner = Arc::clone(&self.inner);
        let task_service = service.clone();
        // The deadline is fixed here, not when the task is first polled.
        let sleep = time::sleep(delay);
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = sleep => {
                    inner.run_attempt(task_service, generation, connect).await;
                }
            }
        });

        PendingConnection::waiting(service, rx)
    }

    /// Cancel the pending debounce window for `service`.
    ///
    /// Callers still waiting on the window receive
    /// [`ThrottleError::Cancelled`]. An attempt that already started is not
    /// aborted; its caller still receives the real outcome. Calling this with
    /// nothing pending has no effect.
    pub fn clear_debounce(&self, service: &str) {
        let Some(mut tracker) = self.inner.trackers.get_mut(service) else {
            return;
        };
        let had_timer = tracker.cancel_timer();
        tracker.connecting = None;
        let cancelled = tracker.fail_waiters(|| ThrottleError::Cancelled {
            service: service.to_owned(),
        });
        drop(tracker);

        if had_timer || cancelled > 0 {
            debug!(service, cancelled, "pending connection cancelled");
            metrics::inc_rejections(Rejection::Cancelled, cancelled as u64);
        }
    }

    /// Returns true while a debounce timer is scheduled or an attempt runs.
    #[must_use]
    pub fn is_connection_pending(&self, service: &str) -> bool {
        self.inner
            .trackers
            .get(service)
            .is_some_and(|tracker| tracker.is_pending())
    }

    /// Returns true if a new attempt for `service` would be allowed now.
    ///
    /// Refuses while a request is pending, while the rate-limit window is
    /// full, until the back-off since the last attempt has elapsed, and once
    /// `max_retries` attempts have accumulated.
    #[must_use]
    pub fn can_connect(&self, service: &str) -> bool {
        let config = self.config();
        let now = Instant::now();
        match self.inner.trackers.get_mut(service) {
            Some(mut tracker) => {
                tracker.prune(now, config.rate_limit_window);
                tracker.can_connect(now, &config)
            }
            None => config.max_retries > 0,
        }
    }

    /// Snapshot the throttling state of `service`.
    ///
    /// Querying an unknown service does not start tracking it.
    #[must_use]
    pub fn connection_status(&self, service: &str) -> ConnectionStatus {
        let config = self.config();
        let now = Instant::now();
        let Some(mut tracker) = self.inner.trackers.get_mut(service) else {
            return ConnectionStatus {
                can_connect: config.max_retries > 0,
                ..ConnectionStatus::default()
            };
        };
        tracker.prune(now, config.rate_limit_window);
        ConnectionStatus {
            can_connect: tracker.can_connect(now, &config),
            is_connecting: tracker.is_connecting(),
            is_pending: tracker.is_pending(),
            attempt_count: tracker.attempt_count,
            last_attempt: tracker.last_attempt,
            next_allowed_attempt: tracker.next_allowed_attempt(&config),
            attempts_in_window: tracker.attempts_in_window(),
        }
    }

    /// Forget the attempt history of `service`.
    ///
    /// Cancels any pending window as [`clear_debounce`](Self::clear_debounce)
    /// does, then zeroes the attempt count, last attempt and rate-limit
    /// window. The service keeps its map entry.
    pub fn reset_connection_tracking(&self, service: &str) {
        self.clear_debounce(service);
        if let Some(mut tracker) = self.inner.trackers.get_mut(service) {
            tracker.reset();
            drop(tracker);
            info!(service, "connection tracking reset");
        }
    }

    /// Services that currently have a tracker.
    #[must_use]
    pub fn tracked_services(&self) -> Vec<String> {
        self.inner
            .trackers
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }
}

impl ManagerInner {
    fn config(&self) -> ThrottleConfig {
        *self.config.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Execute the attempt scheduled under `generation`, if it is still current.
    async fn run_attempt<F, Fut, E>(&self, service: String, generation: u64, connect: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Into<BoxError>,
    {
        let config = self.config();
        let waiters = {
            let Some(mut tracker) = self.trackers.get_mut(&service) else {
                return;
            };
            let current = tracker
                .debounce_timer
                .as_ref()
                .map(|timer| timer.generation);
            if current != Some(generation) {
                return;
            }
            tracker.debounce_timer = None;
            tracker.begin_attempt(generation, Instant::now(), config.rate_limit_window);
            debug!(%service, attempt = tracker.attempt_count, "connection attempt started");
            std::mem::take(&mut tracker.waiters)
        };
        metrics::inc_attempts();

        let outcome = invoke(&service, &config, connect).await;

        if let Some(mut tracker) = self.trackers.get_mut(&service) {
            tracker.finish_attempt(generation, outcome.is_ok());
        }
        match &outcome {
            Ok(()) => debug!(%service, "connection attempt succeeded"),
            Err(error) => {
                metrics::inc_failures();
                debug!(%service, %error, "connection attempt failed");
            }
        }
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }
}

async fn invoke<F, Fut, E>(service: &str, config: &ThrottleConfig, connect: F) -> Outcome
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Into<BoxError>,
{
    let attempt = connect();
    if !config.enforce_timeout {
        return attempt
            .await
            .map_err(|error| ThrottleError::connect(service, error.into()));
    }
    match time::timeout(config.connection_timeout, attempt).await {
        Ok(result) => result.map_err(|error| ThrottleError::connect(service, error.into())),
        Err(_) => Err(ThrottleError::Timeout {
            service: service.to_owned(),
            timeout: config.connection_timeout,
        }),
    }
}

/// Future resolving to the outcome of a debounced connection request.
///
/// The request is already registered with the manager when this value is
/// created; dropping it does not withdraw the request, it only discards the
/// outcome.
#[derive(Debug)]
#[must_use = "the connection outcome is only observable by awaiting this future"]
pub struct PendingConnection {
    service: String,
    state: PendingState,
}

#[derive(Debug)]
enum PendingState {
    Ready(Option<Outcome>),
    Waiting(oneshot::Receiver<Outcome>),
}

impl PendingConnection {
    fn ready(service: String, outcome: Outcome) -> Self {
        Self {
            service,
            state: PendingState::Ready(Some(outcome)),
        }
    }

    fn waiting(service: String, rx: oneshot::Receiver<Outcome>) -> Self {
        Self {
            service,
            state: PendingState::Waiting(rx),
        }
    }

    /// Service this request targets.
    #[must_use]
    pub fn service(&self) -> &str { &self.service }
}

impl Future for PendingConnection {
    type Output = Result<(), ThrottleError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let cancelled = || ThrottleError::Cancelled {
            service: this.service.clone(),
        };
        match &mut this.state {
            PendingState::Ready(outcome) => {
                Poll::Ready(outcome.take().unwrap_or_else(|| Err(cancelled())))
            }
            // A dropped sender means the timer task died with its runtime.
            PendingState::Waiting(rx) => Pin::new(rx)
                .poll(cx)
                .map(|received| received.unwrap_or_else(|_| Err(cancelled()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use rstest::{fixture, rstest};
    use tokio::time::{self, Duration};

    use super::*;

    #[fixture]
    fn manager() -> ConnectionThrottlingManager {
        ConnectionThrottlingManager::new(ThrottleConfig {
            debounce_delay: Duration::from_millis(100),
            ..ThrottleConfig::default()
        })
    }

    #[rstest]
    #[tokio::test]
    async fn queries_do_not_create_trackers(manager: ConnectionThrottlingManager) {
        assert!(manager.can_connect("ghost"));
        assert!(!manager.is_connection_pending("ghost"));
        assert_eq!(manager.connection_status("ghost"), ConnectionStatus::default());
        manager.clear_debounce("ghost");
        manager.reset_connection_tracking("ghost");
        assert!(manager.tracked_services().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn stale_timer_does_not_run_connect(manager: ConnectionThrottlingManager) {
        time::pause();
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let first = manager.debounce_connection(
            "svc",
            move || async move {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok::<_, std::io::Error>(())
            },
            None,
        );

        // Replace the scheduled generation by hand, as a racing reschedule would.
        if let Some(mut tracker) = manager.inner.trackers.get_mut("svc") {
            let generation = tracker.next_generation();
            if let Some(timer) = tracker.debounce_timer.as_mut() {
                timer.generation = generation;
            }
        }

        time::advance(Duration::from_millis(150)).await;
        tokio::task::yield_now().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(manager.is_connection_pending("svc"));

        manager.clear_debounce("svc");
        assert!(matches!(first.await, Err(ThrottleError::Cancelled { .. })));
    }

    #[rstest]
    #[tokio::test]
    async fn update_config_normalizes(manager: ConnectionThrottlingManager) {
        manager.update_config(ThrottleConfigUpdate {
            max_attempts_per_window: Some(0),
            ..ThrottleConfigUpdate::default()
        });
        assert_eq!(manager.config().max_attempts_per_window, 1);
        assert_eq!(manager.config().debounce_delay, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn unbounded_window_budget_accepts_requests() {
        time::pause();
        let manager = ConnectionThrottlingManager::new(ThrottleConfig {
            max_attempts_per_window: usize::MAX,
            ..ThrottleConfig::default()
        });
        manager
            .debounce_connection(
                "ws",
                || async { Ok::<_, std::io::Error>(()) },
                Some(Duration::from_millis(1)),
            )
            .await
            .expect("connect failed");

        let status = manager.connection_status("ws");
        assert_eq!(status.attempts_in_window, 1);
        assert!(status.can_connect);
    }

    #[tokio::test]
    async fn zero_retries_never_offer_attempts() {
        time::pause();
        let manager = ConnectionThrottlingManager::new(ThrottleConfig {
            max_retries: 0,
            ..ThrottleConfig::default()
        });
        assert!(!manager.can_connect("ws"));
        assert!(!manager.connection_status("ws").can_connect);

        manager
            .debounce_connection(
                "ws",
                || async { Ok::<_, std::io::Error>(()) },
                Some(Duration::from_millis(1)),
            )
            .await
            .expect("connect failed");
        assert!(!manager.can_connect("ws"));
        assert!(manager.tracked_services().contains(&"ws".to_owned()));
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn superseding_is_traced() {
        time::pause();
        let manager = manager();
        let first = manager.debounce_connection("svc", || async { Ok::<_, std::io::Error>(()) }, None);
        let second = manager.debounce_connection("svc", || async { Ok::<_, std::io::Error>(()) }, None);
        assert!(matches!(first.await, Err(ThrottleError::Superseded { .. })));
        second.await.expect("connect failed");

        assert!(logs_contain("superseded pending connection requests"));
        assert!(logs_contain("connection attempt succeeded"));
    }

    #[rstest]
    #[tokio::test]
    async fn clones_share_trackers(manager: ConnectionThrottlingManager) {
        let clone = manager.clone();
        let pending = clone.debounce_connection("svc", || async { Ok::<_, std::io::Error>(()) }, None);
        assert!(manager.is_connection_pending("svc"));
        pending.await.expect("connect failed");
        assert!(!manager.is_connection_pending("svc"));
    }
}
