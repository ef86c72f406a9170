//! Connection flags combined with the throttling verdict.
//!
//! [`ConnectionStateChecker`] records whether each service is connected, as
//! reported by the application, and answers "should an attempt be made at
//! all" by combining that flag with
//! [`ConnectionThrottlingManager::can_connect`].

use std::future::Future;

use dashmap::DashMap;
use tracing::debug;

use crate::{
    error::{BoxError, ThrottleError},
    manager::ConnectionThrottlingManager,
    status::CheckerStatus,
};

/// Tracks per-service connectedness on top of an injected manager.
#[derive(Debug)]
pub struct ConnectionStateChecker {
    manager: ConnectionThrottlingManager,
    states: DashMap<String, bool>,
}

impl ConnectionStateChecker {
    /// Create a checker consulting `manager` for throttling decisions.
    #[must_use]
    pub fn new(manager: ConnectionThrottlingManager) -> Self {
        Self {
            manager,
            states: DashMap::new(),
        }
    }

    /// Manager backing this checker.
    #[must_use]
    pub fn manager(&self) -> &ConnectionThrottlingManager { &self.manager }

    /// Returns the stored flag, `false` for services never reported.
    #[must_use]
    pub fn is_connected(&self, service: &str) -> bool {
        self.states.get(service).is_some_and(|state| *state)
    }

    /// Record the observed connection state of `service`.
    pub fn set_connection_state(&self, service: impl Into<String>, connected: bool) {
        let service = service.into();
        debug!(%service, connected, "connection state reported");
        self.states.insert(service, connected);
    }

    /// Returns true if `service` is disconnected and the manager allows an attempt.
    #[must_use]
    pub fn can_connect(&self, service: &str) -> bool {
        !self.is_connected(service) && self.manager.can_connect(service)
    }

    /// Aggregate the connection flag with the manager's status.
    #[must_use]
    pub fn connection_status(&self, service: &str) -> CheckerStatus {
        CheckerStatus {
            is_connected: self.is_connected(service),
            can_connect: self.can_connect(service),
            throttling: self.manager.connection_status(service),
        }
    }

    /// Forget the flag for `service` and reset its throttling history.
    pub fn reset_connection_state(&self, service: &str) {
        self.states.remove(service);
        self.manager.reset_connection_tracking(service);
    }

    /// Services currently flagged as connected.
    #[must_use]
    pub fn connected_services(&self) -> Vec<String> {
        self.states
            .iter()
            .filter(|entry| *entry.value())
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Connect `service` through the manager unless it is already connected.
    ///
    /// A successful attempt marks the service connected; an attempt that
    /// fails or times out marks it disconnected. Rate-limited, superseded and
    /// cancelled requests leave the flag as it was.
    ///
    /// # Errors
    ///
    /// Returns the [`ThrottleError`] produced by
    /// [`ConnectionThrottlingManager::debounce_connection`].
    pub async fn connect<F, Fut, E>(&self, service: &str, connect: F) -> Result<(), ThrottleError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        if self.is_connected(service) {
            debug!(service, "already connected; skipping attempt");
            return Ok(());
        }
        let outcome = self.manager.debounce_connection(service, connect, None).await;
        match &outcome {
            Ok(()) => self.set_connection_state(service, true),
            Err(error) if error.is_connect_failure() => self.set_connection_state(service, false),
            Err(_) => {}
        }
        outcome
    }
}
