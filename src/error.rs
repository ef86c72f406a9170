//! Error taxonomy reported to callers of the throttling manager.
//!
//! Every failure surfaces through the future returned by
//! [`debounce_connection`](crate::ConnectionThrottlingManager::debounce_connection);
//! the manager itself never retries or swallows an error.

use std::{sync::Arc, time::Duration};

use thiserror::Error;

/// Boxed error accepted from connect callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Shared handle to the error produced by a connect callback.
pub type ConnectError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Reasons a debounced connection request did not succeed.
#[non_exhaustive]
#[derive(Debug, Error, Clone)]
pub enum ThrottleError {
    /// The sliding window already holds the maximum number of attempts.
    #[error("rate limit exceeded for service {service}")]
    RateLimitExceeded { service: String },
    /// A newer request for the same service displaced this one.
    #[error("connection request for service {service} was superseded")]
    Superseded { service: String },
    /// [`clear_debounce`](crate::ConnectionThrottlingManager::clear_debounce)
    /// dropped the pending request.
    #[error("connection request for service {service} was cancelled")]
    Cancelled { service: String },
    /// The attempt outlived the configured connection timeout.
    #[error("connection attempt for service {service} timed out after {timeout:?}")]
    Timeout { service: String, timeout: Duration },
    /// The connect callback itself failed.
    #[error("connection attempt for service {service} failed: {source}")]
    Connect {
        service: String,
        #[source]
        source: ConnectError,
    },
}

impl ThrottleError {
    /// Service the failed request targeted.
    #[must_use]
    pub fn service(&self) -> &str {
        match self {
            Self::RateLimitExceeded { service }
            | Self::Superseded { service }
            | Self::Cancelled { service }
            | Self::Timeout { service, .. }
            | Self::Connect { service, .. } => service,
        }
    }

    /// Returns true if an attempt actually ran and failed.
    #[must_use]
    pub fn is_connect_failure(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::Timeout { .. })
    }

    /// Returns true if the request lost out to a newer one.
    #[must_use]
    pub fn is_superseded(&self) -> bool { matches!(self, Self::Superseded { .. }) }

    pub(crate) fn connect(service: &str, source: BoxError) -> Self {
        Self::Connect {
            service: service.to_owned(),
            source: Arc::from(source),
        }
    }
}
