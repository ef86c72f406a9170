#![doc(html_root_url = "https://docs.rs/connection_throttle/latest")]
//! Public API for the `connection_throttle` library.
//!
//! This crate gates connection attempts to independently named services. It
//! debounces bursts of requests into one attempt, enforces an exponential
//! back-off between attempts and a sliding-window rate limit, and tracks
//! which services the application reports as connected.

pub mod checker;
pub mod config;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod status;
mod tracker;

pub use checker::ConnectionStateChecker;
pub use config::{ThrottleConfig, ThrottleConfigUpdate};
pub use error::{BoxError, ConnectError, ThrottleError};
pub use manager::{ConnectionThrottlingManager, PendingConnection};
pub use status::{CheckerStatus, ConnectionStatus};
