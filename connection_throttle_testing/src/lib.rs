//! Shared fixtures for exercising `connection_throttle` in tests.
//!
//! [`ScriptedConnector`] stands in for a real connection: it counts how often
//! it is invoked and fails a scripted number of times before succeeding.
//! [`logger`] captures log output for assertions.
//!
//! ```rust
//! use connection_throttle_testing::ScriptedConnector;
//!
//! let connector = ScriptedConnector::failing_times(2);
//! let _connect = connector.connect_fn();
//! assert_eq!(connector.calls(), 0);
//! ```

pub mod connector;
pub mod logging;
pub mod macros;

pub use connector::ScriptedConnector;
pub use logging::{LoggerHandle, logger};
