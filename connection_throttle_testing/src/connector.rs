//! Scripted stand-in for a real connect operation.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::future::BoxFuture;

/// Connector that fails a fixed number of times, then succeeds.
///
/// Clones share the call counter, so a clone can be moved into a connect
/// callback while the original inspects how often it ran.
#[derive(Clone, Debug, Default)]
pub struct ScriptedConnector {
    calls: Arc<AtomicUsize>,
    failures: usize,
    latency: Option<Duration>,
}

impl ScriptedConnector {
    /// Connector whose every call succeeds.
    #[must_use]
    pub fn succeeding() -> Self { Self::default() }

    /// Connector whose first `failures` calls fail.
    #[must_use]
    pub fn failing_times(failures: usize) -> Self {
        Self {
            failures,
            ..Self::default()
        }
    }

    /// Connector whose every call fails.
    #[must_use]
    pub fn always_failing() -> Self { Self::failing_times(usize::MAX) }

    /// Delay each call by `latency` before settling.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of calls that have started.
    #[must_use]
    pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }

    /// Build a one-shot connect callback bound to this connector.
    pub fn connect_fn(&self) -> impl FnOnce() -> BoxFuture<'static, io::Result<()>> + Send + use<> {
        let connector = self.clone();
        move || {
            Box::pin(async move {
                let call = connector.calls.fetch_add(1, Ordering::SeqCst);
                if let Some(latency) = connector.latency {
                    tokio::time::sleep(latency).await;
                }
                if call < connector.failures {
                    Err(io::Error::new(
                        io::ErrorKind::ConnectionRefused,
                        format!("scripted failure #{}", call + 1),
                    ))
                } else {
                    Ok(())
                }
            })
        }
    }
}
