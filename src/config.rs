//! Throttle configuration shared by every tracked service.
//!
//! [`ThrottleConfig`] holds the debounce, back-off and rate-limit settings
//! applied by [`ConnectionThrottlingManager`](crate::ConnectionThrottlingManager).
//! [`ThrottleConfigUpdate`] carries a partial replacement applied through
//! [`update_config`](crate::ConnectionThrottlingManager::update_config).

use std::time::Duration;

use serde::{Deserialize, Serialize};

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Settings governing debouncing, retry back-off and rate limiting.
///
/// # Default Values
/// - `debounce_delay`: 1 second
/// - `max_retries`: 3
/// - `retry_delay`: 1 second
/// - `connection_timeout`: 10 seconds
/// - `max_attempts_per_window`: 5
/// - `rate_limit_window`: 60 seconds
/// - `enforce_timeout`: `false`
///
/// Durations serialize as whole milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Quiet period before a requested connect is executed.
    #[serde(with = "millis")]
    pub debounce_delay: Duration,
    /// Attempts allowed before the service refuses further connects until reset.
    pub max_retries: u32,
    /// Base delay of the exponential back-off between attempts.
    #[serde(with = "millis")]
    pub retry_delay: Duration,
    /// Upper bound on a single connect attempt.
    ///
    /// Only enforced when [`enforce_timeout`](Self::enforce_timeout) is set;
    /// otherwise it is advisory and callers apply it themselves.
    #[serde(with = "millis")]
    pub connection_timeout: Duration,
    /// Attempts allowed inside one `rate_limit_window`.
    pub max_attempts_per_window: usize,
    /// Length of the sliding rate-limit window.
    #[serde(with = "millis")]
    pub rate_limit_window: Duration,
    /// Race each attempt against `connection_timeout`.
    pub enforce_timeout: bool,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            debounce_delay: Duration::from_millis(1000),
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            connection_timeout: Duration::from_secs(10),
            max_attempts_per_window: 5,
            rate_limit_window: Duration::from_secs(60),
            enforce_timeout: false,
        }
    }
}

impl ThrottleConfig {
    /// Clamp limits to values the manager can act on.
    ///
    /// A zero window budget would reject every request outright and a
    /// zero-length window would never retain an attempt, so both are raised
    /// to their minimum. `max_retries` is left alone: zero means
    /// [`can_connect`](crate::ConnectionThrottlingManager::can_connect) never
    /// offers an attempt.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use connection_throttle::ThrottleConfig;
    ///
    /// let cfg = ThrottleConfig {
    ///     max_retries: 0,
    ///     max_attempts_per_window: 0,
    ///     rate_limit_window: Duration::ZERO,
    ///     ..ThrottleConfig::default()
    /// };
    ///
    /// let normalized = cfg.normalized();
    /// assert_eq!(normalized.max_retries, 0);
    /// assert_eq!(normalized.max_attempts_per_window, 1);
    /// assert_eq!(normalized.rate_limit_window, Duration::from_millis(1));
    /// ```
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.max_attempts_per_window = self.max_attempts_per_window.max(1);
        self.rate_limit_window = self.rate_limit_window.max(Duration::from_millis(1));
        self
    }

    /// Back-off owed after `attempt_count` consecutive attempts.
    ///
    /// Computes `retry_delay * 2^(attempt_count - 1)`, saturating at
    /// [`Duration::MAX`]. Returns [`Duration::ZERO`] when no attempt has been
    /// made.
    #[must_use]
    pub fn backoff_delay(&self, attempt_count: u32) -> Duration {
        let Some(exponent) = attempt_count.checked_sub(1) else {
            return Duration::ZERO;
        };
        let nanos = self.retry_delay.as_nanos();
        if nanos == 0 {
            return Duration::ZERO;
        }
        if exponent >= nanos.leading_zeros() {
            return Duration::MAX;
        }
        let scaled = nanos << exponent;
        let Ok(secs) = u64::try_from(scaled / NANOS_PER_SEC) else {
            return Duration::MAX;
        };
        let subsec = u32::try_from(scaled % NANOS_PER_SEC).unwrap_or(0);
        Duration::new(secs, subsec)
    }
}

/// Partial replacement for a [`ThrottleConfig`].
///
/// Fields left as `None` keep their current value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ThrottleConfigUpdate {
    pub debounce_delay: Option<Duration>,
    pub max_retries: Option<u32>,
    pub retry_delay: Option<Duration>,
    pub connection_timeout: Option<Duration>,
    pub max_attempts_per_window: Option<usize>,
    pub rate_limit_window: Option<Duration>,
    pub enforce_timeout: Option<bool>,
}

impl ThrottleConfigUpdate {
    /// Overwrite the provided fields of `config`.
    pub fn apply(self, config: &mut ThrottleConfig) {
        let Self {
            debounce_delay,
            max_retries,
            retry_delay,
            connection_timeout,
            max_attempts_per_window,
            rate_limit_window,
            enforce_timeout,
        } = self;
        if let Some(value) = debounce_delay {
            config.debounce_delay = value;
        }
        if let Some(value) = max_retries {
            config.max_retries = value;
        }
        if let Some(value) = retry_delay {
            config.retry_delay = value;
        }
        if let Some(value) = connection_timeout {
            config.connection_timeout = value;
        }
        if let Some(value) = max_attempts_per_window {
            config.max_attempts_per_window = value;
        }
        if let Some(value) = rate_limit_window {
            config.rate_limit_window = value;
        }
        if let Some(value) = enforce_timeout {
            config.enforce_timeout = value;
        }
    }
}

impl From<ThrottleConfig> for ThrottleConfigUpdate {
    fn from(config: ThrottleConfig) -> Self {
        Self {
            debounce_delay: Some(config.debounce_delay),
            max_retries: Some(config.max_retries),
            retry_delay: Some(config.retry_delay),
            connection_timeout: Some(config.connection_timeout),
            max_attempts_per_window: Some(config.max_attempts_per_window),
            rate_limit_window: Some(config.rate_limit_window),
            enforce_timeout: Some(config.enforce_timeout),
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(ms)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
