//! Poll and retry configuration
//!
//! A [`PollConfig`] is validated whenever it is built, including on
//! deserialization, so a poller never sees a zero interval or budget.
//!
//! ```toml
//! interval = "30s"
//! total_timeout = "30m"
//! per_attempt_timeout = "10s"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default delay between status fetches.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Default overall budget of a poll session.
pub const DEFAULT_TOTAL_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Immutable polling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPollConfig", into = "RawPollConfig")]
pub struct PollConfig {
    interval: Duration,
    total_timeout: Duration,
    per_attempt_timeout: Option<Duration>,
    max_attempts: Option<u32>,
}

impl PollConfig {
    /// Config with the given cadence and overall budget.
    pub fn new(interval: Duration, total_timeout: Duration) -> Result<Self, ConfigError> {
        non_zero("interval", interval)?;
        non_zero("total_timeout", total_timeout)?;
        Ok(Self {
            interval,
            total_timeout,
            per_attempt_timeout: None,
            max_attempts: None,
        })
    }

    /// Bound every single status fetch by `limit`.
    pub fn with_per_attempt_timeout(mut self, limit: Duration) -> Result<Self, ConfigError> {
        non_zero("per_attempt_timeout", limit)?;
        self.per_attempt_timeout = Some(limit);
        Ok(self)
    }

    /// Explicit attempt bound for [`BoundedRetrier`](crate::BoundedRetrier).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Result<Self, ConfigError> {
        if max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        self.max_attempts = Some(max_attempts);
        Ok(self)
    }

    /// Delay between the end of one fetch and the start of the next.
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Overall budget of a session.
    pub const fn total_timeout(&self) -> Duration {
        self.total_timeout
    }

    /// Deadline for a single fetch; `None` means unbounded.
    pub const fn per_attempt_timeout(&self) -> Option<Duration> {
        self.per_attempt_timeout
    }

    /// Attempt bound used by the retrier.
    ///
    /// When not set explicitly this is `total_timeout / interval`, at least 1.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.unwrap_or_else(|| {
            let ratio = self.total_timeout.as_nanos() / self.interval.as_nanos();
            u32::try_from(ratio).unwrap_or(u32::MAX).max(1)
        })
    }

    /// Whether `max_attempts` was configured explicitly.
    pub const fn has_explicit_max_attempts(&self) -> bool {
        self.max_attempts.is_some()
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            total_timeout: DEFAULT_TOTAL_TIMEOUT,
            per_attempt_timeout: None,
            max_attempts: None,
        }
    }
}

fn non_zero(field: &'static str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        Err(ConfigError::ZeroDuration { field })
    } else {
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPollConfig {
    #[serde(with = "humantime_serde", default = "default_interval")]
    interval: Duration,
    #[serde(with = "humantime_serde", default = "default_total_timeout")]
    total_timeout: Duration,
    #[serde(
        with = "humantime_serde",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    per_attempt_timeout: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_attempts: Option<u32>,
}

const fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

const fn default_total_timeout() -> Duration {
    DEFAULT_TOTAL_TIMEOUT
}

impl TryFrom<RawPollConfig> for PollConfig {
    type Error = ConfigError;

    fn try_from(raw: RawPollConfig) -> Result<Self, Self::Error> {
        let mut config = Self::new(raw.interval, raw.total_timeout)?;
        if let Some(limit) = raw.per_attempt_timeout {
            config = config.with_per_attempt_timeout(limit)?;
        }
        if let Some(max_attempts) = raw.max_attempts {
            config = config.with_max_attempts(max_attempts)?;
        }
        Ok(config)
    }
}

impl From<PollConfig> for RawPollConfig {
    fn from(config: PollConfig) -> Self {
        Self {
            interval: config.interval,
            total_timeout: config.total_timeout,
            per_attempt_timeout: config.per_attempt_timeout,
            max_attempts: config.max_attempts,
        }
    }
}
