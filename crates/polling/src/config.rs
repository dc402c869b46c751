//! Polling configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backoff::{DEFAULT_INITIAL_INTERVAL, DEFAULT_MAX_INTERVAL};

/// Total wall-clock budget of one polling session.
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_millis(1_800_000);

/// Status query attempts per poll cycle (first try plus retries).
pub const DEFAULT_FETCH_ATTEMPTS: u32 = 4;

/// Pause between status query attempts within one poll cycle.
pub const DEFAULT_FETCH_RETRY_DELAY: Duration = Duration::from_millis(1_000);

pub const ENV_INITIAL_INTERVAL_MS: &str = "DELVE_POLL_INITIAL_MS";
pub const ENV_MAX_INTERVAL_MS: &str = "DELVE_POLL_MAX_INTERVAL_MS";
pub const ENV_MAX_DURATION_MS: &str = "DELVE_POLL_MAX_DURATION_MS";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: String, value: String },

    #[error("invalid polling config: {0}")]
    Invalid(String),
}

/// Timing knobs of a polling session. All durations serialize as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Wait before the first status query, and the first backoff step.
    #[serde(rename = "initial_interval_ms", with = "duration_ms")]
    pub initial_interval: Duration,
    /// Cap for the backoff.
    #[serde(rename = "max_interval_ms", with = "duration_ms")]
    pub max_interval: Duration,
    /// Wall-clock budget measured from the start of polling.
    #[serde(rename = "max_duration_ms", with = "duration_ms")]
    pub max_duration: Duration,
    pub fetch_attempts: u32,
    #[serde(rename = "fetch_retry_delay_ms", with = "duration_ms")]
    pub fetch_retry_delay: Duration,
    /// Surface `NETWORK` after this many consecutive failed poll cycles.
    /// `None` keeps polling until the time budget runs out.
    pub max_consecutive_network_failures: Option<u32>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            max_interval: DEFAULT_MAX_INTERVAL,
            max_duration: DEFAULT_MAX_DURATION,
            fetch_attempts: DEFAULT_FETCH_ATTEMPTS,
            fetch_retry_delay: DEFAULT_FETCH_RETRY_DELAY,
            max_consecutive_network_failures: None,
        }
    }
}

impl PollingConfig {
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    pub fn with_max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = duration;
        self
    }

    pub fn with_fetch_retries(mut self, attempts: u32, delay: Duration) -> Self {
        self.fetch_attempts = attempts;
        self.fetch_retry_delay = delay;
        self
    }

    pub fn with_max_consecutive_network_failures(mut self, limit: u32) -> Self {
        self.max_consecutive_network_failures = Some(limit);
        self
    }

    /// Defaults overridden by `DELVE_POLL_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`PollingConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ms) = read_millis(&lookup, ENV_INITIAL_INTERVAL_MS)? {
            config.initial_interval = ms;
        }
        if let Some(ms) = read_millis(&lookup, ENV_MAX_INTERVAL_MS)? {
            config.max_interval = ms;
        }
        if let Some(ms) = read_millis(&lookup, ENV_MAX_DURATION_MS)? {
            config.max_duration = ms;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_interval.is_zero() {
            return Err(ConfigError::Invalid("initial interval must be > 0".into()));
        }
        if self.max_interval < self.initial_interval {
            return Err(ConfigError::Invalid(
                "max interval must be >= initial interval".into(),
            ));
        }
        if self.max_duration.is_zero() {
            return Err(ConfigError::Invalid("max duration must be > 0".into()));
        }
        if self.fetch_attempts == 0 {
            return Err(ConfigError::Invalid("fetch attempts must be >= 1".into()));
        }
        if self.max_consecutive_network_failures == Some(0) {
            return Err(ConfigError::Invalid(
                "network failure limit must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

fn read_millis<F>(lookup: &F, var: &str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    let ms = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidValue {
            var: var.to_string(),
            value: raw.clone(),
        })?;
    Ok(Some(Duration::from_millis(ms)))
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
