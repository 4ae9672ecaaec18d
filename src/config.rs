use crate::error::ConfigError;
use crate::remote::{Backoff, RetryPolicy, RetryingExecutor};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Tunables for remote calls and deployment. Every field has a default, so a
/// config file only needs the values it overrides.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Attempts per remote call when the service throttles.
    pub max_attempts: u32,
    /// Base of the exponential throttling backoff.
    pub base_delay_ms: u64,
    /// Describe-version calls before a dashboard version counts as timed out.
    pub poll_attempts: u32,
    /// Fixed delay between describe-version calls.
    pub poll_delay_ms: u64,
    /// Deployments run at the same time.
    pub concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
            poll_attempts: 30,
            poll_delay_ms: 2000,
            concurrency: 4,
        }
    }
}

impl Config {
    /// Load a config from a JSON file.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validated()
    }

    /// Applies `DASHKEEPER_*` environment variables on top of the current values.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("DASHKEEPER_MAX_ATTEMPTS") {
            self.max_attempts = parse_value("DASHKEEPER_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = lookup("DASHKEEPER_BASE_DELAY_MS") {
            self.base_delay_ms = parse_value("DASHKEEPER_BASE_DELAY_MS", &value)?;
        }
        if let Some(value) = lookup("DASHKEEPER_POLL_ATTEMPTS") {
            self.poll_attempts = parse_value("DASHKEEPER_POLL_ATTEMPTS", &value)?;
        }
        if let Some(value) = lookup("DASHKEEPER_POLL_DELAY_MS") {
            self.poll_delay_ms = parse_value("DASHKEEPER_POLL_DELAY_MS", &value)?;
        }
        if let Some(value) = lookup("DASHKEEPER_CONCURRENCY") {
            self.concurrency = parse_value("DASHKEEPER_CONCURRENCY", &value)?;
        }
        self.validated()
    }

    fn validated(self) -> Result<Self, ConfigError> {
        let zero_checks = [
            ("max_attempts", self.max_attempts as u64),
            ("poll_attempts", self.poll_attempts as u64),
            ("concurrency", self.concurrency as u64),
        ];
        for (key, value) in zero_checks {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: "0".to_string(),
                });
            }
        }
        Ok(self)
    }

    /// Executor used for every remote call.
    pub fn executor(&self) -> RetryingExecutor {
        RetryingExecutor::new(self.max_attempts, Duration::from_millis(self.base_delay_ms))
    }

    /// Fixed-delay budget for waiting on a dashboard version.
    pub fn poll_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.poll_attempts,
            Backoff::Fixed(Duration::from_millis(self.poll_delay_ms)),
        )
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
