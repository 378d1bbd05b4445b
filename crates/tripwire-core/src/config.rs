//! Breaker configuration, validation and loading from YAML/JSON.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when building or loading a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Circuit breaker configuration.
///
/// Durations accept humantime strings (`"10s"`, `"1m 30s"`) or bare integers
/// interpreted as milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerConfig {
    /// Minimum failure rate in the window, between 0 and 1
    pub failure_threshold: f64,

    /// How long a window stays open after its first failure
    #[serde(with = "duration_str")]
    pub time_window: Duration,

    /// How long the circuit stays OPEN before a trial call
    #[serde(with = "duration_str")]
    pub reset_timeout: Duration,

    /// Minimum attempts in the window before the rate is considered
    #[serde(default = "default_min_attempts")]
    pub min_attempts: u32,

    /// Minimum absolute failures in the window before opening
    #[serde(default = "default_min_failures")]
    pub min_failures: u32,

    /// Minimum time since the first failure before opening
    #[serde(default, with = "duration_str")]
    pub min_evaluation_time: Duration,

    /// Failure count that forces a full reset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_failure_count: Option<u32>,
}

fn default_min_attempts() -> u32 {
    5
}

fn default_min_failures() -> u32 {
    3
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 0.5,
            time_window: Duration::from_secs(60),
            reset_timeout: Duration::from_secs(30),
            min_attempts: default_min_attempts(),
            min_failures: default_min_failures(),
            min_evaluation_time: Duration::ZERO,
            max_failure_count: None,
        }
    }
}

impl BreakerConfig {
    /// Create a config with the three required settings and defaults for the rest.
    pub fn new(failure_threshold: f64, time_window: Duration, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            time_window,
            reset_timeout,
            ..Default::default()
        }
    }

    pub fn with_min_attempts(mut self, min_attempts: u32) -> Self {
        self.min_attempts = min_attempts;
        self
    }

    pub fn with_min_failures(mut self, min_failures: u32) -> Self {
        self.min_failures = min_failures;
        self
    }

    pub fn with_min_evaluation_time(mut self, min_evaluation_time: Duration) -> Self {
        self.min_evaluation_time = min_evaluation_time;
        self
    }

    pub fn with_max_failure_count(mut self, max_failure_count: u32) -> Self {
        self.max_failure_count = Some(max_failure_count);
        self
    }

    /// Check every field against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.failure_threshold) {
            return Err(ConfigError::invalid(
                "failureThreshold",
                format!("{} is not within [0, 1]", self.failure_threshold),
            ));
        }
        // Timestamps are whole milliseconds, so sub-millisecond durations collapse to zero.
        if self.time_window < Duration::from_millis(1) {
            return Err(ConfigError::invalid("timeWindow", "must be at least 1ms"));
        }
        if self.reset_timeout < Duration::from_millis(1) {
            return Err(ConfigError::invalid("resetTimeout", "must be at least 1ms"));
        }
        if self.min_attempts == 0 {
            return Err(ConfigError::invalid("minAttempts", "must be at least 1"));
        }
        if self.min_failures == 0 {
            return Err(ConfigError::invalid("minFailures", "must be at least 1"));
        }
        if self.max_failure_count == Some(0) {
            return Err(ConfigError::invalid("maxFailureCount", "must be greater than zero"));
        }
        Ok(())
    }

    /// Parse and validate a YAML config.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file, choosing the format from its extension.
    ///
    /// `.json` is parsed as JSON; anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }
}

mod duration_str {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(u64),
        Text(String),
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&humantime::format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Millis(millis) => Ok(Duration::from_millis(millis)),
            Raw::Text(text) => humantime::parse_duration(text.trim()).map_err(de::Error::custom),
        }
    }
}
