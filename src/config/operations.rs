//! Config loading, validation, and utility operations.

use super::model::Config;
use crate::error::{Result, UnijobError};
use std::path::Path;
use std::time::Duration;

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward
    /// compatibility.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            UnijobError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| UnijobError::Config(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| UnijobError::Config(format!("failed to serialize config to YAML: {}", e)))
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `prefix` must be non-empty and contain no `:` or whitespace
    /// - `changelog_history_size` must be positive
    /// - `reaper_count` must be positive
    /// - `reaper_interval_secs` must be positive
    pub fn validate(&self) -> Result<()> {
        if self.prefix.is_empty() {
            return Err(UnijobError::Config(
                "config validation failed: prefix must not be empty".to_string(),
            ));
        }
        if self.prefix.contains(':') || self.prefix.contains(char::is_whitespace) {
            return Err(UnijobError::Config(format!(
                "config validation failed: prefix must not contain ':' or whitespace (found '{}')",
                self.prefix
            )));
        }

        if self.changelog_history_size == 0 {
            return Err(UnijobError::Config(
                "config validation failed: changelog_history_size must be greater than 0"
                    .to_string(),
            ));
        }

        if self.reaper_count == 0 {
            return Err(UnijobError::Config(
                "config validation failed: reaper_count must be greater than 0".to_string(),
            ));
        }

        if self.reaper_interval_secs == 0 {
            return Err(UnijobError::Config(
                "config validation failed: reaper_interval_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// The default lock TTL as a `Duration`.
    pub fn default_lock_ttl(&self) -> Option<Duration> {
        self.default_lock_ttl_ms.map(Duration::from_millis)
    }

    /// The default acquisition timeout as a `Duration` (`None` = wait forever).
    pub fn default_lock_timeout(&self) -> Option<Duration> {
        self.default_lock_timeout_ms.map(Duration::from_millis)
    }

    /// The interval between reaper runs.
    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }
}
