use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::sqlite::DEFAULT_BUSY_TIMEOUT;

/// Pool settings, usually read from a TOML file:
///
/// ```toml
/// capacity = 2
/// database = "example.db"
/// release_delay_ms = 500
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    /// SQLite allows a single writer, so one connection avoids lock waits.
    pub capacity: usize,
    pub database: PathBuf,
    pub release_delay_ms: Option<u64>,
    pub busy_timeout_ms: Option<u64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            capacity: 1,
            database: PathBuf::from("example.db"),
            release_delay_ms: None,
            busy_timeout_ms: None,
        }
    }
}

impl PoolConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: PoolConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let input = std::fs::read_to_string(path)?;
        Self::from_toml_str(&input)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }

    pub fn release_delay(&self) -> Option<Duration> {
        self.release_delay_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn busy_timeout(&self) -> Duration {
        self.busy_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_BUSY_TIMEOUT)
    }
}
