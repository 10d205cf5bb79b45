//! Configuration for the resource cache.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration for the resource cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of resources kept loaded at once (default: 5).
    #[serde(default = "default_max_cache_size")]
    pub max_cache_size: usize,

    /// Milliseconds a loaded resource may sit unused before it expires
    /// (default: 1_800_000 = 30 minutes).
    #[serde(default = "default_cache_ttl_millis")]
    pub cache_ttl_millis: u64,

    /// How often the optional background sweeper runs in seconds (default: 300 = 5 minutes).
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

fn default_max_cache_size() -> usize {
    5
}

fn default_cache_ttl_millis() -> u64 {
    1_800_000 // 30 minutes
}

fn default_cleanup_interval_secs() -> u64 {
    300 // 5 minutes
}

/// Errors that can occur while loading or validating a cache configuration.
#[derive(Debug, Error)]
pub enum CacheConfigError {
    /// Invalid max cache size (must be > 0).
    #[error("Invalid max cache size: must be greater than 0")]
    InvalidMaxCacheSize,

    /// Invalid time-to-live (must be > 0).
    #[error("Invalid cache TTL: must be greater than 0")]
    InvalidTtl,

    /// Invalid cleanup interval (must be > 0).
    #[error("Invalid cleanup interval: must be greater than 0")]
    InvalidCleanupInterval,

    /// The configuration file could not be read.
    #[error("Failed to read cache config: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid TOML for this schema.
    #[error("Failed to parse cache config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cache_size: default_max_cache_size(),
            cache_ttl_millis: default_cache_ttl_millis(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl CacheConfig {
    /// Validate the cache configuration.
    ///
    /// # Errors
    /// Returns `CacheConfigError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), CacheConfigError> {
        if self.max_cache_size == 0 {
            return Err(CacheConfigError::InvalidMaxCacheSize);
        }

        if self.cache_ttl_millis == 0 {
            return Err(CacheConfigError::InvalidTtl);
        }

        if self.cleanup_interval_secs == 0 {
            return Err(CacheConfigError::InvalidCleanupInterval);
        }

        Ok(())
    }

    /// Parse and validate a configuration from TOML. Missing keys take their defaults.
    ///
    /// ```toml
    /// max_cache_size = 3
    /// cache_ttl_millis = 600000
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self, CacheConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CacheConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Sets the maximum number of loaded resources.
    #[must_use]
    pub fn with_max_cache_size(mut self, max_cache_size: usize) -> Self {
        self.max_cache_size = max_cache_size;
        self
    }

    /// Sets the time-to-live of idle resources.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Get the time-to-live as a Duration.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_millis)
    }

    /// Get the cleanup interval as a Duration.
    #[must_use]
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cache_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.max_cache_size, 5);
        assert_eq!(config.cache_ttl_millis, 1_800_000);
        assert_eq!(config.cleanup_interval_secs, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cache_config_validation_invalid_max_size() {
        let config = CacheConfig::default().with_max_cache_size(0);

        assert!(matches!(config.validate(), Err(CacheConfigError::InvalidMaxCacheSize)));
    }

    #[test]
    fn test_cache_config_validation_invalid_ttl() {
        let config = CacheConfig { cache_ttl_millis: 0, ..CacheConfig::default() };

        assert!(matches!(config.validate(), Err(CacheConfigError::InvalidTtl)));
    }

    #[test]
    fn test_cache_config_validation_invalid_cleanup_interval() {
        let config = CacheConfig { cleanup_interval_secs: 0, ..CacheConfig::default() };

        assert!(matches!(config.validate(), Err(CacheConfigError::InvalidCleanupInterval)));
    }

    #[test]
    fn test_cache_config_durations() {
        let config = CacheConfig::default().with_ttl(Duration::from_secs(90));

        assert_eq!(config.cache_ttl_millis, 90_000);
        assert_eq!(config.ttl(), Duration::from_secs(90));
        assert_eq!(config.cleanup_interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_with_ttl_saturates_and_truncates() {
        let config = CacheConfig::default().with_ttl(Duration::MAX);
        assert_eq!(config.cache_ttl_millis, u64::MAX);
        assert!(config.validate().is_ok());

        let config = CacheConfig::default().with_ttl(Duration::from_micros(500));
        assert_eq!(config.cache_ttl_millis, 0);
        assert!(matches!(config.validate(), Err(CacheConfigError::InvalidTtl)));
    }

    #[test]
    fn test_cache_config_from_toml_partial() {
        let config = CacheConfig::from_toml_str("max_cache_size = 2\n").unwrap();

        assert_eq!(config.max_cache_size, 2);
        assert_eq!(config.cache_ttl_millis, 1_800_000);
    }

    #[test]
    fn test_cache_config_from_toml_rejects_invalid_values() {
        let err = CacheConfig::from_toml_str("cache_ttl_millis = 0\n").unwrap_err();
        assert!(matches!(err, CacheConfigError::InvalidTtl));

        let err = CacheConfig::from_toml_str("max_cache_size = \"many\"\n").unwrap_err();
        assert!(matches!(err, CacheConfigError::Parse(_)));
    }

    #[test]
    fn test_cache_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_cache_size = 8").unwrap();
        writeln!(file, "cache_ttl_millis = 60000").unwrap();

        let config = CacheConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_cache_size, 8);
        assert_eq!(config.ttl(), Duration::from_secs(60));

        let missing = CacheConfig::from_file(file.path().with_extension("missing"));
        assert!(matches!(missing, Err(CacheConfigError::Io(_))));
    }
}
