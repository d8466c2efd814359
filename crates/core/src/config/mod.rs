//! Cache configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (DATAVAULT_*)
//! 2. TOML config file (if DATAVAULT_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Cache configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (DATAVAULT_*)
/// 2. TOML config file (if DATAVAULT_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Root of the date-sharded store.
    ///
    /// Set via DATAVAULT_BASE_DIR environment variable.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Entries older than this are treated as misses.
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,

    /// Retention window used by `cleanup`.
    #[serde(default = "default_cleanup_retention_days")]
    pub cleanup_retention_days: u64,

    /// Number of date shards probed by a read, today included.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    /// Maximum number of records held in memory.
    #[serde(default = "default_memory_cache_capacity")]
    pub memory_cache_capacity: usize,

    /// Lifetime of a memory record.
    #[serde(default = "default_memory_cache_ttl_seconds")]
    pub memory_cache_ttl_seconds: u64,

    /// Image fetches in flight per batch.
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,

    /// Retries after the first fetch attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay of the exponential backoff.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// TCP connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Per-read timeout in milliseconds.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Maximum bytes accepted for one fetched payload.
    ///
    /// Set via DATAVAULT_MAX_PAYLOAD_BYTES environment variable.
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    /// Failures within the block window before a domain is skipped.
    #[serde(default = "default_domain_failure_threshold")]
    pub domain_failure_threshold: u32,

    /// How long a domain stays blocked after its last failure.
    #[serde(default = "default_domain_block_duration_seconds")]
    pub domain_block_duration_seconds: u64,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Array field of a response holding the items with images.
    #[serde(default = "default_items_field")]
    pub items_field: String,

    /// Field of each item holding the image URL.
    #[serde(default = "default_image_field")]
    pub image_field: String,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("./cache")
}

fn default_max_age_hours() -> u64 {
    24
}

fn default_cleanup_retention_days() -> u64 {
    7
}

fn default_lookback_days() -> u32 {
    7
}

fn default_memory_cache_capacity() -> usize {
    100
}

fn default_memory_cache_ttl_seconds() -> u64 {
    3600
}

fn default_fetch_concurrency() -> usize {
    20
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_read_timeout_ms() -> u64 {
    10_000
}

fn default_max_payload_bytes() -> usize {
    10 * 1024 * 1024 // 10MB
}

fn default_domain_failure_threshold() -> u32 {
    3
}

fn default_domain_block_duration_seconds() -> u64 {
    3600
}

fn default_user_agent() -> String {
    "datavault/0.1".into()
}

fn default_items_field() -> String {
    "articles".into()
}

fn default_image_field() -> String {
    "urlToImage".into()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            max_age_hours: default_max_age_hours(),
            cleanup_retention_days: default_cleanup_retention_days(),
            lookback_days: default_lookback_days(),
            memory_cache_capacity: default_memory_cache_capacity(),
            memory_cache_ttl_seconds: default_memory_cache_ttl_seconds(),
            fetch_concurrency: default_fetch_concurrency(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            max_payload_bytes: default_max_payload_bytes(),
            domain_failure_threshold: default_domain_failure_threshold(),
            domain_block_duration_seconds: default_domain_block_duration_seconds(),
            user_agent: default_user_agent(),
            items_field: default_items_field(),
            image_field: default_image_field(),
        }
    }
}

impl CacheConfig {
    /// Configuration rooted at `base_dir`, everything else default.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into(), ..Default::default() }
    }

    /// Saturates at `TimeDelta::MAX` for values `validate` would reject.
    pub fn max_age(&self) -> chrono::Duration {
        i64::try_from(self.max_age_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .unwrap_or(chrono::Duration::MAX)
    }

    /// Saturates at `TimeDelta::MAX` for values `validate` would reject.
    pub fn cleanup_retention(&self) -> chrono::Duration {
        i64::try_from(self.cleanup_retention_days)
            .ok()
            .and_then(chrono::Duration::try_days)
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn memory_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.memory_cache_ttl_seconds)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn domain_block_duration(&self) -> Duration {
        Duration::from_secs(self.domain_block_duration_seconds)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `DATAVAULT_`
    /// 2. TOML file from `DATAVAULT_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("DATAVAULT_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        Self::extract(figment.merge(
            Env::prefixed("DATAVAULT_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into()),
        ))
    }

    /// Load defaults overlaid with a TOML string. Used by embedders that keep
    /// their cache settings inside a larger document.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Self::extract(Figment::from(Serialized::defaults(Self::default())).merge(Toml::string(toml)))
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.base_dir, PathBuf::from("./cache"));
        assert_eq!(config.max_age_hours, 24);
        assert_eq!(config.cleanup_retention_days, 7);
        assert_eq!(config.lookback_days, 7);
        assert_eq!(config.memory_cache_capacity, 100);
        assert_eq!(config.memory_cache_ttl_seconds, 3600);
        assert_eq!(config.fetch_concurrency, 20);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.max_payload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.domain_failure_threshold, 3);
        assert_eq!(config.domain_block_duration_seconds, 3600);
        assert_eq!(config.items_field, "articles");
        assert_eq!(config.image_field, "urlToImage");
    }

    #[test]
    fn test_durations_saturate() {
        let config = CacheConfig { max_age_hours: u64::MAX, cleanup_retention_days: u64::MAX, ..Default::default() };
        assert_eq!(config.max_age(), chrono::Duration::MAX);
        assert_eq!(config.cleanup_retention(), chrono::Duration::MAX);

        let config = CacheConfig { max_age_hours: i64::MAX as u64, ..Default::default() };
        assert_eq!(config.max_age(), chrono::Duration::MAX);
    }

    #[test]
    fn test_durations() {
        let config = CacheConfig::default();
        assert_eq!(config.max_age(), chrono::Duration::hours(24));
        assert_eq!(config.cleanup_retention(), chrono::Duration::days(7));
        assert_eq!(config.memory_cache_ttl(), Duration::from_secs(3600));
        assert_eq!(config.connect_timeout(), Duration::from_millis(5_000));
        assert_eq!(config.read_timeout(), Duration::from_millis(10_000));
        assert_eq!(config.domain_block_duration(), Duration::from_secs(3600));
    }

    #[test]
    fn test_with_base_dir() {
        let config = CacheConfig::with_base_dir("/var/cache/dv");
        assert_eq!(config.base_dir, PathBuf::from("/var/cache/dv"));
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_from_toml_overrides_defaults() {
        let config = CacheConfig::from_toml_str(
            r#"
            base_dir = "/tmp/vault"
            memory_cache_capacity = 5
            domain_failure_threshold = 1
            "#,
        )
        .unwrap();
        assert_eq!(config.base_dir, PathBuf::from("/tmp/vault"));
        assert_eq!(config.memory_cache_capacity, 5);
        assert_eq!(config.domain_failure_threshold, 1);
        assert_eq!(config.fetch_concurrency, 20);
    }

    #[test]
    fn test_from_toml_rejects_invalid_values() {
        let result = CacheConfig::from_toml_str("fetch_concurrency = 0");
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "fetch_concurrency"));
    }

    #[test]
    fn test_from_toml_rejects_wrong_type() {
        let result = CacheConfig::from_toml_str("max_retries = \"many\"");
        assert!(matches!(result, Err(ConfigError::LoadFailed(_))));
    }
}
