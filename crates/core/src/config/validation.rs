//! Configuration validation rules.
//!
//! Malformed configuration is a programmer error and is rejected when the
//! cache is constructed, never later on the hot path.

use crate::config::CacheConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

/// Upper bound on `max_age_hours` (100 years).
pub const MAX_AGE_HOURS_LIMIT: u64 = 100 * 365 * 24;

/// Upper bound on `cleanup_retention_days` (100 years).
pub const CLEANUP_RETENTION_DAYS_LIMIT: u64 = 100 * 365;

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl CacheConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if `base_dir` is empty, and
    /// `ConfigError::Invalid` if:
    /// - a capacity, count or window is 0
    /// - `max_payload_bytes` exceeds 50MB
    /// - `max_age_hours` or `cleanup_retention_days` spans more than 100 years
    /// - a timeout is below 100ms or above 5 minutes
    /// - `user_agent` or a response field name is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_dir.as_os_str().is_empty() {
            return Err(ConfigError::Missing {
                field: "base_dir".into(),
                hint: "Set DATAVAULT_BASE_DIR environment variable".into(),
            });
        }

        let non_zero = [
            ("max_age_hours", self.max_age_hours == 0),
            ("cleanup_retention_days", self.cleanup_retention_days == 0),
            ("lookback_days", self.lookback_days == 0),
            ("memory_cache_capacity", self.memory_cache_capacity == 0),
            ("memory_cache_ttl_seconds", self.memory_cache_ttl_seconds == 0),
            ("fetch_concurrency", self.fetch_concurrency == 0),
            ("max_payload_bytes", self.max_payload_bytes == 0),
            ("domain_failure_threshold", self.domain_failure_threshold == 0),
            ("domain_block_duration_seconds", self.domain_block_duration_seconds == 0),
        ];
        if let Some((field, _)) = non_zero.iter().find(|(_, zero)| *zero) {
            return Err(invalid(field, "must be greater than 0"));
        }

        if self.max_age_hours > MAX_AGE_HOURS_LIMIT {
            return Err(invalid("max_age_hours", "must not exceed 100 years (876000 hours)"));
        }
        if self.cleanup_retention_days > CLEANUP_RETENTION_DAYS_LIMIT {
            return Err(invalid("cleanup_retention_days", "must not exceed 100 years (36500 days)"));
        }

        if self.max_payload_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_payload_bytes", "must not exceed 50MB"));
        }

        for (field, value) in [("connect_timeout_ms", self.connect_timeout_ms), ("read_timeout_ms", self.read_timeout_ms)]
        {
            if value < 100 {
                return Err(invalid(field, "must be at least 100ms"));
            }
            if value > 300_000 {
                return Err(invalid(field, "must not exceed 5 minutes (300000ms)"));
            }
        }

        if self.max_retries > 10 {
            return Err(invalid("max_retries", "must not exceed 10"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }
        if self.items_field.is_empty() {
            return Err(invalid("items_field", "must not be empty"));
        }
        if self.image_field.is_empty() {
            return Err(invalid("image_field", "must not be empty"));
        }

        if self
            .max_age_hours
            .checked_mul(3600)
            .is_some_and(|max_age_seconds| self.memory_cache_ttl_seconds > max_age_seconds)
        {
            tracing::warn!(
                memory_cache_ttl_seconds = self.memory_cache_ttl_seconds,
                max_age_hours = self.max_age_hours,
                "memory TTL outlives max_age; memory hits are still checked against max_age"
            );
        }

        Ok(())
    }
}
