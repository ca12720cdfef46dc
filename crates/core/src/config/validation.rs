//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `origin_url` is not an absolute http(s) URL
    /// - `cache_prefix` or `cache_version` is empty, or the version contains whitespace
    /// - `fallbacks` is empty or holds a path not starting with `/`
    /// - `maintenance_path` does not start with `/`
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        let origin = url::Url::parse(&self.origin_url).map_err(|e| invalid("origin_url", e.to_string()))?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err(invalid("origin_url", format!("unsupported scheme: {}", origin.scheme())));
        }

        if self.cache_prefix.is_empty() {
            return Err(invalid("cache_prefix", "must not be empty"));
        }
        if self.cache_version.is_empty() {
            return Err(invalid("cache_version", "must not be empty"));
        }
        if self.cache_version.chars().any(char::is_whitespace) {
            return Err(invalid("cache_version", "must not contain whitespace"));
        }

        if self.fallbacks.is_empty() {
            return Err(invalid("fallbacks", "must list at least one path"));
        }
        if let Some(path) = self.fallbacks.iter().find(|p| !p.starts_with('/')) {
            return Err(invalid("fallbacks", format!("path must start with '/': {path}")));
        }

        if !self.maintenance_path.starts_with('/') {
            return Err(invalid("maintenance_path", "must start with '/'"));
        }

        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if !self.fallbacks.contains(&self.maintenance_path) {
            tracing::warn!(
                maintenance_path = %self.maintenance_path,
                "maintenance_path is not listed in fallbacks; \
                 maintenance responses will use the inline document"
            );
        }

        Ok(())
    }
}
