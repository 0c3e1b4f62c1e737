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

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `app_origin` is not an http(s) URL, or a relative URL does not resolve against it
    /// - a store name is empty, or both store names are equal
    /// - `max_api_entries` is 0
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` or an API host is empty
    ///
    /// Returns `ConfigError::Missing` if `listen_addr` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_addr.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "listen_addr".into(),
                hint: "Set HARBOR_LISTEN_ADDR environment variable".into(),
            });
        }

        self.engine_config()?;

        if self.app_cache_name.trim().is_empty() {
            return Err(ConfigError::Invalid { field: "app_cache_name".into(), reason: "must not be empty".into() });
        }
        if self.api_cache_name.trim().is_empty() {
            return Err(ConfigError::Invalid { field: "api_cache_name".into(), reason: "must not be empty".into() });
        }
        if self.app_cache_name == self.api_cache_name {
            return Err(ConfigError::Invalid {
                field: "api_cache_name".into(),
                reason: "must differ from app_cache_name".into(),
            });
        }

        if self.max_api_entries == 0 {
            return Err(ConfigError::Invalid {
                field: "max_api_entries".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        for host in &self.api_hosts {
            if host.trim().is_empty() {
                return Err(ConfigError::Invalid { field: "api_hosts".into(), reason: "must not contain empty hosts".into() });
            }
            if host.chars().any(|c| c.is_ascii_uppercase()) {
                tracing::warn!(
                    host = %host,
                    "API host contains uppercase letters; request hosts are lowercase, \
                     so it will never match"
                );
            }
        }

        Ok(())
    }
}
