//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (HARBOR_*)
//! 2. TOML config file (if HARBOR_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod engine;
mod validation;

pub use engine::EngineConfig;
pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (HARBOR_*)
/// 2. TOML config file (if HARBOR_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite database holding every store.
    ///
    /// Set via HARBOR_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Address the proxy listens on.
    ///
    /// Set via HARBOR_LISTEN_ADDR environment variable.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Origin of the application whose assets are cached.
    ///
    /// Set via HARBOR_APP_ORIGIN environment variable.
    #[serde(default = "default_app_origin")]
    pub app_origin: String,

    /// Store name for this generation's application assets.
    ///
    /// Bump it on every deployment so activation retires the old one.
    #[serde(default = "default_app_cache_name")]
    pub app_cache_name: String,

    /// Store name for third-party API responses.
    #[serde(default = "default_api_cache_name")]
    pub api_cache_name: String,

    /// URLs fetched and stored at install time, relative to `app_origin`.
    #[serde(default = "default_precache")]
    pub precache: Vec<String>,

    /// Hostnames whose GET requests are served network-first.
    ///
    /// Set via HARBOR_API_HOSTS environment variable.
    #[serde(default)]
    pub api_hosts: Vec<String>,

    /// Maximum number of snapshots kept in the api store.
    #[serde(default = "default_max_api_entries")]
    pub max_api_entries: usize,

    /// Root document served to offline navigations, relative to `app_origin`.
    #[serde(default = "default_offline_document")]
    pub offline_document: String,

    /// User-Agent string for upstream requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Upstream request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum redirects followed per upstream request.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./harbor-cache.sqlite")
}

fn default_listen_addr() -> String {
    "127.0.0.1:8787".into()
}

fn default_app_origin() -> String {
    "http://localhost:8080".into()
}

fn default_app_cache_name() -> String {
    "app-v1".into()
}

fn default_api_cache_name() -> String {
    "api-v1".into()
}

fn default_precache() -> Vec<String> {
    vec!["./".into(), "./index.html".into()]
}

fn default_max_api_entries() -> usize {
    50
}

fn default_offline_document() -> String {
    "./index.html".into()
}

fn default_user_agent() -> String {
    "harbor/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_redirects() -> usize {
    5
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            listen_addr: default_listen_addr(),
            app_origin: default_app_origin(),
            app_cache_name: default_app_cache_name(),
            api_cache_name: default_api_cache_name(),
            precache: default_precache(),
            api_hosts: Vec::new(),
            max_api_entries: default_max_api_entries(),
            offline_document: default_offline_document(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_redirects: default_max_redirects(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file or environment cannot be parsed, or
    /// if validation fails after loading.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("HARBOR_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("HARBOR_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        Self::from_figment(figment)
    }

    /// Extract and validate configuration from a prepared figment.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
