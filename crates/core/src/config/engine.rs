//! Resolved, immutable configuration for one generation of the engine.

use url::Url;

use super::{AppConfig, ConfigError};

/// Everything the engine needs to route and cache requests.
///
/// Built once per generation and shared behind an `Arc`; nothing here changes
/// while the generation is alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Origin of the application; only same-origin app responses are stored.
    pub app_origin: Url,
    /// Store holding this generation's application assets.
    pub app_cache: String,
    /// Store holding API responses; survives version upgrades.
    pub api_cache: String,
    /// Absolute URLs fetched at install time.
    pub precache: Vec<Url>,
    /// Exact, case-sensitive hostnames routed network-first.
    pub api_hosts: Vec<String>,
    /// Ceiling on the api store's snapshot count.
    pub max_api_entries: usize,
    /// Root document served to navigations while offline.
    pub offline_document: Url,
}

impl EngineConfig {
    /// Defaults for `origin`: `app-v1` / `api-v1`, no preload, 50 API entries.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `origin` cannot be a base for the
    /// `./index.html` offline document.
    pub fn for_origin(origin: Url) -> Result<Self, ConfigError> {
        let offline_document = origin.join("./index.html").map_err(|e| ConfigError::Invalid {
            field: "offline_document".into(),
            reason: format!("{origin}: {e}"),
        })?;
        Ok(Self {
            app_origin: origin,
            app_cache: "app-v1".into(),
            api_cache: "api-v1".into(),
            precache: Vec::new(),
            api_hosts: Vec::new(),
            max_api_entries: 50,
            offline_document,
        })
    }

    /// Store names that survive activation of this generation.
    pub fn expected_stores(&self) -> [&str; 2] {
        [self.app_cache.as_str(), self.api_cache.as_str()]
    }
}

impl AppConfig {
    /// Resolve relative URLs against the app origin.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the origin or any relative entry
    /// cannot be parsed.
    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let app_origin = self.parsed_origin()?;

        let precache = self
            .precache
            .iter()
            .map(|entry| {
                app_origin.join(entry).map_err(|e| ConfigError::Invalid {
                    field: "precache".into(),
                    reason: format!("{entry}: {e}"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let offline_document = app_origin.join(&self.offline_document).map_err(|e| ConfigError::Invalid {
            field: "offline_document".into(),
            reason: e.to_string(),
        })?;

        Ok(EngineConfig {
            app_origin,
            app_cache: self.app_cache_name.clone(),
            api_cache: self.api_cache_name.clone(),
            precache,
            api_hosts: self.api_hosts.clone(),
            max_api_entries: self.max_api_entries,
            offline_document,
        })
    }

    fn parsed_origin(&self) -> Result<Url, ConfigError> {
        let origin = Url::parse(&self.app_origin)
            .map_err(|e| ConfigError::Invalid { field: "app_origin".into(), reason: e.to_string() })?;

        match origin.scheme() {
            "http" | "https" => Ok(origin),
            scheme => {
                Err(ConfigError::Invalid { field: "app_origin".into(), reason: format!("unsupported scheme: {scheme}") })
            }
        }
    }
}
