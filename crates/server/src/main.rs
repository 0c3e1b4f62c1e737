//! harbor proxy entry point.
//!
//! Boots the interception proxy on the configured address. Logging goes to
//! stderr as JSON.

use std::sync::Arc;

use anyhow::Result;
use harbor_client::{FetchClient, FetchConfig};
use harbor_core::{AppConfig, CacheDb, EngineConfig, ServiceHost};
use tracing_subscriber::EnvFilter;

mod error;
mod handler;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    let engine_config = config.engine_config()?;

    let db = CacheDb::open(&config.db_path).await?;
    let client = FetchClient::new(FetchConfig::from(&config))?;
    let host = Arc::new(ServiceHost::new(Arc::new(db), Arc::new(client)));

    let app_origin = engine_config.app_origin.clone();
    register(&host, engine_config).await;

    #[cfg(unix)]
    tokio::spawn(reload_on_hangup(host.clone(), app_origin.clone()));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, origin = %app_origin, "harbor proxy listening");

    let app = handler::router(handler::ProxyState { host, app_origin });
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}

/// Register a generation, logging the outcome.
///
/// A failed install leaves the previous generation (or pass-through) serving.
async fn register(host: &ServiceHost, config: EngineConfig) {
    let store = config.app_cache.clone();
    match host.register(config).await {
        Ok(report) => tracing::info!(
            store = %store,
            retained = ?report.retained,
            deleted = ?report.deleted,
            failed = ?report.failed,
            "generation active"
        ),
        Err(e) => tracing::error!(store = %store, error = %e, "generation not installed"),
    }
}

/// Reload configuration on SIGHUP and register the resulting generation.
#[cfg(unix)]
async fn reload_on_hangup(host: Arc<ServiceHost>, app_origin: url::Url) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(error = %e, "cannot listen for SIGHUP; reload disabled");
            return;
        }
    };

    while hangup.recv().await.is_some() {
        let reloaded = AppConfig::load().and_then(|c| c.engine_config());
        let config = match reloaded {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(error = %e, "config reload failed");
                continue;
            }
        };

        if config.app_origin != app_origin {
            tracing::warn!(current = %app_origin, requested = %config.app_origin, "app origin changes need a restart");
            continue;
        }

        tracing::info!(store = %config.app_cache, "config reloaded, registering generation");
        let host = host.clone();
        tokio::spawn(async move { register(&host, config).await });
    }
}
