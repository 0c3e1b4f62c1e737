//! Core engine for harbor, an offline-first interception proxy.
//!
//! This crate provides:
//! - Versioned snapshot stores with a SQLite backend
//! - Request classification and the cache-first / network-first strategies
//! - FIFO eviction for the api store
//! - Generation lifecycle (install, wait, activate) and the host hooks
//! - Unified error types and layered configuration

pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod network;
pub mod request;
pub mod response;
pub mod strategy;

#[cfg(test)]
mod testing;

pub use cache::{CacheDb, CacheStorage, Snapshot};
pub use classify::{Classifier, RouteClass};
pub use config::{AppConfig, ConfigError, EngineConfig};
pub use error::Error;
pub use host::ServiceHost;
pub use lifecycle::{ActivationReport, Lifecycle, LifecycleState, SKIP_WAITING};
pub use network::{Network, NetworkError};
pub use request::{InterceptedRequest, RequestKey, RequestMode};
pub use response::{Response, ResponseSource};
pub use strategy::{Dispatch, Engine};
