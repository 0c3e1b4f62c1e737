//! Strategy executor.
//!
//! [`Engine::handle`] classifies a request and runs the matching algorithm:
//!
//! - `App` requests go cache-first ([`Engine::cache_first`]), writing
//!   same-origin successes through to the app store.
//! - `Api` requests go network-first ([`Engine::network_first`]), storing every
//!   success in the api store and trimming it with [`eviction::trim_fifo`].
//! - `Ignored` requests are handed back for plain forwarding without touching
//!   the store.
//!
//! Steps within one request run strictly in order. Different requests may
//! interleave their store operations; writes to the same key are
//! last-write-wins.

mod cache_first;
pub mod eviction;
mod network_first;

use std::sync::Arc;

use crate::cache::CacheStorage;
use crate::classify::{Classifier, RouteClass};
use crate::config::EngineConfig;
use crate::network::Network;
use crate::request::InterceptedRequest;
use crate::response::Response;

/// What the host should do with an intercepted request.
#[derive(Debug)]
pub enum Dispatch {
    /// Answer with this response.
    Respond(Response),
    /// Send the original request to the network unmodified.
    Forward,
}

/// Per-generation request router.
#[derive(Clone)]
pub struct Engine {
    config: Arc<EngineConfig>,
    classifier: Classifier,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
}

impl Engine {
    pub fn new(config: Arc<EngineConfig>, storage: Arc<dyn CacheStorage>, network: Arc<dyn Network>) -> Self {
        let classifier = Classifier::new(config.api_hosts.iter().cloned());
        Self { config, classifier, storage, network }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn classify(&self, request: &InterceptedRequest) -> RouteClass {
        self.classifier.classify(request)
    }

    /// Route one request.
    pub async fn handle(&self, request: &InterceptedRequest) -> Dispatch {
        match self.classify(request) {
            RouteClass::Ignored => {
                tracing::trace!(method = %request.method, url = %request.url, "forwarding uncacheable request");
                Dispatch::Forward
            }
            RouteClass::App => Dispatch::Respond(self.cache_first(request).await),
            RouteClass::Api => Dispatch::Respond(self.network_first(request).await),
        }
    }
}
