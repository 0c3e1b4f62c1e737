//! Interception hooks binding lifecycle and strategy to a host.
//!
//! [`ServiceHost`] exposes the four entry points a host environment drives:
//! install, activate, fetch, and message. It owns the currently active
//! generation and at most one generation waiting to replace it.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, watch};

use crate::Error;
use crate::cache::CacheStorage;
use crate::config::EngineConfig;
use crate::lifecycle::{ActivationReport, Lifecycle, SKIP_WAITING};
use crate::network::{Network, NetworkError};
use crate::request::InterceptedRequest;
use crate::response::Response;
use crate::strategy::{Dispatch, Engine};

/// The active generation and its open clients.
struct Controller {
    engine: Engine,
    clients: watch::Sender<usize>,
}

impl Controller {
    fn new(engine: Engine) -> Self {
        let (clients, _) = watch::channel(0);
        Self { engine, clients }
    }

    fn attach(self: &Arc<Self>) -> ClientGuard {
        self.clients.send_modify(|n| *n += 1);
        ClientGuard { controller: self.clone() }
    }

    /// Resolves once no client is attached.
    async fn released(&self) {
        let mut rx = self.clients.subscribe();
        loop {
            if *rx.borrow_and_update() == 0 {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Holds a generation's client count up while a request is in flight.
struct ClientGuard {
    controller: Arc<Controller>,
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.controller.clients.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Host-facing entry points for the interception engine.
pub struct ServiceHost {
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    active: RwLock<Option<Arc<Controller>>>,
    waiting: Mutex<Option<Arc<Lifecycle>>>,
}

impl ServiceHost {
    pub fn new(storage: Arc<dyn CacheStorage>, network: Arc<dyn Network>) -> Self {
        Self { storage, network, active: RwLock::new(None), waiting: Mutex::new(None) }
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    /// Configuration of the generation currently intercepting requests.
    pub async fn active_config(&self) -> Option<EngineConfig> {
        self.active.read().await.as_ref().map(|c| c.engine.config().clone())
    }

    /// Install a new generation.
    ///
    /// A generation still installing or waiting is superseded: it never
    /// activates, and its pending `register` fails.
    pub async fn on_install(&self, config: EngineConfig) -> Result<Arc<Lifecycle>, Error> {
        let lifecycle = Arc::new(Lifecycle::new(Arc::new(config), self.storage.clone(), self.network.clone()));
        let replaced = self.waiting.lock().await.replace(lifecycle.clone());
        if let Some(replaced) = replaced
            && replaced.supersede()
        {
            tracing::info!(
                replaced = %replaced.config().app_cache,
                by = %lifecycle.config().app_cache,
                "waiting generation superseded"
            );
        }

        if let Err(e) = lifecycle.install().await {
            self.clear_waiting(&lifecycle).await;
            return Err(e);
        }
        Ok(lifecycle)
    }

    /// Activate an installed generation, then claim every client for it.
    pub async fn on_activate(&self, lifecycle: &Arc<Lifecycle>) -> Result<ActivationReport, Error> {
        let report = lifecycle.activate().await?;
        self.claim(lifecycle).await;
        Ok(report)
    }

    async fn claim(&self, lifecycle: &Arc<Lifecycle>) {
        let controller = Arc::new(Controller::new(lifecycle.engine()));
        *self.active.write().await = Some(controller);
        self.clear_waiting(lifecycle).await;
        tracing::info!(store = %lifecycle.config().app_cache, "generation claimed clients");
    }

    async fn clear_waiting(&self, lifecycle: &Arc<Lifecycle>) {
        let mut waiting = self.waiting.lock().await;
        if waiting.as_ref().is_some_and(|w| Arc::ptr_eq(w, lifecycle)) {
            *waiting = None;
        }
    }

    /// Answer one intercepted request.
    ///
    /// Without an active generation, and for requests the engine does not
    /// handle, the request goes to the network unmodified. A network failure
    /// on that pass-through path is the only error returned.
    pub async fn on_fetch(&self, request: InterceptedRequest) -> Result<Response, NetworkError> {
        let controller = self.active.read().await.clone();
        let Some(controller) = controller else {
            return self.network.fetch(&request).await;
        };

        let _client = controller.attach();
        match controller.engine.handle(&request).await {
            Dispatch::Respond(response) => Ok(response),
            Dispatch::Forward => self.network.fetch(&request).await,
        }
    }

    /// Deliver a message from the application.
    ///
    /// Only [`SKIP_WAITING`] is recognised; it returns true. Everything else
    /// is ignored and returns false.
    pub async fn on_message(&self, signal: &str) -> bool {
        if signal != SKIP_WAITING {
            tracing::debug!(signal, "ignoring unrecognised message");
            return false;
        }

        match self.waiting.lock().await.as_ref() {
            Some(lifecycle) => lifecycle.skip_waiting(),
            None => tracing::debug!("skip waiting received with no generation waiting"),
        }
        true
    }

    /// Install, wait for handover, and activate a generation.
    ///
    /// With nothing active the new generation takes over immediately.
    /// Otherwise it waits until the current generation has no request in
    /// flight, or until a skip-waiting message arrives.
    pub async fn register(&self, config: EngineConfig) -> Result<ActivationReport, Error> {
        let lifecycle = self.on_install(config).await?;

        let previous = self.active.read().await.clone();
        if let Some(previous) = previous {
            lifecycle.wait_for_handover(previous.released()).await?;
        }

        self.on_activate(&lifecycle).await
    }
}
