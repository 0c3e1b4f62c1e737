//! Generation lifecycle: install, wait, activate.
//!
//! A generation moves `Installing -> Waiting -> Activating -> Active`. A failed
//! install ends in `Redundant` and never activates, so the previous generation
//! keeps serving. A generation replaced by a newer install before it activates
//! is also made `Redundant`.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use crate::Error;
use crate::cache::{CacheStorage, Snapshot};
use crate::config::EngineConfig;
use crate::network::Network;
use crate::request::InterceptedRequest;
use crate::strategy::Engine;

/// The one message that makes a waiting generation take over immediately.
pub const SKIP_WAITING: &str = "SKIP_WAITING";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Installing,
    /// Installed; waiting for the previous generation to let go.
    Waiting,
    Activating,
    Active,
    /// Install failed or a newer generation replaced this one; it will
    /// never activate.
    Redundant,
}

/// Outcome of the activation sweep over existing store names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    pub retained: Vec<String>,
    pub deleted: Vec<String>,
    /// Stale stores whose deletion failed; retried on the next activation.
    pub failed: Vec<String>,
}

/// Lifecycle manager for one generation.
pub struct Lifecycle {
    config: Arc<EngineConfig>,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    state: watch::Sender<LifecycleState>,
    skip_waiting: watch::Sender<bool>,
}

impl Lifecycle {
    pub fn new(config: Arc<EngineConfig>, storage: Arc<dyn CacheStorage>, network: Arc<dyn Network>) -> Self {
        let (state, _) = watch::channel(LifecycleState::Installing);
        let (skip_waiting, _) = watch::channel(false);
        Self { config, storage, network, state, skip_waiting }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Engine serving requests for this generation.
    pub fn engine(&self) -> Engine {
        Engine::new(self.config.clone(), self.storage.clone(), self.network.clone())
    }

    /// Fetch every preload URL and commit them to the app store.
    ///
    /// All fetches must succeed with a 2xx status before anything is
    /// written; the write itself is a single transaction. On failure a store
    /// created by this call is removed again.
    pub async fn install(&self) -> Result<(), Error> {
        self.expect_state(LifecycleState::Installing, "install")?;

        let store = &self.config.app_cache;
        let created = match self.storage.open(store).await {
            Ok(created) => created,
            Err(e) => return Err(self.fail_install(false, e).await),
        };

        let snapshots = match self.precache().await {
            Ok(snapshots) => snapshots,
            Err(e) => return Err(self.fail_install(created, e).await),
        };

        if let Err(e) = self.storage.put_all(store, &snapshots).await {
            return Err(self.fail_install(created, e).await);
        }

        self.advance(LifecycleState::Installing, LifecycleState::Waiting, "finish install")?;
        tracing::info!(store = %store, entries = snapshots.len(), "generation installed");
        Ok(())
    }

    async fn precache(&self) -> Result<Vec<Snapshot>, Error> {
        let fetches = self.config.precache.iter().map(|url| async move {
            let request = InterceptedRequest::get(url.clone());
            let response = self
                .network
                .fetch(&request)
                .await
                .map_err(|e| Error::InstallFailed { url: url.to_string(), reason: e.to_string() })?;

            if !response.is_success() {
                return Err(Error::InstallFailed {
                    url: url.to_string(),
                    reason: format!("status {}", response.status.as_u16()),
                });
            }

            Ok(response.to_snapshot(request.key()))
        });

        futures::future::try_join_all(fetches).await
    }

    async fn fail_install(&self, created: bool, err: Error) -> Error {
        let store = &self.config.app_cache;
        // A superseded generation may share its store name with the one that replaced it.
        let superseded = self.state() == LifecycleState::Redundant;
        if created && !superseded && let Err(e) = self.storage.delete_store(store).await {
            tracing::warn!(store = %store, error = %e, "failed to remove partially installed store");
        }
        tracing::error!(store = %store, error = %err, "install failed");
        self.transition(LifecycleState::Redundant);
        err
    }

    /// Ask this generation to stop waiting for the previous one.
    ///
    /// The signal is remembered, so it also works when sent before the
    /// install has finished.
    pub fn skip_waiting(&self) {
        tracing::info!(store = %self.config.app_cache, "skip waiting requested");
        self.skip_waiting.send_replace(true);
    }

    /// Retire this generation before it activates.
    ///
    /// Only an `Installing` or `Waiting` generation can be superseded; it
    /// becomes `Redundant`, a pending handover wait fails, and `activate` is
    /// refused. Returns false when the generation is already past that point.
    pub fn supersede(&self) -> bool {
        let retired = self.state.send_if_modified(|state| match *state {
            LifecycleState::Installing | LifecycleState::Waiting => {
                *state = LifecycleState::Redundant;
                true
            }
            _ => false,
        });
        if retired {
            tracing::info!(store = %self.config.app_cache, "generation superseded");
        }
        retired
    }

    /// Resolve once the previous generation is released or skip-waiting is
    /// signalled, whichever comes first.
    ///
    /// Fails with `LIFECYCLE_ERROR` if the generation is superseded first.
    pub async fn wait_for_handover<F>(&self, previous_released: F) -> Result<(), Error>
    where
        F: Future<Output = ()>,
    {
        self.expect_state(LifecycleState::Waiting, "wait for handover")?;

        let mut state = self.state.subscribe();
        let superseded = async move {
            loop {
                if *state.borrow_and_update() == LifecycleState::Redundant {
                    return;
                }
                if state.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
        };

        let mut skip = self.skip_waiting.subscribe();
        let skipped = async move {
            loop {
                if *skip.borrow_and_update() {
                    return;
                }
                if skip.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            biased;
            () = superseded => {
                return Err(Error::InvalidState(format!("{} was superseded while waiting", self.config.app_cache)));
            }
            () = skipped => tracing::debug!(store = %self.config.app_cache, "skipped waiting"),
            () = previous_released => tracing::debug!(store = %self.config.app_cache, "previous generation released"),
        }
        Ok(())
    }

    /// Delete every store that is neither this generation's app store nor
    /// the api store.
    ///
    /// Deletion is best-effort per store. Failing to list stores aborts the
    /// activation and leaves the generation waiting.
    pub async fn activate(&self) -> Result<ActivationReport, Error> {
        self.advance(LifecycleState::Waiting, LifecycleState::Activating, "activate")?;

        let names = match self.storage.store_names().await {
            Ok(names) => names,
            Err(e) => {
                self.transition(LifecycleState::Waiting);
                return Err(e);
            }
        };

        let keep = self.config.expected_stores();
        let mut report = ActivationReport::default();

        for name in names {
            if keep.contains(&name.as_str()) {
                report.retained.push(name);
                continue;
            }

            match self.storage.delete_store(&name).await {
                Ok(_) => {
                    tracing::info!(store = %name, "deleted stale store");
                    report.deleted.push(name);
                }
                Err(e) => {
                    tracing::warn!(store = %name, error = %e, "failed to delete stale store");
                    report.failed.push(name);
                }
            }
        }

        self.transition(LifecycleState::Active);
        Ok(report)
    }

    fn expect_state(&self, expected: LifecycleState, action: &str) -> Result<(), Error> {
        let current = self.state();
        if current != expected {
            return Err(Error::InvalidState(format!("cannot {action} while {current:?}")));
        }
        Ok(())
    }

    /// Move from `from` to `to` in one step, or fail if the state is not `from`.
    fn advance(&self, from: LifecycleState, to: LifecycleState, action: &str) -> Result<(), Error> {
        let mut current = from;
        let moved = self.state.send_if_modified(|state| {
            current = *state;
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
        if !moved {
            return Err(Error::InvalidState(format!("cannot {action} while {current:?}")));
        }
        tracing::info!(store = %self.config.app_cache, from = ?from, to = ?to, "lifecycle transition");
        Ok(())
    }

    fn transition(&self, next: LifecycleState) {
        let previous = self.state.send_replace(next);
        tracing::info!(store = %self.config.app_cache, from = ?previous, to = ?next, "lifecycle transition");
    }
}
