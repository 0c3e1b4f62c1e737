//! Network-first strategy for API responses.

use super::Engine;
use super::eviction::trim_fifo;
use crate::request::InterceptedRequest;
use crate::response::Response;

impl Engine {
    /// Always try the network first; fall back to the api store.
    ///
    /// Every success is stored (overwriting the previous snapshot for the same
    /// identity) and the api store is trimmed before the response is returned.
    /// With no network and no snapshot the caller gets a JSON 503.
    pub async fn network_first(&self, request: &InterceptedRequest) -> Response {
        let key = request.key();
        let store = &self.config.api_cache;

        match self.network.fetch(request).await {
            Ok(response) => {
                if response.is_success() {
                    let snapshot = response.to_snapshot(key);
                    match self.storage.put(store, &snapshot).await {
                        Ok(()) => {
                            if let Err(e) = trim_fifo(self.storage.as_ref(), store, self.config.max_api_entries).await {
                                tracing::warn!(store = %store, error = %e, "api store eviction failed");
                            }
                        }
                        Err(e) => tracing::warn!(url = %request.url, error = %e, "skipping api cache write"),
                    }
                }
                response
            }
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "network unavailable, trying api store");
                match self.storage.get(store, &key).await {
                    Ok(Some(snapshot)) => {
                        tracing::debug!(url = %request.url, stored_at = %snapshot.stored_at, "serving stale api response");
                        Response::from(snapshot)
                    }
                    Ok(None) => Response::offline_json(),
                    Err(e) => {
                        tracing::warn!(url = %request.url, error = %e, "api store lookup failed");
                        Response::offline_json()
                    }
                }
            }
        }
    }
}
