//! Cache-first strategy for application assets.

use super::Engine;
use crate::request::{InterceptedRequest, RequestKey};
use crate::response::Response;

impl Engine {
    /// Serve from any store if possible, otherwise from the network.
    ///
    /// A hit never touches the network. A same-origin success fetched on a
    /// miss is written to the app store before it is returned; cross-origin
    /// responses are served but not kept. When the network is unreachable a
    /// navigation falls back to the cached root document, anything else gets
    /// a plain-text 503.
    pub async fn cache_first(&self, request: &InterceptedRequest) -> Response {
        let key = request.key();

        match self.storage.match_any(&key).await {
            Ok(Some(snapshot)) => {
                tracing::debug!(url = %request.url, "cache hit");
                return Response::from(snapshot);
            }
            Ok(None) => tracing::debug!(url = %request.url, "cache miss"),
            Err(e) => tracing::debug!(url = %request.url, error = %e, "cache probe failed, treating as miss"),
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                if response.is_success() && request.is_same_origin(&self.config.app_origin) {
                    let snapshot = response.to_snapshot(key);
                    if let Err(e) = self.storage.put(&self.config.app_cache, &snapshot).await {
                        tracing::warn!(url = %request.url, error = %e, "skipping app cache write");
                    }
                }
                response
            }
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "network unavailable");
                if request.is_navigation()
                    && let Some(document) = self.offline_document().await
                {
                    return document;
                }
                Response::offline_text()
            }
        }
    }

    async fn offline_document(&self) -> Option<Response> {
        let key = RequestKey::get(self.config.offline_document.clone());
        match self.storage.match_any(&key).await {
            Ok(found) => found.map(Response::from),
            Err(e) => {
                tracing::warn!(url = %key.url, error = %e, "offline document lookup failed");
                None
            }
        }
    }
}
