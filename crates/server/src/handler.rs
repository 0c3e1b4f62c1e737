//! Proxy request handling.
//!
//! Two control routes live under `/__harbor/`; every other request is handed
//! to the service host and answered from network or cache.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode, Uri, header};
use axum::routing::{get, post};
use axum::{Json, Router};
use harbor_core::{InterceptedRequest, ServiceHost};
use serde::Serialize;
use url::Url;

use crate::error::ServerError;

/// Header naming where a proxied response came from.
pub const SOURCE_HEADER: &str = "x-harbor-source";

/// Largest request body buffered for interception.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Shared router state.
#[derive(Clone)]
pub struct ProxyState {
    pub host: Arc<ServiceHost>,
    /// Origin that origin-form request targets are resolved against.
    pub app_origin: Url,
}

/// Status endpoint response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    pub app_cache: Option<String>,
    pub api_cache: Option<String>,
    pub stores: Vec<String>,
}

/// Build the proxy router.
pub fn router(state: ProxyState) -> Router {
    Router::new()
        .route("/__harbor/message", post(message))
        .route("/__harbor/status", get(status))
        .fallback(intercept)
        .with_state(state)
}

async fn message(State(state): State<ProxyState>, body: String) -> StatusCode {
    if state.host.on_message(body.trim()).await { StatusCode::ACCEPTED } else { StatusCode::BAD_REQUEST }
}

async fn status(State(state): State<ProxyState>) -> Result<Json<StatusResponse>, ServerError> {
    let active = state.host.active_config().await;
    let stores = state.host.storage().store_names().await?;

    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        app_cache: active.as_ref().map(|c| c.app_cache.clone()),
        api_cache: active.map(|c| c.api_cache),
        stores,
    }))
}

/// Resolve a request target to an absolute URL.
///
/// Absolute-form targets (forward-proxy use) are taken as-is; origin-form
/// targets are resolved against the app origin.
fn resolve_target(uri: &Uri, app_origin: &Url) -> Result<Url, ServerError> {
    let resolved = if uri.scheme().is_some() {
        Url::parse(&uri.to_string())
    } else {
        let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
        app_origin.join(path)
    };
    resolved.map_err(|e| ServerError::InvalidRequest(format!("bad request target {uri}: {e}")))
}

async fn intercept(State(state): State<ProxyState>, request: Request) -> Result<axum::response::Response, ServerError> {
    let (parts, body) = request.into_parts();
    let url = resolve_target(&parts.uri, &state.app_origin)?;
    let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ServerError::InvalidRequest(format!("failed to read request body: {e}")))?;

    let intercepted = InterceptedRequest::new(parts.method, url, parts.headers, body);
    let response = state.host.on_fetch(intercepted).await?;

    let mut out = axum::response::Response::new(Body::from(response.body));
    *out.status_mut() = response.status;
    *out.headers_mut() = response.headers;
    out.headers_mut().remove(header::CONTENT_LENGTH);
    out.headers_mut()
        .insert(SOURCE_HEADER, HeaderValue::from_static(response.source.as_str()));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use axum::http::{HeaderMap, Method};
    use bytes::Bytes;
    use harbor_core::{CacheDb, EngineConfig, Network, NetworkError, Response, SKIP_WAITING};
    use tower::ServiceExt;

    /// Upstream that answers from a fixed table and can be taken offline.
    #[derive(Default)]
    struct ScriptedUpstream {
        pages: Mutex<HashMap<String, &'static str>>,
        offline: Mutex<bool>,
    }

    #[async_trait::async_trait]
    impl Network for ScriptedUpstream {
        async fn fetch(&self, request: &InterceptedRequest) -> Result<Response, NetworkError> {
            if *self.offline.lock().unwrap() {
                return Err(NetworkError::Connect("offline".into()));
            }
            let mut headers = HeaderMap::new();
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
            match self.pages.lock().unwrap().get(request.url.as_str()) {
                Some(body) => Ok(Response::network(StatusCode::OK, headers, *body)),
                None => Ok(Response::network(StatusCode::NOT_FOUND, headers, "not found")),
            }
        }
    }

    struct Fixture {
        app: Router,
        host: Arc<ServiceHost>,
        upstream: Arc<ScriptedUpstream>,
    }

    async fn fixture() -> Fixture {
        let upstream = Arc::new(ScriptedUpstream::default());
        upstream.pages.lock().unwrap().insert("https://app.test/index.html".into(), "shell");
        upstream.pages.lock().unwrap().insert("https://app.test/".into(), "shell");
        upstream.pages.lock().unwrap().insert("https://api.test/items".into(), "[1,2]");

        let db = CacheDb::open_in_memory().await.unwrap();
        let host = Arc::new(ServiceHost::new(Arc::new(db), upstream.clone()));
        let origin = Url::parse("https://app.test/").unwrap();
        let app = router(ProxyState { host: host.clone(), app_origin: origin });
        Fixture { app, host, upstream }
    }

    fn engine_config() -> EngineConfig {
        let origin = Url::parse("https://app.test/").unwrap();
        let mut config = EngineConfig::for_origin(origin.clone()).unwrap();
        config.precache = vec![origin.join("./").unwrap(), origin.join("./index.html").unwrap()];
        config.api_hosts = vec!["api.test".into()];
        config
    }

    async fn send(app: &Router, method: Method, uri: &str, body: &'static str) -> axum::response::Response {
        let request = Request::builder().method(method).uri(uri).body(Body::from(body)).unwrap();
        app.clone().oneshot(request).await.unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes: Bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn source(response: &axum::response::Response) -> &str {
        response.headers()[SOURCE_HEADER].to_str().unwrap()
    }

    #[test]
    fn test_resolve_origin_form() {
        let origin = Url::parse("https://app.test/").unwrap();
        let uri: Uri = "/assets/app.js?v=3".parse().unwrap();
        assert_eq!(resolve_target(&uri, &origin).unwrap().as_str(), "https://app.test/assets/app.js?v=3");
    }

    #[test]
    fn test_resolve_absolute_form() {
        let origin = Url::parse("https://app.test/").unwrap();
        let uri: Uri = "https://api.test/items".parse().unwrap();
        assert_eq!(resolve_target(&uri, &origin).unwrap().as_str(), "https://api.test/items");
    }

    #[tokio::test]
    async fn test_passes_through_before_registration() {
        let f = fixture().await;

        let response = send(&f.app, Method::GET, "/index.html", "").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(source(&response), "network");
    }

    #[tokio::test]
    async fn test_app_shell_served_from_cache_offline() {
        let f = fixture().await;
        f.host.register(engine_config()).await.unwrap();
        *f.upstream.offline.lock().unwrap() = true;

        let response = send(&f.app, Method::GET, "/index.html", "").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(source(&response), "cache");
        assert_eq!(body_text(response).await, "shell");
    }

    #[tokio::test]
    async fn test_api_offline_without_snapshot() {
        let f = fixture().await;
        f.host.register(engine_config()).await.unwrap();
        *f.upstream.offline.lock().unwrap() = true;

        let response = send(&f.app, Method::GET, "https://api.test/weather", "").await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(source(&response), "offline");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    }

    #[tokio::test]
    async fn test_api_served_stale_when_offline() {
        let f = fixture().await;
        f.host.register(engine_config()).await.unwrap();
        send(&f.app, Method::GET, "https://api.test/items", "").await;
        *f.upstream.offline.lock().unwrap() = true;

        let response = send(&f.app, Method::GET, "https://api.test/items", "").await;

        assert_eq!(source(&response), "cache");
        assert_eq!(body_text(response).await, "[1,2]");
    }

    #[tokio::test]
    async fn test_pass_through_failure_is_bad_gateway() {
        let f = fixture().await;
        f.host.register(engine_config()).await.unwrap();
        *f.upstream.offline.lock().unwrap() = true;

        let response = send(&f.app, Method::POST, "https://api.test/items", "{}").await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(body_text(response).await.contains("UPSTREAM_FAILED"));
    }

    #[tokio::test]
    async fn test_message_route() {
        let f = fixture().await;

        let accepted = send(&f.app, Method::POST, "/__harbor/message", SKIP_WAITING).await;
        assert_eq!(accepted.status(), StatusCode::ACCEPTED);

        let rejected = send(&f.app, Method::POST, "/__harbor/message", "RELOAD").await;
        assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_status_route() {
        let f = fixture().await;
        f.host.register(engine_config()).await.unwrap();

        let response = send(&f.app, Method::GET, "/__harbor/status", "").await;

        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["app_cache"], "app-v1");
        assert_eq!(body["api_cache"], "api-v1");
        assert_eq!(body["stores"], serde_json::json!(["app-v1"]));
    }
}
