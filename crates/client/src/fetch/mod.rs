//! Upstream HTTP fetch for intercepted requests.
//!
//! ### Forwarding
//! - Method, URL, end-to-end headers, and body are sent as received.
//! - Hop-by-hop headers are stripped in both directions.
//! - Compression is negotiated by the client itself; bodies are returned decoded.
//!
//! ### Failure model
//! - Any HTTP status, success or not, is a response.
//! - Only transport failures (connect, timeout, truncated body) are errors.

use std::time::{Duration, Instant};

use harbor_core::{AppConfig, InterceptedRequest, Network, NetworkError, Response};
use reqwest::Client;
use reqwest::header::{self, HeaderMap, HeaderName};

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent sent when the intercepted request carries none.
    pub user_agent: String,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { user_agent: "harbor/0.1".to_string(), timeout: Duration::from_millis(20000), max_redirects: 5 }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self { user_agent: config.user_agent.clone(), timeout: config.timeout(), max_redirects: config.max_redirects }
    }
}

/// Headers that describe a single connection rather than the resource.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn forwardable(name: &HeaderName) -> bool {
    !HOP_BY_HOP.contains(&name.as_str())
}

/// Request headers set by the client itself.
fn client_managed(name: &HeaderName) -> bool {
    name == header::HOST || name == header::CONTENT_LENGTH || name == header::ACCEPT_ENCODING
}

fn map_send_error(err: reqwest::Error) -> NetworkError {
    if err.is_timeout() {
        NetworkError::Timeout
    } else if err.is_builder() {
        NetworkError::InvalidRequest(err.to_string())
    } else {
        NetworkError::Connect(err.to_string())
    }
}

/// HTTP client forwarding intercepted requests upstream.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl Network for FetchClient {
    async fn fetch(&self, request: &InterceptedRequest) -> Result<Response, NetworkError> {
        let start = Instant::now();

        let headers: HeaderMap = request
            .headers
            .iter()
            .filter(|(name, _)| forwardable(name) && !client_managed(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        let mut upstream = self.http.request(request.method.clone(), request.url.clone()).headers(headers);
        if !request.body.is_empty() {
            upstream = upstream.body(request.body.clone());
        }

        let response = upstream.send().await.map_err(map_send_error)?;

        let status = response.status();
        let headers: HeaderMap = response
            .headers()
            .iter()
            .filter(|(name, _)| forwardable(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() { NetworkError::Timeout } else { NetworkError::Body(e.to_string()) }
        })?;

        tracing::debug!(
            "fetched {} {} -> {} in {}ms ({} bytes)",
            request.method,
            request.url,
            status.as_u16(),
            start.elapsed().as_millis(),
            body.len()
        );

        Ok(Response::network(status, headers, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::routing::{get, post};
    use bytes::Bytes;
    use harbor_core::ResponseSource;
    use reqwest::{Method, StatusCode};
    use url::Url;

    async fn upstream() -> Url {
        let app = Router::new()
            .route("/ok", get(|| async { ([(header::CONTENT_TYPE, "text/plain")], "hello") }))
            .route("/missing", get(|| async { (StatusCode::NOT_FOUND, "nope") }))
            .route(
                "/echo",
                post(|headers: HeaderMap, body: Bytes| async move {
                    let tag = headers.get("x-tag").and_then(|v| v.to_str().ok()).unwrap_or("").to_string();
                    let proxied = headers.contains_key("proxy-connection");
                    format!("{tag}|{proxied}|{}", String::from_utf8_lossy(&body))
                }),
            )
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    "late"
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Url::parse(&format!("http://{addr}/")).unwrap()
    }

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.user_agent, "harbor/0.1");
        assert_eq!(config.timeout, Duration::from_millis(20000));
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_fetch_config_from_app_config() {
        let app = AppConfig { user_agent: "offline-notes/2".into(), timeout_ms: 1500, ..Default::default() };
        let config = FetchConfig::from(&app);
        assert_eq!(config.user_agent, "offline-notes/2");
        assert_eq!(config.timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_hop_by_hop_filter() {
        assert!(!forwardable(&header::CONNECTION));
        assert!(!forwardable(&header::TRANSFER_ENCODING));
        assert!(!forwardable(&HeaderName::from_static("proxy-connection")));
        assert!(forwardable(&header::CONTENT_TYPE));
        assert!(forwardable(&header::SET_COOKIE));
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let base = upstream().await;
        let client = FetchClient::new(FetchConfig::default()).unwrap();

        let response = client.fetch(&InterceptedRequest::get(base.join("ok").unwrap())).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(&response.body[..], b"hello");
        assert_eq!(response.headers[header::CONTENT_TYPE], "text/plain");
    }

    #[tokio::test]
    async fn test_error_status_is_a_response() {
        let base = upstream().await;
        let client = FetchClient::new(FetchConfig::default()).unwrap();

        let response = client.fetch(&InterceptedRequest::get(base.join("missing").unwrap())).await.unwrap();

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_forwards_method_headers_and_body() {
        let base = upstream().await;
        let client = FetchClient::new(FetchConfig::default()).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("x-tag", "abc".parse().unwrap());
        headers.insert("proxy-connection", "keep-alive".parse().unwrap());
        let request =
            InterceptedRequest::new(Method::POST, base.join("echo").unwrap(), headers, Bytes::from_static(b"payload"));

        let response = client.fetch(&request).await.unwrap();

        assert_eq!(&response.body[..], b"abc|false|payload");
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = FetchClient::new(FetchConfig::default()).unwrap();
        let url = Url::parse(&format!("http://{addr}/")).unwrap();
        let result = client.fetch(&InterceptedRequest::get(url)).await;

        assert!(matches!(result, Err(NetworkError::Connect(_))));
    }

    #[tokio::test]
    async fn test_timeout() {
        let base = upstream().await;
        let config = FetchConfig { timeout: Duration::from_millis(200), ..Default::default() };
        let client = FetchClient::new(config).unwrap();

        let result = client.fetch(&InterceptedRequest::get(base.join("slow").unwrap())).await;

        assert!(matches!(result, Err(NetworkError::Timeout)));
    }
}
