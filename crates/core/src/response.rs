//! Responses handed back to the hosting application.

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode, header};

use crate::cache::Snapshot;
use crate::request::RequestKey;

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    /// Synthesized by the engine because nothing else was available.
    Offline,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Network => "network",
            ResponseSource::Cache => "cache",
            ResponseSource::Offline => "offline",
        }
    }
}

/// A response with a fully buffered body.
///
/// Cloning is cheap: the body is reference counted, so the copy handed to
/// the caller and the copy written to the store share one buffer.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl Response {
    /// A response received from the network.
    pub fn network(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self { status, headers, body: body.into(), source: ResponseSource::Network }
    }

    /// 2xx-class responses are the only ones ever persisted.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Capture this response for storage under `key`.
    pub fn to_snapshot(&self, key: RequestKey) -> Snapshot {
        Snapshot {
            key,
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
            stored_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Plain-text 503 for app requests with no cached fallback.
    pub fn offline_text() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            headers,
            body: Bytes::from_static(b"Offline"),
            source: ResponseSource::Offline,
        }
    }

    /// Structured 503 for API requests with no cached fallback.
    pub fn offline_json() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let body = serde_json::json!({ "error": "Offline" }).to_string();
        Self { status: StatusCode::SERVICE_UNAVAILABLE, headers, body: Bytes::from(body), source: ResponseSource::Offline }
    }
}

impl From<Snapshot> for Response {
    fn from(snapshot: Snapshot) -> Self {
        Self { status: snapshot.status, headers: snapshot.headers, body: snapshot.body, source: ResponseSource::Cache }
    }
}
