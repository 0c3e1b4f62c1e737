//! Intercepted requests and their cache identity.

use bytes::Bytes;
use http::{HeaderMap, Method, header};
use url::Url;

use crate::cache::hash::compute_cache_key;

/// Identity of a cacheable request: method plus absolute URL.
///
/// The fragment is stripped on construction; it never reaches the network
/// and never distinguishes two cache entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub method: Method,
    pub url: Url,
}

impl RequestKey {
    pub fn new(method: Method, mut url: Url) -> Self {
        url.set_fragment(None);
        Self { method, url }
    }

    /// Key for a GET of `url`.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Storage primary key for this identity.
    pub fn hash(&self) -> String {
        compute_cache_key(self.method.as_str(), self.url.as_str())
    }
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// How the host issued the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// Top-level document navigation.
    Navigate,
    Other,
}

impl RequestMode {
    /// Detect the mode from request headers.
    ///
    /// `Sec-Fetch-Mode` wins when present. Without it, a GET that accepts
    /// `text/html` is treated as a navigation.
    pub fn detect(method: &Method, headers: &HeaderMap) -> Self {
        if let Some(mode) = headers.get("sec-fetch-mode").and_then(|v| v.to_str().ok()) {
            return if mode.eq_ignore_ascii_case("navigate") { RequestMode::Navigate } else { RequestMode::Other };
        }

        let accepts_html = headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|accept| accept.contains("text/html"));

        if method == Method::GET && accepts_html { RequestMode::Navigate } else { RequestMode::Other }
    }
}

/// A request captured from the hosting application.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub mode: RequestMode,
}

impl InterceptedRequest {
    /// Build a request, detecting navigation mode from its headers.
    pub fn new(method: Method, url: Url, headers: HeaderMap, body: Bytes) -> Self {
        let mode = RequestMode::detect(&method, &headers);
        Self { method, url, headers, body, mode }
    }

    /// A plain subresource GET.
    pub fn get(url: Url) -> Self {
        Self { method: Method::GET, url, headers: HeaderMap::new(), body: Bytes::new(), mode: RequestMode::Other }
    }

    /// A top-level navigation GET.
    pub fn navigate(url: Url) -> Self {
        Self { mode: RequestMode::Navigate, ..Self::get(url) }
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(self.method.clone(), self.url.clone())
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// True when the request targets the same origin as `origin`.
    pub fn is_same_origin(&self, origin: &Url) -> bool {
        self.url.origin() == origin.origin()
    }
}
