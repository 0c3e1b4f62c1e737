//! Request classification.
//!
//! Every intercepted request maps to exactly one [`RouteClass`]. Only the
//! method and the URL host are inspected: no wildcards, no path rules.

use std::collections::HashSet;

use http::Method;

use crate::request::InterceptedRequest;

/// Routing decision for an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Non-GET; forwarded untouched, never cached.
    Ignored,
    /// Application asset, served cache-first.
    App,
    /// Third-party API call, served network-first.
    Api,
}

/// Classifies requests against an API hostname allow-list.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    api_hosts: HashSet<String>,
}

impl Classifier {
    /// Hosts are matched exactly and case-sensitively, as supplied.
    pub fn new<I, S>(api_hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { api_hosts: api_hosts.into_iter().map(Into::into).collect() }
    }

    pub fn classify(&self, request: &InterceptedRequest) -> RouteClass {
        if request.method != Method::GET {
            return RouteClass::Ignored;
        }

        match request.url.host_str() {
            Some(host) if self.api_hosts.contains(host) => RouteClass::Api,
            _ => RouteClass::App,
        }
    }
}
