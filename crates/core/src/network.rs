//! Live network access consumed by the engine.

use crate::request::InterceptedRequest;
use crate::response::Response;

/// Failure to obtain any response at all.
///
/// A response carrying an error status is not a `NetworkError`; it is an
/// `Ok(Response)` with a non-success status.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NetworkError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out")]
    Timeout,

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Network fetch seam.
///
/// Implemented over reqwest by `harbor-client`; tests substitute scripted fakes.
#[async_trait::async_trait]
pub trait Network: Send + Sync {
    /// Send `request` upstream and buffer the whole response.
    async fn fetch(&self, request: &InterceptedRequest) -> Result<Response, NetworkError>;
}
