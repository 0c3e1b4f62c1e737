//! Structured errors for the harbor proxy.
//!
//! These map onto HTTP status codes; the body is a small JSON object carrying
//! the prefixed message.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use harbor_core::NetworkError;

/// Structured errors for the harbor proxy.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The request could not be turned into an intercepted request.
    #[error("INVALID_INPUT: {0}")]
    InvalidRequest(String),

    /// A pass-through request did not reach the upstream.
    #[error("UPSTREAM_FAILED: {0}")]
    Upstream(#[from] NetworkError),

    /// The engine or its storage failed.
    #[error("{0}")]
    Engine(#[from] harbor_core::Error),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ServerError::Engine(e) if e.is_storage() => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::warn!(status = status.as_u16(), error = %self, "request failed");
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ServerError::InvalidRequest("bad uri".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ServerError::from(NetworkError::Connect("refused".into())).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ServerError::from(NetworkError::Timeout).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            ServerError::from(harbor_core::Error::Storage("disk full".into())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServerError::from(harbor_core::Error::InvalidState("not waiting".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_display_is_prefixed() {
        let err = ServerError::from(NetworkError::Connect("refused".into()));
        assert!(err.to_string().starts_with("UPSTREAM_FAILED"));
    }
}
