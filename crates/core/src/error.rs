use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Unified error type for relay operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("no route matches source {0:?}")]
    Routing(String),

    #[error("request body exceeds limit of {limit} bytes")]
    Size { limit: usize },

    #[error("forward failed: {0}")]
    Forward(String),

    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::Routing(_) => StatusCode::NOT_FOUND,
            Self::Size { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Forward(_) => StatusCode::BAD_GATEWAY,
            Self::Persistence(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Auth(_) => "auth_error",
            Self::Routing(_) => "routing_error",
            Self::Size { .. } => "size_error",
            Self::Forward(_) => "forward_error",
            Self::Persistence(_) => "persistence_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": {
                "message": self.to_string(),
                "type": self.error_type(),
            }
        });
        (status, [("content-type", "application/json")], body.to_string()).into_response()
    }
}

impl From<std::io::Error> for RelayError {
    fn from(e: std::io::Error) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        Self::Validation(format!("invalid JSON: {e}"))
    }
}

impl From<serde_yaml_ng::Error> for RelayError {
    fn from(e: serde_yaml_ng::Error) -> Self {
        Self::Validation(format!("invalid YAML: {e}"))
    }
}
