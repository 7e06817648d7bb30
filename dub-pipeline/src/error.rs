//! Error types for dub-pipeline
//!
//! Every failing endpoint answers with `{"error": {"code", "message", "kind"?}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use dub_common::api::{ErrorBody, ErrorEnvelope};
use dub_common::ErrorKind;
use thiserror::Error;

use crate::registry::RegistryError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Unknown session (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Rejected submission (400)
    #[error("Invalid request: {0}")]
    BadInput(String),

    /// Result requested before the job completed (409)
    #[error("Not ready: {0}")]
    NotReady(String),

    /// Operation not valid in the session's current state (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// dub-common error
    #[error("Common error: {0}")]
    Common(#[from] dub_common::Error),
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(id) => ApiError::NotFound(format!("Session not found: {}", id)),
            RegistryError::BadInput(msg) => ApiError::BadInput(msg),
            RegistryError::AlreadyClaimed(id) => {
                ApiError::Conflict(format!("Session {} is already running", id))
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, kind, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", None, msg),
            ApiError::BadInput(msg) => (
                StatusCode::BAD_REQUEST,
                "BAD_INPUT",
                Some(ErrorKind::BadInput),
                msg,
            ),
            ApiError::NotReady(msg) => (StatusCode::CONFLICT, "NOT_READY", None, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", None, msg),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                Some(ErrorKind::Internal),
                msg,
            ),
            ApiError::Io(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                Some(ErrorKind::Internal),
                err.to_string(),
            ),
            ApiError::Common(dub_common::Error::InvalidInput(msg)) => (
                StatusCode::BAD_REQUEST,
                "BAD_INPUT",
                Some(ErrorKind::BadInput),
                msg,
            ),
            ApiError::Common(dub_common::Error::NotFound(msg)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", None, msg)
            }
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                Some(ErrorKind::Internal),
                err.to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(code, message = %message, "Request failed");
        }

        let body = Json(ErrorEnvelope {
            error: ErrorBody {
                code: code.to_string(),
                message,
                kind,
            },
        });

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_codes() {
        let cases = [
            (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ApiError::BadInput("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::NotReady("x".into()), StatusCode::CONFLICT),
            (ApiError::Conflict("x".into()), StatusCode::CONFLICT),
            (ApiError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                ApiError::Common(dub_common::Error::InvalidInput("x".into())),
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_registry_errors_map() {
        let id = Uuid::new_v4();
        assert!(matches!(
            ApiError::from(RegistryError::NotFound(id)),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from(RegistryError::BadInput("bad".into())),
            ApiError::BadInput(msg) if msg == "bad"
        ));
        assert!(matches!(
            ApiError::from(RegistryError::AlreadyClaimed(id)),
            ApiError::Conflict(_)
        ));
    }
}
