//! Client error types

use dub_common::ErrorKind;
use thiserror::Error;
use uuid::Uuid;

/// Failure of a single client operation against the dubbing service
#[derive(Debug, Error)]
pub enum ClientError {
    /// Request never produced an HTTP response
    #[error("transport failure ({kind}): {detail}")]
    Transport { kind: ErrorKind, detail: String },

    /// Service answered with an error envelope
    #[error("service rejected request (HTTP {status}, {code}): {message}")]
    Rejected {
        status: u16,
        code: String,
        message: String,
        kind: Option<ErrorKind>,
    },

    #[error("session not found: {0}")]
    NotFound(Uuid),

    #[error("result for session {0} is not ready")]
    NotReady(Uuid),

    /// Request rejected locally before it was sent
    #[error("invalid request: {0}")]
    InvalidInput(String),

    /// Response could not be understood
    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Taxonomy kind of this failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Transport { kind, .. } => *kind,
            ClientError::Rejected { status, kind, .. } => {
                kind.unwrap_or_else(|| kind_for_status(*status))
            }
            ClientError::NotFound(_) | ClientError::InvalidInput(_) => ErrorKind::BadInput,
            ClientError::NotReady(_) => ErrorKind::ResourceUnavailable,
            ClientError::InvalidResponse(_) | ClientError::Io(_) => ErrorKind::Internal,
        }
    }

    /// Whether repeating the same operation could succeed
    ///
    /// Local file errors are never retried: the same write would fail again.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Io(_) => false,
            other => other.kind().is_retryable(),
        }
    }

    /// Transport-level failure (no HTTP response, or a 5xx/429 from the service)
    pub fn is_transport(&self) -> bool {
        match self {
            ClientError::Transport { .. } => true,
            ClientError::Rejected { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return ClientError::InvalidResponse(e.to_string());
        }
        let kind = if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
            ErrorKind::Network
        } else {
            ErrorKind::Internal
        };
        ClientError::Transport {
            kind,
            detail: e.to_string(),
        }
    }
}

impl From<dub_common::Error> for ClientError {
    fn from(e: dub_common::Error) -> Self {
        match e {
            dub_common::Error::InvalidInput(msg) => ClientError::InvalidInput(msg),
            other => ClientError::InvalidResponse(other.to_string()),
        }
    }
}

/// Kind implied by an HTTP status when the envelope carries none
pub(crate) fn kind_for_status(status: u16) -> ErrorKind {
    match status {
        400 | 404 | 409 | 422 => ErrorKind::BadInput,
        401 | 403 => ErrorKind::Auth,
        402 => ErrorKind::ResourceUnavailable,
        429 => ErrorKind::RateLimit,
        500..=599 => ErrorKind::Network,
        _ => ErrorKind::Internal,
    }
}
