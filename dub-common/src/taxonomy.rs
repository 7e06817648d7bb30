//! Error taxonomy
//!
//! Single authority that turns a raw collaborator failure into one of a closed set
//! of error kinds, each with a fixed retry disposition and a deterministic,
//! user-facing message.
//!
//! # Classification order
//! 1. Explicit authentication failure → `auth` (not retryable)
//! 2. Explicit rate-limit signal → `rateLimit` (retryable)
//! 3. Input rejected before any external call → `badInput` (not retryable)
//! 4. Transport failure (timeout, reset, 5xx) → `network` (retryable)
//! 5. Resource temporarily unavailable (quota, capacity) → `resourceUnavailable` (retryable)
//! 6. Anything else → `internal` (retryable, capped at [`INTERNAL_RETRY_CAP`])
//!
//! `cancelled` is reserved for explicit job cancellation and is never retried.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::stage::Stage;

/// Upper bound on retries for unclassified failures, regardless of configured cap
pub const INTERNAL_RETRY_CAP: u32 = 1;

/// Closed set of failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Network,
    RateLimit,
    Auth,
    BadInput,
    ResourceUnavailable,
    Internal,
    Cancelled,
}

impl ErrorKind {
    /// Whether a failure of this kind may be re-attempted automatically
    pub fn is_retryable(self) -> bool {
        match self {
            ErrorKind::Network
            | ErrorKind::RateLimit
            | ErrorKind::ResourceUnavailable
            | ErrorKind::Internal => true,
            ErrorKind::Auth | ErrorKind::BadInput | ErrorKind::Cancelled => false,
        }
    }

    /// Effective retry cap for this kind given the configured cap
    pub fn retry_cap(self, configured: u32) -> u32 {
        match self {
            ErrorKind::Internal => configured.min(INTERNAL_RETRY_CAP),
            kind if kind.is_retryable() => configured,
            _ => 0,
        }
    }

    /// Wire name (camelCase)
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::RateLimit => "rateLimit",
            ErrorKind::Auth => "auth",
            ErrorKind::BadInput => "badInput",
            ErrorKind::ResourceUnavailable => "resourceUnavailable",
            ErrorKind::Internal => "internal",
            ErrorKind::Cancelled => "cancelled",
        }
    }

    /// Human-readable message for this kind, derived only from kind and stage
    pub fn describe(self, stage: Stage) -> String {
        match self {
            ErrorKind::Network => format!(
                "A network problem interrupted the {} step. Please try again shortly.",
                stage
            ),
            ErrorKind::RateLimit => format!(
                "The {} service is receiving too many requests. Please wait a moment and retry.",
                stage
            ),
            ErrorKind::Auth => format!(
                "The {} service rejected our credentials. Check the configured API key.",
                stage
            ),
            ErrorKind::BadInput => format!(
                "The input for the {} step is missing or invalid.",
                stage
            ),
            ErrorKind::ResourceUnavailable => format!(
                "The {} service is temporarily out of capacity. Please try again later.",
                stage
            ),
            ErrorKind::Internal => format!(
                "An unexpected error occurred during the {} step.",
                stage
            ),
            ErrorKind::Cancelled => format!("The job was cancelled during the {} step.", stage),
        }
    }

    /// Classify a raw failure
    ///
    /// Applies the rules in the order listed in the module documentation; the
    /// first matching rule wins.
    pub fn from_failure(failure: &Failure) -> ErrorKind {
        match failure {
            Failure::Cancelled => ErrorKind::Cancelled,
            Failure::Auth(_) => ErrorKind::Auth,
            Failure::Http { status, .. } if matches!(status, 401 | 403) => ErrorKind::Auth,
            Failure::RateLimited(_) => ErrorKind::RateLimit,
            Failure::Http { status: 429, .. } => ErrorKind::RateLimit,
            Failure::InvalidInput(_) => ErrorKind::BadInput,
            Failure::Timeout(_) | Failure::Connection(_) => ErrorKind::Network,
            Failure::Http { status, .. } if (500..600).contains(status) => ErrorKind::Network,
            Failure::Unavailable(_) => ErrorKind::ResourceUnavailable,
            Failure::Http { status: 402, .. } => ErrorKind::ResourceUnavailable,
            Failure::Http { body, .. } => classify_text(body),
            Failure::Other(message) => classify_text(message),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fallback classification of free-form collaborator text
fn classify_text(text: &str) -> ErrorKind {
    let lower = text.to_lowercase();
    if lower.contains("api key")
        || lower.contains("authentication")
        || lower.contains("unauthorized")
    {
        ErrorKind::Auth
    } else if lower.contains("rate limit") || lower.contains("too many requests") {
        ErrorKind::RateLimit
    } else if lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("connection reset")
        || lower.contains("connection refused")
    {
        ErrorKind::Network
    } else if lower.contains("quota") || lower.contains("capacity") || lower.contains("overloaded")
    {
        ErrorKind::ResourceUnavailable
    } else {
        ErrorKind::Internal
    }
}

/// Raw failure reported by a collaborator, before classification
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Failure {
    /// Collaborator explicitly rejected credentials
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Collaborator explicitly signalled throttling
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Input rejected before any external call was made
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Request did not complete in time
    #[error("timed out: {0}")]
    Timeout(String),

    /// Connection could not be established or was reset
    #[error("connection failure: {0}")]
    Connection(String),

    /// Non-2xx HTTP response
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Quota or capacity exhausted
    #[error("resource unavailable: {0}")]
    Unavailable(String),

    /// Job cancellation observed by the stage runner
    #[error("cancelled")]
    Cancelled,

    /// Anything else
    #[error("{0}")]
    Other(String),
}

/// Classified failure attached to a session at the point of failure
///
/// Never mutated after creation. `message` is derived from `kind` and `stage`;
/// the raw collaborator text is kept separately in `detail` for diagnostics and
/// is not part of the wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("{stage} failed ({kind}): {message}")]
pub struct ErrorRecord {
    pub stage: Stage,
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
    #[serde(skip)]
    pub detail: Option<String>,
}

impl ErrorRecord {
    /// Build a record for `kind` at `stage`
    pub fn new(stage: Stage, kind: ErrorKind) -> Self {
        Self {
            stage,
            kind,
            message: kind.describe(stage),
            retryable: kind.is_retryable(),
            detail: None,
        }
    }

    /// Classify a raw failure at `stage`
    pub fn classify(stage: Stage, failure: &Failure) -> Self {
        let mut record = Self::new(stage, ErrorKind::from_failure(failure));
        record.detail = Some(failure.to_string());
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16, body: &str) -> Failure {
        Failure::Http {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_explicit_signals_map_to_kinds() {
        assert_eq!(ErrorKind::from_failure(&Failure::Auth("bad key".into())), ErrorKind::Auth);
        assert_eq!(ErrorKind::from_failure(&http(401, "")), ErrorKind::Auth);
        assert_eq!(ErrorKind::from_failure(&http(403, "")), ErrorKind::Auth);
        assert_eq!(ErrorKind::from_failure(&http(429, "")), ErrorKind::RateLimit);
        assert_eq!(
            ErrorKind::from_failure(&Failure::InvalidInput("no url".into())),
            ErrorKind::BadInput
        );
        assert_eq!(ErrorKind::from_failure(&Failure::Timeout("30s".into())), ErrorKind::Network);
        assert_eq!(ErrorKind::from_failure(&http(502, "bad gateway")), ErrorKind::Network);
        assert_eq!(ErrorKind::from_failure(&http(402, "")), ErrorKind::ResourceUnavailable);
        assert_eq!(ErrorKind::from_failure(&Failure::Cancelled), ErrorKind::Cancelled);
    }

    #[test]
    fn test_auth_wins_over_text_hints() {
        // 401 carrying a rate-limit message is still an authentication failure
        assert_eq!(ErrorKind::from_failure(&http(401, "rate limit exceeded")), ErrorKind::Auth);
    }

    #[test]
    fn test_free_text_fallback() {
        assert_eq!(
            ErrorKind::from_failure(&Failure::Other("Invalid API key supplied".into())),
            ErrorKind::Auth
        );
        assert_eq!(
            ErrorKind::from_failure(&Failure::Other("Rate limit exceeded".into())),
            ErrorKind::RateLimit
        );
        assert_eq!(
            ErrorKind::from_failure(&Failure::Other("monthly quota exhausted".into())),
            ErrorKind::ResourceUnavailable
        );
        assert_eq!(
            ErrorKind::from_failure(&Failure::Other("segfault".into())),
            ErrorKind::Internal
        );
        assert_eq!(ErrorKind::from_failure(&http(404, "not here")), ErrorKind::Internal);
    }

    #[test]
    fn test_retry_caps() {
        assert_eq!(ErrorKind::Network.retry_cap(3), 3);
        assert_eq!(ErrorKind::RateLimit.retry_cap(5), 5);
        assert_eq!(ErrorKind::Internal.retry_cap(3), INTERNAL_RETRY_CAP);
        assert_eq!(ErrorKind::Internal.retry_cap(0), 0);
        assert_eq!(ErrorKind::BadInput.retry_cap(3), 0);
        assert_eq!(ErrorKind::Auth.retry_cap(3), 0);
        assert_eq!(ErrorKind::Cancelled.retry_cap(3), 0);
    }

    #[test]
    fn test_record_message_is_deterministic() {
        let a = ErrorRecord::classify(Stage::Translate, &http(503, "upstream exploded at 0x1f"));
        let b = ErrorRecord::classify(Stage::Translate, &Failure::Timeout("after 30s".into()));
        assert_eq!(a.kind, ErrorKind::Network);
        assert_eq!(a.message, b.message);
        assert!(!a.message.contains("0x1f"));
        assert!(a.retryable);
        assert_eq!(a.detail.as_deref(), Some("HTTP 503: upstream exploded at 0x1f"));
    }

    #[test]
    fn test_record_wire_shape() {
        let record = ErrorRecord::classify(Stage::Download, &Failure::InvalidInput("x".into()));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["stage"], "download");
        assert_eq!(json["kind"], "badInput");
        assert_eq!(json["retryable"], false);
        assert!(json.get("detail").is_none());
    }
}
