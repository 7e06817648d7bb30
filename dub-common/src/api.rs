//! Wire types shared by the pipeline service and its clients
//!
//! JSON field names are camelCase. These shapes are the external contract:
//! the service serializes them, the client deserializes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::stage::Stage;
use crate::taxonomy::ErrorRecord;
use crate::{Error, Result};

/// Longest accepted target language name
const MAX_LANGUAGE_LEN: usize = 64;

// ========================================
// Submission
// ========================================

/// Download quality cap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoQuality {
    /// 360p
    Low,
    /// 480p
    Medium,
    /// 720p
    #[default]
    High,
    /// No height cap
    Best,
}

impl VideoQuality {
    /// Maximum video height, `None` for uncapped
    pub fn max_height(self) -> Option<u32> {
        match self {
            VideoQuality::Low => Some(360),
            VideoQuality::Medium => Some(480),
            VideoQuality::High => Some(720),
            VideoQuality::Best => None,
        }
    }
}

/// Final video container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Mp4,
    Webm,
    Mkv,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Webm => "webm",
            OutputFormat::Mkv => "mkv",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "video/mp4",
            OutputFormat::Webm => "video/webm",
            OutputFormat::Mkv => "video/x-matroska",
        }
    }

    /// Audio codec compatible with this container
    pub fn audio_codec(self) -> &'static str {
        match self {
            OutputFormat::Mp4 | OutputFormat::Mkv => "aac",
            OutputFormat::Webm => "libopus",
        }
    }
}

/// Options bundle accompanying a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobOptions {
    pub quality: VideoQuality,
    pub format: OutputFormat,
    /// Keep the original audio as a second track
    pub preserve_original: bool,
    /// Caller preference for client-side operation retry
    pub auto_retry: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            quality: VideoQuality::default(),
            format: OutputFormat::default(),
            preserve_original: false,
            auto_retry: true,
        }
    }
}

/// POST /dub/submit request
///
/// Fields default to empty so that a missing field is reported by
/// [`SubmitRequest::validate`] as bad input rather than as a parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub target_language: String,
    #[serde(default)]
    pub options: JobOptions,
}

impl SubmitRequest {
    pub fn new(source_url: impl Into<String>, target_language: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            target_language: target_language.into(),
            options: JobOptions::default(),
        }
    }

    /// Check required parameters before any external call
    ///
    /// Returns the normalized request (trimmed URL, lowercase language).
    pub fn validate(&self) -> Result<SubmitRequest> {
        let source_url = self.source_url.trim();
        if source_url.is_empty() {
            return Err(Error::InvalidInput("source URL is required".to_string()));
        }
        let parsed = Url::parse(source_url)
            .map_err(|e| Error::InvalidInput(format!("source URL is malformed: {}", e)))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(Error::InvalidInput(format!(
                "source URL must be an http(s) address: {}",
                source_url
            )));
        }

        let target_language = self.target_language.trim().to_lowercase();
        if target_language.is_empty() {
            return Err(Error::InvalidInput("target language is required".to_string()));
        }
        if target_language.len() > MAX_LANGUAGE_LEN
            || !target_language
                .chars()
                .all(|c| c.is_alphabetic() || c == ' ' || c == '-')
        {
            return Err(Error::InvalidInput(format!(
                "target language is malformed: {}",
                self.target_language
            )));
        }

        Ok(SubmitRequest {
            source_url: source_url.to_string(),
            target_language,
            options: self.options.clone(),
        })
    }
}

/// POST /dub/submit response (202 Accepted)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub session_id: Uuid,
    pub status: JobStatus,
    pub current_stage: Stage,
    pub created_at: DateTime<Utc>,
}

// ========================================
// Status
// ========================================

/// Coarse job status derived from the stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn from_stage(stage: Stage) -> Self {
        match stage {
            Stage::Failed => JobStatus::Error,
            Stage::Completed => JobStatus::Completed,
            _ => JobStatus::Processing,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Processing)
    }
}

/// GET /dub/status/{id} response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub session_id: Uuid,
    pub status: JobStatus,
    pub current_stage: Stage,
    pub progress: u8,
    pub source_language: Option<String>,
    pub target_language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
}

// ========================================
// Errors
// ========================================

/// Error body returned by every failing endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<crate::taxonomy::ErrorKind>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_and_normalizes() {
        let request = SubmitRequest::new(" https://www.youtube.com/watch?v=abc ", " Spanish ");
        let valid = request.validate().unwrap();
        assert_eq!(valid.source_url, "https://www.youtube.com/watch?v=abc");
        assert_eq!(valid.target_language, "spanish");
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        assert!(matches!(
            SubmitRequest::new("", "spanish").validate(),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            SubmitRequest::new("https://example.com/v", "  ").validate(),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_validate_rejects_malformed_fields() {
        for url in ["not a url", "ftp://example.com/video", "file:///etc/passwd"] {
            assert!(
                SubmitRequest::new(url, "spanish").validate().is_err(),
                "{} should be rejected",
                url
            );
        }
        assert!(SubmitRequest::new("https://example.com/v", "es;drop")
            .validate()
            .is_err());
    }

    #[test]
    fn test_missing_json_fields_deserialize_as_empty() {
        let request: SubmitRequest = serde_json::from_str(r#"{"sourceUrl": "https://x.io/v"}"#).unwrap();
        assert!(request.target_language.is_empty());
        assert!(request.options.auto_retry);
        assert_eq!(request.options.quality, VideoQuality::High);
    }

    #[test]
    fn test_status_from_stage() {
        assert_eq!(JobStatus::from_stage(Stage::Queued), JobStatus::Processing);
        assert_eq!(JobStatus::from_stage(Stage::Overlay), JobStatus::Processing);
        assert_eq!(JobStatus::from_stage(Stage::Completed), JobStatus::Completed);
        assert_eq!(JobStatus::from_stage(Stage::Failed), JobStatus::Error);
    }

    #[test]
    fn test_status_view_omits_absent_optionals() {
        let view = StatusView {
            session_id: Uuid::nil(),
            status: JobStatus::Processing,
            current_stage: Stage::Download,
            progress: 0,
            source_language: None,
            target_language: "spanish".to_string(),
            duration_seconds: None,
            error: None,
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["currentStage"], "download");
        assert_eq!(json["status"], "processing");
        assert!(json["sourceLanguage"].is_null());
        assert!(json.get("durationSeconds").is_none());
        assert!(json.get("error").is_none());
    }
}
