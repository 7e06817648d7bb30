//! Stage artifacts
//!
//! Each stage consumes the previous artifact and produces the next one. Later
//! artifacts carry forward whatever downstream stages still need (the overlay
//! step needs the original video long after download finished).

use serde::Serialize;
use std::path::PathBuf;

use super::JobParams;

/// Source media fetched by the download stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaFiles {
    pub audio_path: PathBuf,
    pub video_path: PathBuf,
    /// Audio duration, `None` when it could not be probed
    pub duration_seconds: Option<f64>,
}

/// Speech-to-text output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transcript {
    pub text: String,
    pub detected_language: String,
}

/// Translation output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Translation {
    pub text: String,
    pub source_language: String,
    pub target_language: String,
    pub original_text: String,
}

/// Synthesized speech
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynthesizedAudio {
    pub audio_path: PathBuf,
    pub voice_id: String,
    pub text_length: usize,
}

/// Final dubbed video
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalVideo {
    pub video_path: PathBuf,
    pub file_size_bytes: u64,
    pub duration_seconds: Option<f64>,
}

/// Intermediate data handed from one stage to the next
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artifact {
    /// Submission parameters, input to the first stage
    Submission(JobParams),
    /// Output of download
    Media(MediaFiles),
    /// Output of transcribe
    Transcript {
        media: MediaFiles,
        transcript: Transcript,
    },
    /// Output of translate
    Translation {
        media: MediaFiles,
        translation: Translation,
    },
    /// Output of synthesize
    DubbedAudio {
        media: MediaFiles,
        audio: SynthesizedAudio,
    },
    /// Output of overlay
    FinalVideo(FinalVideo),
}

impl Artifact {
    /// Short label for logs and error details
    pub fn label(&self) -> &'static str {
        match self {
            Artifact::Submission(_) => "submission",
            Artifact::Media(_) => "media",
            Artifact::Transcript { .. } => "transcript",
            Artifact::Translation { .. } => "translation",
            Artifact::DubbedAudio { .. } => "dubbed_audio",
            Artifact::FinalVideo(_) => "final_video",
        }
    }

    /// Source media, if still carried by this artifact
    pub fn media(&self) -> Option<&MediaFiles> {
        match self {
            Artifact::Media(media)
            | Artifact::Transcript { media, .. }
            | Artifact::Translation { media, .. }
            | Artifact::DubbedAudio { media, .. } => Some(media),
            Artifact::Submission(_) | Artifact::FinalVideo(_) => None,
        }
    }

    /// Best known media duration
    pub fn duration_seconds(&self) -> Option<f64> {
        match self {
            Artifact::FinalVideo(video) => video.duration_seconds,
            other => other.media().and_then(|m| m.duration_seconds),
        }
    }

    /// Language detected during transcription
    pub fn detected_language(&self) -> Option<&str> {
        match self {
            Artifact::Transcript { transcript, .. } => Some(&transcript.detected_language),
            Artifact::Translation { translation, .. } => Some(&translation.source_language),
            _ => None,
        }
    }
}
