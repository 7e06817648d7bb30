//! Dubbing session state machine
//!
//! A session progresses through the fixed stage order:
//! QUEUED → DOWNLOAD → TRANSCRIBE → TRANSLATE → SYNTHESIZE → OVERLAY → COMPLETED
//!
//! Any non-terminal stage may drop to FAILED. Both COMPLETED and FAILED are
//! terminal; every mutating method refuses to touch a terminal session.

use chrono::{DateTime, Utc};
use dub_common::api::{JobOptions, SubmitRequest};
use dub_common::{ErrorKind, ErrorRecord, Stage};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::{Artifact, FinalVideo};

/// Validated submission parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobParams {
    pub source_url: String,
    pub target_language: String,
    pub options: JobOptions,
}

impl JobParams {
    /// Validate a submission and convert it into job parameters
    pub fn from_request(request: &SubmitRequest) -> dub_common::Result<Self> {
        let valid = request.validate()?;
        Ok(Self {
            source_url: valid.source_url,
            target_language: valid.target_language,
            options: valid.options,
        })
    }
}

/// Rejected state transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("session {session_id} is already {stage}")]
    Terminal { session_id: Uuid, stage: Stage },

    #[error("session {session_id} cannot move from {from} to {to}")]
    OutOfOrder { session_id: Uuid, from: Stage, to: Stage },
}

/// Record of an accepted transition
#[derive(Debug, Clone, Serialize)]
pub struct StateTransition {
    pub session_id: Uuid,
    pub old_stage: Stage,
    pub new_stage: Stage,
    pub progress: u8,
    pub transitioned_at: DateTime<Utc>,
}

/// One submitted dubbing job
#[derive(Debug, Clone)]
pub struct Session {
    /// Assigned at creation, immutable
    pub id: Uuid,

    /// Current position in the stage order
    pub stage: Stage,

    /// 0-100, never decreases
    pub progress: u8,

    /// Unset until the transcription stage detects it
    pub source_language: Option<String>,

    pub target_language: String,

    pub params: JobParams,

    /// Most recent stage output
    pub artifact: Option<Arc<Artifact>>,

    /// Present only when `stage == Failed`
    pub error: Option<ErrorRecord>,

    pub created_at: DateTime<Utc>,

    /// Set on reaching either terminal stage
    pub completed_at: Option<DateTime<Utc>>,

    /// Retries spent in the current stage, reset on entering the next one
    pub retry_count: u32,
}

impl Session {
    /// Create a queued session
    pub fn new(params: JobParams) -> Self {
        Self {
            id: Uuid::new_v4(),
            stage: Stage::Queued,
            progress: 0,
            source_language: None,
            target_language: params.target_language.clone(),
            params,
            artifact: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
            retry_count: 0,
        }
    }

    /// Enter the next processing stage
    ///
    /// Only the immediate successor of the current stage is accepted. Progress is
    /// raised to the stage's lower band bound and the retry counter is reset.
    pub fn enter_stage(&mut self, stage: Stage) -> Result<StateTransition, TransitionError> {
        self.ensure_live()?;
        if !stage.is_processing() || self.stage.next() != Some(stage) {
            return Err(TransitionError::OutOfOrder {
                session_id: self.id,
                from: self.stage,
                to: stage,
            });
        }

        let (lower, _) = stage.progress_band();
        self.progress = self.progress.max(lower);
        self.retry_count = 0;
        Ok(self.transition_to(stage))
    }

    /// Record one more retry of the current stage, returning the new count
    pub fn record_retry(&mut self) -> u32 {
        self.retry_count += 1;
        self.retry_count
    }

    /// Replace the current artifact, returning the one it displaces
    ///
    /// Picks up the detected source language when the artifact carries one.
    pub fn store_artifact(&mut self, artifact: Arc<Artifact>) -> Option<Arc<Artifact>> {
        if let Some(language) = artifact.detected_language() {
            self.source_language = Some(language.to_string());
        }
        self.artifact.replace(artifact)
    }

    /// Finish successfully after the overlay stage
    pub fn complete(&mut self) -> Result<StateTransition, TransitionError> {
        self.ensure_live()?;
        if self.stage != Stage::Overlay {
            return Err(TransitionError::OutOfOrder {
                session_id: self.id,
                from: self.stage,
                to: Stage::Completed,
            });
        }
        self.progress = 100;
        self.completed_at = Some(Utc::now());
        Ok(self.transition_to(Stage::Completed))
    }

    /// Drop to `failed` with the given error
    ///
    /// The last artifact stays attached for diagnostics, except on
    /// cancellation, which releases it.
    pub fn fail(&mut self, error: ErrorRecord) -> Result<StateTransition, TransitionError> {
        self.ensure_live()?;
        if error.kind == ErrorKind::Cancelled {
            self.artifact = None;
        }
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
        Ok(self.transition_to(Stage::Failed))
    }

    /// Check if session is terminal (finished)
    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Media duration known from the latest artifact
    pub fn duration_seconds(&self) -> Option<f64> {
        self.artifact.as_ref().and_then(|a| a.duration_seconds())
    }

    /// Final video, once the overlay stage has produced it
    pub fn final_video(&self) -> Option<&FinalVideo> {
        match self.artifact.as_deref() {
            Some(Artifact::FinalVideo(video)) => Some(video),
            _ => None,
        }
    }

    fn ensure_live(&self) -> Result<(), TransitionError> {
        if self.is_terminal() {
            Err(TransitionError::Terminal {
                session_id: self.id,
                stage: self.stage,
            })
        } else {
            Ok(())
        }
    }

    fn transition_to(&mut self, new_stage: Stage) -> StateTransition {
        let transition = StateTransition {
            session_id: self.id,
            old_stage: self.stage,
            new_stage,
            progress: self.progress,
            transitioned_at: Utc::now(),
        };
        self.stage = new_stage;
        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MediaFiles, Transcript};
    use dub_common::Failure;
    use std::path::PathBuf;

    fn params() -> JobParams {
        JobParams::from_request(&SubmitRequest::new(
            "https://www.youtube.com/watch?v=test",
            "spanish",
        ))
        .unwrap()
    }

    fn media() -> MediaFiles {
        MediaFiles {
            audio_path: PathBuf::from("a.wav"),
            video_path: PathBuf::from("v.mp4"),
            duration_seconds: Some(60.0),
        }
    }

    fn advance_to(session: &mut Session, target: Stage) {
        for stage in Stage::PIPELINE {
            session.enter_stage(stage).unwrap();
            if stage == target {
                return;
            }
        }
    }

    #[test]
    fn test_new_session_is_queued() {
        let session = Session::new(params());
        assert_eq!(session.stage, Stage::Queued);
        assert_eq!(session.progress, 0);
        assert!(session.source_language.is_none());
        assert_eq!(session.target_language, "spanish");
        assert!(session.completed_at.is_none());
    }

    #[test]
    fn test_full_forward_progression() {
        let mut session = Session::new(params());
        let mut last_progress = 0;
        for stage in Stage::PIPELINE {
            let transition = session.enter_stage(stage).unwrap();
            assert_eq!(transition.new_stage, stage);
            assert_eq!(session.progress, stage.progress_band().0);
            assert!(session.progress >= last_progress);
            last_progress = session.progress;
        }
        session.complete().unwrap();
        assert_eq!(session.stage, Stage::Completed);
        assert_eq!(session.progress, 100);
        assert!(session.completed_at.is_some());
    }

    #[test]
    fn test_skipping_or_reverting_is_rejected() {
        let mut session = Session::new(params());
        assert!(matches!(
            session.enter_stage(Stage::Translate),
            Err(TransitionError::OutOfOrder { .. })
        ));

        advance_to(&mut session, Stage::Translate);
        assert!(session.enter_stage(Stage::Download).is_err());
        assert!(session.enter_stage(Stage::Translate).is_err());
        assert!(session.complete().is_err());
        assert_eq!(session.stage, Stage::Translate);
    }

    #[test]
    fn test_retry_count_resets_on_next_stage() {
        let mut session = Session::new(params());
        advance_to(&mut session, Stage::Translate);
        assert_eq!(session.record_retry(), 1);
        assert_eq!(session.record_retry(), 2);

        session.enter_stage(Stage::Synthesize).unwrap();
        assert_eq!(session.retry_count, 0);
    }

    #[test]
    fn test_terminal_sessions_refuse_mutation() {
        let mut session = Session::new(params());
        advance_to(&mut session, Stage::Download);
        let error = ErrorRecord::classify(Stage::Download, &Failure::InvalidInput("bad".into()));
        session.fail(error.clone()).unwrap();

        assert_eq!(session.stage, Stage::Failed);
        assert_eq!(session.error.as_ref(), Some(&error));
        assert!(matches!(
            session.enter_stage(Stage::Transcribe),
            Err(TransitionError::Terminal { .. })
        ));
        assert!(session.fail(error).is_err());
        assert!(session.complete().is_err());
    }

    #[test]
    fn test_failure_keeps_last_artifact() {
        let mut session = Session::new(params());
        advance_to(&mut session, Stage::Transcribe);
        session.store_artifact(Arc::new(Artifact::Media(media())));

        session
            .fail(ErrorRecord::new(Stage::Transcribe, ErrorKind::Auth))
            .unwrap();
        assert!(matches!(session.artifact.as_deref(), Some(Artifact::Media(_))));
        assert_eq!(session.duration_seconds(), Some(60.0));
    }

    #[test]
    fn test_cancellation_releases_artifact() {
        let mut session = Session::new(params());
        advance_to(&mut session, Stage::Transcribe);
        session.store_artifact(Arc::new(Artifact::Media(media())));

        session
            .fail(ErrorRecord::new(Stage::Transcribe, ErrorKind::Cancelled))
            .unwrap();
        assert!(session.artifact.is_none());
    }

    #[test]
    fn test_store_artifact_picks_up_detected_language() {
        let mut session = Session::new(params());
        let previous = session.store_artifact(Arc::new(Artifact::Media(media())));
        assert!(previous.is_none());

        let previous = session.store_artifact(Arc::new(Artifact::Transcript {
            media: media(),
            transcript: Transcript {
                text: "hello".into(),
                detected_language: "en".into(),
            },
        }));
        assert!(matches!(previous.as_deref(), Some(Artifact::Media(_))));
        assert_eq!(session.source_language.as_deref(), Some("en"));
    }
}
