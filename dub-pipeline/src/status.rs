//! Status projection
//!
//! Read-only mapping from a session snapshot to the external status view.
//! Never mutates, never blocks on a running stage.

use dub_common::api::{JobStatus, StatusView};
use dub_common::Stage;

use crate::models::Session;

/// Project a session snapshot onto the status contract
///
/// A failed session reports the stage it failed in as `currentStage`, so a
/// client can tell which step broke without inspecting the error.
pub fn project(session: &Session) -> StatusView {
    let current_stage = match (&session.stage, &session.error) {
        (Stage::Failed, Some(error)) => error.stage,
        (stage, _) => *stage,
    };

    StatusView {
        session_id: session.id,
        status: JobStatus::from_stage(session.stage),
        current_stage,
        progress: session.progress,
        source_language: session.source_language.clone(),
        target_language: session.target_language.clone(),
        duration_seconds: session.duration_seconds(),
        error: session.error.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Artifact, JobParams, MediaFiles};
    use dub_common::api::SubmitRequest;
    use dub_common::{ErrorKind, ErrorRecord};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn session() -> Session {
        Session::new(
            JobParams::from_request(&SubmitRequest::new("https://youtu.be/xyz", "german")).unwrap(),
        )
    }

    #[test]
    fn test_queued_projection() {
        let session = session();
        let view = project(&session);
        assert_eq!(view.status, JobStatus::Processing);
        assert_eq!(view.current_stage, Stage::Queued);
        assert_eq!(view.progress, 0);
        assert!(view.source_language.is_none());
        assert!(view.duration_seconds.is_none());
        assert!(view.error.is_none());
    }

    #[test]
    fn test_in_flight_projection_carries_duration() {
        let mut session = session();
        session.enter_stage(Stage::Download).unwrap();
        session.store_artifact(Arc::new(Artifact::Media(MediaFiles {
            audio_path: PathBuf::from("a.wav"),
            video_path: PathBuf::from("v.mp4"),
            duration_seconds: Some(12.5),
        })));
        session.enter_stage(Stage::Transcribe).unwrap();

        let view = project(&session);
        assert_eq!(view.current_stage, Stage::Transcribe);
        assert_eq!(view.progress, 20);
        assert_eq!(view.duration_seconds, Some(12.5));
    }

    #[test]
    fn test_failed_projection_reports_failing_stage() {
        let mut session = session();
        session.enter_stage(Stage::Download).unwrap();
        session.enter_stage(Stage::Transcribe).unwrap();
        session.enter_stage(Stage::Translate).unwrap();
        session
            .fail(ErrorRecord::new(Stage::Translate, ErrorKind::RateLimit))
            .unwrap();

        let view = project(&session);
        assert_eq!(view.status, JobStatus::Error);
        assert_eq!(view.current_stage, Stage::Translate);
        assert_eq!(view.progress, 40);
        let error = view.error.unwrap();
        assert_eq!(error.kind, ErrorKind::RateLimit);
        assert!(error.retryable);
    }
}
