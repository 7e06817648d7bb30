//! Job stage vocabulary
//!
//! A dubbing job moves through a fixed, strictly sequential order:
//!
//! QUEUED → DOWNLOAD → TRANSCRIBE → TRANSLATE → SYNTHESIZE → OVERLAY → COMPLETED
//!
//! and may leave that order only by dropping into FAILED. Each processing stage
//! owns a contiguous, non-overlapping band of the 0-100 progress scale.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a job in the stage order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Accepted, orchestration not yet started
    Queued,
    /// Fetch source media (audio + video)
    Download,
    /// Speech-to-text with language detection
    Transcribe,
    /// Text translation into the target language
    Translate,
    /// Speech synthesis of the translated text
    Synthesize,
    /// Mux dubbed audio onto the original video
    Overlay,
    /// Terminal: all stages succeeded
    Completed,
    /// Terminal: a stage failed or the job was cancelled
    Failed,
}

impl Stage {
    /// Processing stages in execution order
    pub const PIPELINE: [Stage; 5] = [
        Stage::Download,
        Stage::Transcribe,
        Stage::Translate,
        Stage::Synthesize,
        Stage::Overlay,
    ];

    /// Position in the forward order. `Failed` has no position.
    pub fn ordinal(self) -> Option<u8> {
        match self {
            Stage::Queued => Some(0),
            Stage::Download => Some(1),
            Stage::Transcribe => Some(2),
            Stage::Translate => Some(3),
            Stage::Synthesize => Some(4),
            Stage::Overlay => Some(5),
            Stage::Completed => Some(6),
            Stage::Failed => None,
        }
    }

    /// Stage that follows this one on success
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Queued => Some(Stage::Download),
            Stage::Download => Some(Stage::Transcribe),
            Stage::Transcribe => Some(Stage::Translate),
            Stage::Translate => Some(Stage::Synthesize),
            Stage::Synthesize => Some(Stage::Overlay),
            Stage::Overlay => Some(Stage::Completed),
            Stage::Completed | Stage::Failed => None,
        }
    }

    /// Completed and failed accept no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }

    /// True for the five stages that invoke a collaborator
    pub fn is_processing(self) -> bool {
        Self::PIPELINE.contains(&self)
    }

    /// Progress band owned by this stage, as `(lower, upper)` with `upper` exclusive
    /// except for `Completed`, which pins progress at 100.
    pub fn progress_band(self) -> (u8, u8) {
        match self {
            Stage::Queued => (0, 0),
            Stage::Download => (0, 20),
            Stage::Transcribe => (20, 40),
            Stage::Translate => (40, 60),
            Stage::Synthesize => (60, 80),
            Stage::Overlay => (80, 100),
            Stage::Completed => (100, 100),
            Stage::Failed => (0, 100),
        }
    }

    /// Lowercase wire name
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Queued => "queued",
            Stage::Download => "download",
            Stage::Transcribe => "transcribe",
            Stage::Translate => "translate",
            Stage::Synthesize => "synthesize",
            Stage::Overlay => "overlay",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_follows_next_chain() {
        let mut stage = Stage::Queued;
        let mut visited = Vec::new();
        while let Some(next) = stage.next() {
            visited.push(next);
            stage = next;
        }
        assert_eq!(
            visited,
            vec![
                Stage::Download,
                Stage::Transcribe,
                Stage::Translate,
                Stage::Synthesize,
                Stage::Overlay,
                Stage::Completed,
            ]
        );
        assert!(stage.is_terminal());
    }

    #[test]
    fn test_progress_bands_are_contiguous_and_disjoint() {
        let mut expected_lower = 0;
        for stage in Stage::PIPELINE {
            let (lower, upper) = stage.progress_band();
            assert_eq!(lower, expected_lower, "{} band should start where the previous ended", stage);
            assert!(upper > lower);
            expected_lower = upper;
        }
        assert_eq!(expected_lower, 100);
        assert_eq!(Stage::Completed.progress_band(), (100, 100));
    }

    #[test]
    fn test_ordinals_increase_along_pipeline() {
        let ordinals: Vec<u8> = Stage::PIPELINE
            .iter()
            .filter_map(|s| s.ordinal())
            .collect();
        assert!(ordinals.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(Stage::Failed.ordinal(), None);
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_string(&Stage::Synthesize).unwrap(), "\"synthesize\"");
        let parsed: Stage = serde_json::from_str("\"overlay\"").unwrap();
        assert_eq!(parsed, Stage::Overlay);
        assert_eq!(Stage::Translate.to_string(), "translate");
    }
}
