//! Data models for dub-pipeline
//!
//! - Session state machine
//! - Stage artifacts

pub mod artifact;
pub mod session;

pub use artifact::{
    Artifact, FinalVideo, MediaFiles, SynthesizedAudio, Transcript, Translation,
};
pub use session::{JobParams, Session, StateTransition, TransitionError};
