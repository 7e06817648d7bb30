//! Stage contract and concrete stage adapters
//!
//! Every processing stage implements [`StageProcessor`]: it consumes the
//! previous stage's artifact and either produces the next artifact or reports
//! a raw [`Failure`]. Stages never classify their own failures and never retry;
//! both belong to the orchestrator.

pub mod command;
pub mod download;
pub mod http;
pub mod overlay;
pub mod synthesize;
pub mod transcribe;
pub mod translate;

use async_trait::async_trait;
use dub_common::{Failure, Stage};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{PipelineConfig, ResolvedCredentials};
use crate::models::{Artifact, JobParams};

pub use download::DownloadStage;
pub use overlay::OverlayStage;
pub use synthesize::SynthesizeStage;
pub use transcribe::TranscribeStage;
pub use translate::TranslateStage;

/// Per-job context handed to every stage invocation
#[derive(Debug, Clone)]
pub struct JobContext {
    pub session_id: Uuid,
    pub params: JobParams,
    /// Session-scoped folder for intermediate and final files
    pub work_dir: PathBuf,
}

/// One step of the dubbing pipeline
///
/// Implementations are stateless with respect to jobs: a single instance is
/// shared by every session, so anything job-specific comes through `ctx`.
/// Invoking `process` again with the same input is the retry mechanism, so
/// a second call must not depend on side effects of the first.
#[async_trait]
pub trait StageProcessor: Send + Sync {
    /// Stage this processor implements
    fn stage(&self) -> Stage;

    /// Transform the previous artifact into this stage's artifact
    async fn process(&self, input: &Artifact, ctx: &JobContext) -> Result<Artifact, Failure>;
}

/// Exactly one processor per processing stage
#[derive(Clone)]
pub struct StageSet {
    processors: HashMap<Stage, Arc<dyn StageProcessor>>,
}

impl StageSet {
    /// Build a set, requiring each of the five stages exactly once
    pub fn new(processors: Vec<Arc<dyn StageProcessor>>) -> dub_common::Result<Self> {
        let mut map: HashMap<Stage, Arc<dyn StageProcessor>> = HashMap::new();
        for processor in processors {
            let stage = processor.stage();
            if !stage.is_processing() {
                return Err(dub_common::Error::Config(format!(
                    "{} is not a processing stage",
                    stage
                )));
            }
            if map.insert(stage, processor).is_some() {
                return Err(dub_common::Error::Config(format!(
                    "duplicate processor for stage {}",
                    stage
                )));
            }
        }

        if let Some(missing) = Stage::PIPELINE.iter().find(|s| !map.contains_key(s)) {
            return Err(dub_common::Error::Config(format!(
                "no processor for stage {}",
                missing
            )));
        }
        Ok(Self { processors: map })
    }

    /// Production adapters backed by yt-dlp, ElevenLabs, Anthropic and ffmpeg
    pub fn from_config(
        config: &PipelineConfig,
        credentials: &ResolvedCredentials,
    ) -> dub_common::Result<Self> {
        let client = http::build_client(config.pipeline.http_timeout())?;
        let tools = &config.tools;
        let endpoints = &config.endpoints;

        Self::new(vec![
            Arc::new(DownloadStage::new(tools.yt_dlp.clone(), tools.ffprobe.clone())),
            Arc::new(TranscribeStage::new(
                client.clone(),
                endpoints.elevenlabs_base_url.clone(),
                credentials.elevenlabs_api_key.clone(),
            )),
            Arc::new(TranslateStage::new(
                client.clone(),
                endpoints.anthropic_base_url.clone(),
                credentials.anthropic_api_key.clone(),
            )),
            Arc::new(SynthesizeStage::new(
                client,
                endpoints.elevenlabs_base_url.clone(),
                credentials.elevenlabs_api_key.clone(),
            )),
            Arc::new(OverlayStage::new(tools.ffmpeg.clone(), tools.ffprobe.clone())),
        ])
    }

    /// Processor for `stage`, `None` for non-processing stages
    pub fn processor(&self, stage: Stage) -> Option<Arc<dyn StageProcessor>> {
        self.processors.get(&stage).cloned()
    }
}

/// Shorthand for the failure a stage reports when handed the wrong artifact
pub(crate) fn unexpected_input(stage: Stage, input: &Artifact) -> Failure {
    Failure::Other(format!(
        "{} stage received unexpected {} artifact",
        stage,
        input.label()
    ))
}

/// Key check before any external call
pub(crate) fn require_key<'a>(key: &'a Option<String>, service: &str) -> Result<&'a str, Failure> {
    key.as_deref()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| Failure::Auth(format!("{} API key is not configured", service)))
}
