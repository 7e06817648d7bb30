//! Test Helper Utilities
//!
//! Scripted stage fakes and a ready-to-use service for dub-pipeline tests.

#![allow(dead_code)]

use async_trait::async_trait;
use dub_common::events::EventBus;
use dub_common::{BackoffPolicy, Failure, Stage};
use dub_pipeline::models::{
    Artifact, FinalVideo, MediaFiles, Session, SynthesizedAudio, Transcript, Translation,
};
use dub_pipeline::stages::{JobContext, StageProcessor, StageSet};
use dub_pipeline::{AppState, PipelineOrchestrator, SessionRegistry};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

pub const FAKE_DURATION: f64 = 42.0;
pub const FAKE_VIDEO_BYTES: usize = 4096;

/// Stage fake that replays a script of failures before succeeding
pub struct ScriptedStage {
    stage: Stage,
    failures: Mutex<VecDeque<Failure>>,
    permanent: Mutex<Option<Failure>>,
    blocking: AtomicBool,
    delay: Mutex<Duration>,
    calls: AtomicU32,
}

impl ScriptedStage {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            failures: Mutex::new(VecDeque::new()),
            permanent: Mutex::new(None),
            blocking: AtomicBool::new(false),
            delay: Mutex::new(Duration::ZERO),
            calls: AtomicU32::new(0),
        }
    }

    /// Fail the next `times` invocations with `failure`, then succeed
    pub fn fail_times(&self, times: usize, failure: Failure) {
        let mut failures = self.failures.lock().unwrap();
        for _ in 0..times {
            failures.push_back(failure.clone());
        }
    }

    /// Fail every invocation
    pub fn fail_always(&self, failure: Failure) {
        *self.permanent.lock().unwrap() = Some(failure);
    }

    /// Never return
    pub fn block(&self) {
        self.blocking.store(true, Ordering::SeqCst);
    }

    /// Sleep before answering
    pub fn delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageProcessor for ScriptedStage {
    fn stage(&self) -> Stage {
        self.stage
    }

    async fn process(&self, input: &Artifact, ctx: &JobContext) -> Result<Artifact, Failure> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.blocking.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let permanent = self.permanent.lock().unwrap().clone();
        if let Some(failure) = permanent {
            return Err(failure);
        }
        let scripted = self.failures.lock().unwrap().pop_front();
        if let Some(failure) = scripted {
            return Err(failure);
        }
        Ok(fake_output(self.stage, input, ctx).await)
    }
}

/// Plausible artifact for each stage
async fn fake_output(stage: Stage, input: &Artifact, ctx: &JobContext) -> Artifact {
    let media = input.media().cloned().unwrap_or_else(|| MediaFiles {
        audio_path: ctx.work_dir.join("original_audio.wav"),
        video_path: ctx.work_dir.join("original_video.mp4"),
        duration_seconds: Some(FAKE_DURATION),
    });

    match stage {
        Stage::Download => Artifact::Media(media),
        Stage::Transcribe => Artifact::Transcript {
            media,
            transcript: Transcript {
                text: "hello world".to_string(),
                detected_language: "en".to_string(),
            },
        },
        Stage::Translate => Artifact::Translation {
            media,
            translation: Translation {
                text: "hola mundo".to_string(),
                source_language: "en".to_string(),
                target_language: ctx.params.target_language.clone(),
                original_text: "hello world".to_string(),
            },
        },
        Stage::Synthesize => Artifact::DubbedAudio {
            media,
            audio: SynthesizedAudio {
                audio_path: ctx.work_dir.join("dubbed_audio.mp3"),
                voice_id: "voice".to_string(),
                text_length: 10,
            },
        },
        _ => {
            let video_path = ctx.work_dir.join("final_dubbed_video.mp4");
            tokio::fs::create_dir_all(&ctx.work_dir).await.unwrap();
            tokio::fs::write(&video_path, vec![7u8; FAKE_VIDEO_BYTES])
                .await
                .unwrap();
            Artifact::FinalVideo(FinalVideo {
                video_path,
                file_size_bytes: FAKE_VIDEO_BYTES as u64,
                duration_seconds: Some(FAKE_DURATION),
            })
        }
    }
}

/// One scripted fake per processing stage
pub struct FakeStages {
    stages: Vec<Arc<ScriptedStage>>,
}

impl FakeStages {
    pub fn new() -> Self {
        Self {
            stages: Stage::PIPELINE
                .iter()
                .map(|s| Arc::new(ScriptedStage::new(*s)))
                .collect(),
        }
    }

    pub fn get(&self, stage: Stage) -> &Arc<ScriptedStage> {
        self.stages
            .iter()
            .find(|s| s.stage == stage)
            .expect("processing stage")
    }

    pub fn stage_set(&self) -> StageSet {
        StageSet::new(
            self.stages
                .iter()
                .map(|s| s.clone() as Arc<dyn StageProcessor>)
                .collect(),
        )
        .unwrap()
    }
}

/// Registry + orchestrator wired to scripted fakes
pub struct TestService {
    pub registry: Arc<SessionRegistry>,
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub event_bus: EventBus,
    pub stages: FakeStages,
    output: TempDir,
}

impl TestService {
    /// Service whose retries wait a millisecond each
    pub fn new(max_retries: u32) -> Self {
        Self::with_policy(BackoffPolicy::immediate(max_retries))
    }

    pub fn with_policy(policy: BackoffPolicy) -> Self {
        let output = tempfile::tempdir().unwrap();
        let stages = FakeStages::new();
        let event_bus = EventBus::new(256);
        let orchestrator = Arc::new(PipelineOrchestrator::new(
            stages.stage_set(),
            policy,
            event_bus.clone(),
            output.path().to_path_buf(),
        ));
        Self {
            registry: Arc::new(SessionRegistry::new()),
            orchestrator,
            event_bus,
            stages,
            output,
        }
    }

    pub fn stage(&self, stage: Stage) -> &Arc<ScriptedStage> {
        self.stages.get(stage)
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(
            self.registry.clone(),
            self.orchestrator.clone(),
            self.event_bus.clone(),
        )
    }

    pub fn output_root(&self) -> &std::path::Path {
        self.output.path()
    }
}

/// Poll the registry until the session is terminal
pub async fn wait_terminal(registry: &SessionRegistry, id: Uuid) -> Session {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let session = registry.get(id).await.unwrap();
        if session.is_terminal() {
            return session;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "session {} stuck in {}",
            id,
            session.stage
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
