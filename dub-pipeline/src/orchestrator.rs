//! Pipeline orchestrator
//!
//! Drives one session through the five processing stages in order. Owns the
//! stage-level retry loop: a failed stage attempt is classified, and retryable
//! kinds are re-invoked with capped exponential backoff until the per-kind cap
//! is spent. Anything beyond the cap, and every non-retryable kind, moves the
//! session to `failed` with the classified error attached.
//!
//! The orchestrator is the only writer of the session it runs. Status readers
//! never wait on a stage: stage work happens outside the session lock.

use chrono::Utc;
use dub_common::events::{DubEvent, EventBus};
use dub_common::{BackoffPolicy, ErrorRecord, Failure, Stage};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::models::{Artifact, Session, StateTransition, TransitionError};
use crate::registry::SessionWriter;
use crate::stages::{JobContext, StageProcessor, StageSet};

/// Runs sessions through the stage pipeline
pub struct PipelineOrchestrator {
    stages: StageSet,
    policy: BackoffPolicy,
    event_bus: EventBus,
    output_root: PathBuf,
}

impl PipelineOrchestrator {
    pub fn new(
        stages: StageSet,
        policy: BackoffPolicy,
        event_bus: EventBus,
        output_root: PathBuf,
    ) -> Self {
        Self {
            stages,
            policy,
            event_bus,
            output_root,
        }
    }

    /// Session-scoped folder for a job's files
    pub fn work_dir(&self, session: &Session) -> PathBuf {
        self.output_root.join(session.id.to_string())
    }

    /// Run a claimed session on a background task
    pub fn spawn(self: &Arc<Self>, writer: SessionWriter, cancel: CancellationToken) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        let span = info_span!("job", session_id = %writer.id());
        tokio::spawn(async move { orchestrator.run(writer, cancel).await }.instrument(span))
    }

    /// Run a claimed session to a terminal stage
    ///
    /// Does nothing unless the session is still queued, so a session is
    /// orchestrated at most once.
    pub async fn run(&self, writer: SessionWriter, cancel: CancellationToken) {
        let session = writer.snapshot().await;
        if session.stage != Stage::Queued {
            warn!(stage = %session.stage, "Session is not queued, skipping orchestration");
            return;
        }

        let ctx = JobContext {
            session_id: session.id,
            params: session.params.clone(),
            work_dir: self.work_dir(&session),
        };
        if let Err(e) = tokio::fs::create_dir_all(&ctx.work_dir).await {
            let record = ErrorRecord::classify(
                Stage::Download,
                &Failure::Other(format!("cannot create {}: {}", ctx.work_dir.display(), e)),
            );
            self.fail(&writer, record).await;
            return;
        }

        info!(work_dir = %ctx.work_dir.display(), "Pipeline started");
        match writer.mutate(|s| s.enter_stage(Stage::Download)).await {
            Ok(transition) => self.emit_stage_started(&transition),
            Err(e) => {
                error!(error = %e, "Could not start pipeline");
                return;
            }
        }

        let mut input = Arc::new(Artifact::Submission(session.params));
        for stage in Stage::PIPELINE {
            let Some(processor) = self.stages.processor(stage) else {
                let record = ErrorRecord::classify(
                    stage,
                    &Failure::Other(format!("no processor registered for {}", stage)),
                );
                self.fail(&writer, record).await;
                return;
            };

            let output = match self
                .run_stage(&writer, processor.as_ref(), &input, &ctx, &cancel)
                .await
            {
                Ok(output) => Arc::new(output),
                Err(record) => {
                    self.fail(&writer, record).await;
                    return;
                }
            };
            debug!(stage = %stage, artifact = output.label(), "Stage succeeded");

            let advanced = writer
                .mutate(|s| -> Result<StateTransition, TransitionError> {
                    s.store_artifact(Arc::clone(&output));
                    match stage.next() {
                        Some(Stage::Completed) => s.complete(),
                        Some(next) => s.enter_stage(next),
                        None => s.complete(),
                    }
                })
                .await;
            match advanced {
                Ok(transition) if transition.new_stage == Stage::Completed => {
                    self.emit_completed(&writer).await;
                }
                Ok(transition) => self.emit_stage_started(&transition),
                Err(e) => {
                    error!(stage = %stage, error = %e, "Could not advance session");
                    return;
                }
            }
            input = output;
        }
    }

    /// Invoke one stage until it succeeds or its retry cap is spent
    async fn run_stage(
        &self,
        writer: &SessionWriter,
        processor: &dyn StageProcessor,
        input: &Artifact,
        ctx: &JobContext,
        cancel: &CancellationToken,
    ) -> Result<Artifact, ErrorRecord> {
        let stage = processor.stage();
        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Failure::Cancelled),
                result = processor.process(input, ctx) => result,
            };

            let failure = match outcome {
                Ok(artifact) => return Ok(artifact),
                Err(failure) => failure,
            };
            let record = ErrorRecord::classify(stage, &failure);
            let cap = record.kind.retry_cap(self.policy.max_retries);
            let spent = writer.mutate(|s| s.retry_count).await;

            if spent >= cap {
                warn!(
                    stage = %stage,
                    kind = %record.kind,
                    retries = spent,
                    detail = record.detail.as_deref().unwrap_or(""),
                    "Stage failed"
                );
                return Err(record);
            }

            let retry = writer.mutate(|s| s.record_retry()).await;
            let delay = self.policy.delay_for(retry);
            warn!(
                stage = %stage,
                kind = %record.kind,
                retry,
                cap,
                delay_ms = delay.as_millis() as u64,
                detail = record.detail.as_deref().unwrap_or(""),
                "Stage attempt failed, retrying"
            );
            self.event_bus.emit_lossy(DubEvent::StageRetrying {
                session_id: writer.id(),
                stage,
                attempt: retry,
                kind: record.kind,
                delay_ms: delay.as_millis() as u64,
                timestamp: Utc::now(),
            });

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(ErrorRecord::classify(stage, &Failure::Cancelled));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn fail(&self, writer: &SessionWriter, record: ErrorRecord) {
        let event_record = record.clone();
        match writer.mutate(|s| s.fail(record)).await {
            Ok(_) => {
                info!(
                    stage = %event_record.stage,
                    kind = %event_record.kind,
                    "Pipeline failed"
                );
                self.event_bus.emit_lossy(DubEvent::SessionFailed {
                    session_id: writer.id(),
                    error: event_record,
                    timestamp: Utc::now(),
                });
            }
            Err(e) => error!(error = %e, "Could not record failure"),
        }
    }

    fn emit_stage_started(&self, transition: &StateTransition) {
        info!(stage = %transition.new_stage, progress = transition.progress, "Stage started");
        self.event_bus.emit_lossy(DubEvent::StageStarted {
            session_id: transition.session_id,
            stage: transition.new_stage,
            progress: transition.progress,
            timestamp: transition.transitioned_at,
        });
    }

    async fn emit_completed(&self, writer: &SessionWriter) {
        let duration_seconds = writer.snapshot().await.duration_seconds();
        info!(duration_seconds = ?duration_seconds, "Pipeline completed");
        self.event_bus.emit_lossy(DubEvent::SessionCompleted {
            session_id: writer.id(),
            duration_seconds,
            timestamp: Utc::now(),
        });
    }
}
