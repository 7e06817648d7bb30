//! Dubbing job endpoints
//!
//! - POST /dub/submit
//! - GET  /dub/status/{session_id}
//! - GET  /dub/result/{session_id}
//! - POST /dub/cancel/{session_id}

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use dub_common::api::{JobStatus, StatusView, SubmitRequest, SubmitResponse};
use dub_common::events::DubEvent;
use dub_common::Stage;
use serde::Serialize;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::status;
use crate::AppState;

/// POST /dub/cancel/{session_id} response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub session_id: Uuid,
    pub cancelled: bool,
}

/// POST /dub/submit
///
/// Validates the submission, creates a queued session and starts its
/// orchestration in the background. Answers 202 before any stage runs.
pub async fn submit_job(
    State(state): State<AppState>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let Json(request) = payload.map_err(|e| ApiError::BadInput(e.body_text()))?;

    // The token map stays locked until the token is in place, so a cancel
    // request never sees the new session without its token.
    let mut tokens = state.cancellation_tokens.write().await;
    let session = state.registry.create(&request).await?;
    let session_id = session.id;
    let writer = state.registry.claim(session_id).await?;
    let token = CancellationToken::new();
    tokens.insert(session_id, token.clone());
    drop(tokens);

    state.event_bus.emit_lossy(DubEvent::SessionCreated {
        session_id,
        target_language: session.target_language.clone(),
        timestamp: Utc::now(),
    });

    let handle = state.orchestrator.spawn(writer, token);
    let tokens = state.cancellation_tokens.clone();
    tokio::spawn(async move {
        if let Err(e) = handle.await {
            tracing::error!(session_id = %session_id, error = %e, "Orchestration task aborted");
        }
        tokens.write().await.remove(&session_id);
    });

    tracing::info!(
        session_id = %session_id,
        source_url = %session.params.source_url,
        "Dubbing job accepted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            session_id,
            status: JobStatus::from_stage(session.stage),
            current_stage: session.stage,
            created_at: session.created_at,
        }),
    ))
}

/// GET /dub/status/{session_id}
pub async fn get_status(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<StatusView>> {
    let session = state.registry.get(session_id).await?;
    tracing::debug!(session_id = %session_id, stage = %session.stage, "Status query");
    Ok(Json(status::project(&session)))
}

/// GET /dub/result/{session_id}
///
/// Streams the final video of a completed session.
pub async fn get_result(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Response> {
    let session = state.registry.get(session_id).await?;
    if session.stage != Stage::Completed {
        return Err(ApiError::NotReady(format!(
            "Session {} is {}, result is available once completed",
            session_id, session.stage
        )));
    }
    let video = session
        .final_video()
        .ok_or_else(|| ApiError::Internal(format!("Session {} has no final video", session_id)))?;

    let file = tokio::fs::File::open(&video.video_path).await?;
    let length = file.metadata().await?.len();
    let format = session.params.options.format;
    let filename = format!("dubbed_{}.{}", session_id, format.extension());

    tracing::info!(session_id = %session_id, bytes = length, "Serving dubbed video");

    let body = Body::from_stream(ReaderStream::new(file));
    Ok((
        [
            (header::CONTENT_TYPE, format.mime_type().to_string()),
            (header::CONTENT_LENGTH, length.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response())
}

/// POST /dub/cancel/{session_id}
///
/// Signals the job's cancellation token. The orchestrator moves the session
/// to `failed` with kind `cancelled` once it observes the signal.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<CancelResponse>> {
    let session = state.registry.get(session_id).await?;
    if session.is_terminal() {
        return Err(ApiError::Conflict(format!(
            "Session {} is already {}",
            session_id, session.stage
        )));
    }

    let token = state
        .cancellation_tokens
        .read()
        .await
        .get(&session_id)
        .cloned()
        .ok_or_else(|| {
            ApiError::Conflict(format!("Session {} has no running job", session_id))
        })?;
    token.cancel();

    tracing::info!(session_id = %session_id, stage = %session.stage, "Cancellation requested");

    Ok(Json(CancelResponse {
        session_id,
        cancelled: true,
    }))
}

/// Build job routes
pub fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/dub/submit", post(submit_job))
        .route("/dub/status/:session_id", get(get_status))
        .route("/dub/result/:session_id", get(get_result))
        .route("/dub/cancel/:session_id", post(cancel_job))
}
