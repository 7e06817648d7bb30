//! Server-Sent Events for job progress
//!
//! Push-style companion to the status endpoint. Events are best effort: a
//! subscriber that falls behind skips what it missed and keeps streaming.

use crate::AppState;
use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Optional filter for a single session
#[derive(Debug, Default, Deserialize)]
pub struct EventFilter {
    pub session_id: Option<Uuid>,
}

/// GET /dub/events[?session_id=...]
///
/// Streams:
/// - SessionCreated
/// - StageStarted
/// - StageRetrying
/// - SessionCompleted
/// - SessionFailed
pub async fn job_event_stream(
    State(state): State<AppState>,
    Query(filter): Query<EventFilter>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(session_id = ?filter.session_id, "New SSE client connected to job events");

    let mut rx = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if filter.session_id.is_some_and(|id| id != event.session_id()) {
                        continue;
                    }
                    let event_type = event.event_type();
                    match serde_json::to_string(&event) {
                        Ok(json) => {
                            debug!("SSE: Broadcasting job event: {}", event_type);
                            yield Ok(Event::default().event(event_type).data(json));
                        }
                        Err(e) => {
                            warn!("SSE: Failed to serialize event {}: {}", event_type, e);
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("SSE: Subscriber lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => {
                    debug!("SSE: Event bus closed");
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}
