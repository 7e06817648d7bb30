//! dub-pipeline library interface
//!
//! Exposes the job service pieces for the binary and for integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod registry;
pub mod stages;
pub mod status;

pub use crate::error::{ApiError, ApiResult};
pub use crate::orchestrator::PipelineOrchestrator;
pub use crate::registry::SessionRegistry;

use axum::Router;
use chrono::{DateTime, Utc};
use dub_common::events::EventBus;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Event bus buffer per subscriber
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// All known sessions
    pub registry: Arc<SessionRegistry>,
    /// Runs accepted sessions through the stages
    pub orchestrator: Arc<PipelineOrchestrator>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Cancellation tokens for running jobs
    pub cancellation_tokens: Arc<RwLock<HashMap<Uuid, CancellationToken>>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        registry: Arc<SessionRegistry>,
        orchestrator: Arc<PipelineOrchestrator>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            registry,
            orchestrator,
            event_bus,
            cancellation_tokens: Arc::new(RwLock::new(HashMap::new())),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::health_routes())
        .merge(api::job_routes())
        .route("/dub/events", get(api::job_event_stream))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Periodically evict terminal sessions older than `retention`
///
/// Stops when `shutdown` is cancelled.
pub fn spawn_retention_sweeper(
    registry: Arc<SessionRegistry>,
    retention: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let period = (retention / 4).clamp(Duration::from_secs(1), Duration::from_secs(300));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = registry.evict_terminal(retention).await;
                    if evicted > 0 {
                        tracing::info!(evicted, "Evicted expired sessions");
                    }
                }
            }
        }
        tracing::debug!("Retention sweeper stopped");
    })
}
