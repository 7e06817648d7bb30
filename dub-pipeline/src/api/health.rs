//! Service banner and health check

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

const MODULE_NAME: &str = "dub-pipeline";

/// GET / response
#[derive(Debug, Serialize)]
pub struct BannerResponse {
    pub service: String,
    pub version: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status ("ok")
    pub status: String,
    /// Module name ("dub-pipeline")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Sessions not yet completed or failed
    pub active_jobs: usize,
}

/// GET /
pub async fn banner() -> Json<BannerResponse> {
    Json(BannerResponse {
        service: format!("{} video dubbing service", MODULE_NAME),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        module: MODULE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        active_jobs: state.registry.active_count().await,
    })
}

/// Build banner and health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(banner))
        .route("/health", get(health_check))
}
