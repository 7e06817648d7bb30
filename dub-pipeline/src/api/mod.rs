//! HTTP API handlers for dub-pipeline
//!
//! REST endpoints for job submission and observation, plus an SSE stream.

pub mod health;
pub mod jobs;
pub mod sse;

pub use health::health_routes;
pub use jobs::job_routes;
pub use sse::job_event_stream;
