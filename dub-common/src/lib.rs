//! # Dubbing Common Library
//!
//! Shared vocabulary for the dubbing pipeline service and its clients:
//! - Stage order and progress bands
//! - Error taxonomy and error records
//! - Wire types for submission and status
//! - Backoff policy configuration
//! - Event types and event bus
//! - Configuration loading helpers

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod retry;
pub mod stage;
pub mod taxonomy;

pub use error::{Error, Result};
pub use retry::BackoffPolicy;
pub use stage::Stage;
pub use taxonomy::{ErrorKind, ErrorRecord, Failure};
