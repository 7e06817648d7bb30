//! # Dubbing Client Library
//!
//! Talks to the dub-pipeline service:
//! - [`DubClient`]: typed submit / status / result / cancel calls
//! - [`RetrySchedule`]: fixed operation-level retry around each call
//! - [`StatusPoller`]: watches a session until it completes or fails

pub mod error;
pub mod http;
pub mod poller;
pub mod retry;

pub use error::ClientError;
pub use http::DubClient;
pub use poller::{PollError, PollPolicy, ProgressReporter, StatusPoller, StatusSource, TracingReporter};
pub use retry::RetrySchedule;
