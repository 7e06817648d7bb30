//! Status polling
//!
//! Watches one session until it reaches a terminal state. Status is fetched
//! every `interval`; a successful fetch resets the consecutive-failure counter.
//! A failed fetch waits `interval × failures` before trying again, and the
//! poller gives up once `max_failures` consecutive fetches have failed.
//!
//! A job that stays in a processing stage forever never ends the poll on its
//! own; callers bound the wait with their own timeout.

use async_trait::async_trait;
use dub_common::api::{JobStatus, StatusView};
use dub_common::{ErrorKind, ErrorRecord};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ClientError;

/// Polling cadence and failure tolerance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    #[serde(rename = "interval_ms", with = "dub_common::retry::duration_ms")]
    pub interval: Duration,
    /// Consecutive fetch failures tolerated before giving up
    pub max_failures: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_failures: 3,
        }
    }
}

impl PollPolicy {
    pub fn new(interval: Duration, max_failures: u32) -> Self {
        Self {
            interval,
            max_failures: max_failures.max(1),
        }
    }

    /// Wait after the `failures`-th consecutive failed fetch
    pub fn failure_delay(&self, failures: u32) -> Duration {
        self.interval.saturating_mul(failures)
    }
}

/// Anything that can report the current status of a session
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, session_id: Uuid) -> Result<StatusView, ClientError>;
}

/// Receives every status observed while polling
pub trait ProgressReporter: Send + Sync {
    fn report(&self, status: &StatusView);

    /// Called after a failed fetch that will be retried
    fn fetch_failed(&self, _failures: u32, _error: &ClientError) {}
}

impl<F> ProgressReporter for F
where
    F: Fn(&StatusView) + Send + Sync,
{
    fn report(&self, status: &StatusView) {
        self(status)
    }
}

/// Reports progress through tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, status: &StatusView) {
        info!(
            session_id = %status.session_id,
            stage = %status.current_stage,
            progress = status.progress,
            "Job progress"
        );
    }

    fn fetch_failed(&self, failures: u32, error: &ClientError) {
        warn!(failures, "Status fetch failed: {}", error);
    }
}

/// Why polling ended without a completed job
#[derive(Debug, Error)]
pub enum PollError {
    /// Job reached the error state; carries the session's error record
    #[error("job failed at {}: {}", .0.stage, .0.message)]
    JobFailed(ErrorRecord),

    /// Too many consecutive fetch failures
    #[error("gave up polling after {attempts} consecutive failed status fetches; last failure: {last}")]
    Exhausted { attempts: u32, last: ClientError },

    /// Fetch failed for a reason other than transport (unknown session,
    /// credentials, unreadable response)
    #[error("status fetch rejected: {0}")]
    Rejected(ClientError),
}

impl PollError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PollError::JobFailed(record) => record.kind,
            PollError::Exhausted { last, .. } => last.kind(),
            PollError::Rejected(e) => e.kind(),
        }
    }
}

/// Polls a session until it completes or fails
#[derive(Debug, Clone, Default)]
pub struct StatusPoller {
    policy: PollPolicy,
}

impl StatusPoller {
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    /// Poll until `completed` (returns the final view) or `error`
    pub async fn poll_until_terminal<S, R>(
        &self,
        source: &S,
        session_id: Uuid,
        reporter: &R,
    ) -> Result<StatusView, PollError>
    where
        S: StatusSource + ?Sized,
        R: ProgressReporter + ?Sized,
    {
        let mut failures: u32 = 0;

        loop {
            let delay = match source.fetch_status(session_id).await {
                Ok(view) => {
                    failures = 0;
                    reporter.report(&view);
                    match view.status {
                        JobStatus::Completed => {
                            debug!(session_id = %session_id, "Job completed");
                            return Ok(view);
                        }
                        JobStatus::Error => {
                            let record = view.error.clone().unwrap_or_else(|| {
                                ErrorRecord::new(view.current_stage, ErrorKind::Internal)
                            });
                            return Err(PollError::JobFailed(record));
                        }
                        JobStatus::Processing => self.policy.interval,
                    }
                }
                Err(e) if !e.is_transport() => return Err(PollError::Rejected(e)),
                Err(e) => {
                    failures += 1;
                    if failures >= self.policy.max_failures {
                        return Err(PollError::Exhausted {
                            attempts: failures,
                            last: e,
                        });
                    }
                    reporter.fetch_failed(failures, &e);
                    self.policy.failure_delay(failures)
                }
            };

            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_delay_is_linear() {
        let policy = PollPolicy::new(Duration::from_millis(100), 3);
        assert_eq!(policy.failure_delay(1), Duration::from_millis(100));
        assert_eq!(policy.failure_delay(2), Duration::from_millis(200));
        assert_eq!(policy.failure_delay(3), Duration::from_millis(300));
    }

    #[test]
    fn test_zero_failure_cap_is_raised() {
        assert_eq!(PollPolicy::new(Duration::from_secs(1), 0).max_failures, 1);
    }

    #[test]
    fn test_policy_serde() {
        let policy: PollPolicy =
            serde_json::from_str(r#"{"interval_ms": 250, "max_failures": 5}"#).unwrap();
        assert_eq!(policy.interval, Duration::from_millis(250));
        assert_eq!(policy.max_failures, 5);
    }
}
