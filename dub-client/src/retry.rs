//! Operation-level retry
//!
//! Wraps a single client call (submit, status, result download) in a fixed
//! schedule of waits. Failures whose kind is not retryable (`auth`,
//! `badInput`) end the schedule at once. Turning the schedule off leaves the
//! call sites unchanged: the wrapped operation simply runs once.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ClientError;

/// Fixed retry schedule for client operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySchedule {
    pub enabled: bool,
    /// Wait before each retry; the operation runs at most `delays.len() + 1` times
    #[serde(rename = "delays_ms", with = "delays_ms")]
    pub delays: Vec<Duration>,
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self {
            enabled: true,
            delays: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
        }
    }
}

impl RetrySchedule {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self {
            enabled: true,
            delays,
        }
    }

    /// Schedule that runs every operation exactly once
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Total attempts an operation may get
    pub fn max_attempts(&self) -> usize {
        if self.enabled {
            self.delays.len() + 1
        } else {
            1
        }
    }

    /// Run `operation` under this schedule
    ///
    /// Returns the first success, the first non-retryable failure, or the last
    /// failure once the schedule is used up.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = label, attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => {
                    if !self.enabled || !e.is_retryable() {
                        return Err(e);
                    }
                    let Some(delay) = self.delays.get(attempt - 1).copied() else {
                        warn!(operation = label, attempts = attempt, "Retries exhausted: {}", e);
                        return Err(e);
                    };
                    warn!(
                        operation = label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Operation failed ({}), retrying: {}",
                        e.kind(),
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

mod delays_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S: Serializer>(value: &Vec<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(value.iter().map(|d| d.as_millis() as u64))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Duration>, D::Error> {
        Vec::<u64>::deserialize(deserializer)
            .map(|ms| ms.into_iter().map(Duration::from_millis).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let schedule = RetrySchedule::default();
        assert!(schedule.enabled);
        assert_eq!(schedule.max_attempts(), 4);
        assert_eq!(RetrySchedule::disabled().max_attempts(), 1);
    }

    #[test]
    fn test_schedule_serde() {
        let schedule: RetrySchedule =
            serde_json::from_str(r#"{"enabled": false, "delays_ms": [10, 20]}"#).unwrap();
        assert!(!schedule.enabled);
        assert_eq!(
            schedule.delays,
            vec![Duration::from_millis(10), Duration::from_millis(20)]
        );
    }
}
