//! Backoff policy
//!
//! Named configuration for capped exponential backoff, used by the pipeline's
//! stage-level retry. Durations are (de)serialized as milliseconds so the policy
//! can be written directly in TOML:
//!
//! ```toml
//! [pipeline.stage_retry]
//! base_delay_ms = 500
//! multiplier = 2.0
//! max_delay_ms = 8000
//! max_retries = 3
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Capped exponential backoff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    #[serde(rename = "base_delay_ms", with = "duration_ms")]
    pub base_delay: Duration,
    /// Growth factor applied per retry
    pub multiplier: f64,
    /// Upper bound on any single delay
    #[serde(rename = "max_delay_ms", with = "duration_ms")]
    pub max_delay: Duration,
    /// Retries allowed after the first attempt (`max_retries + 1` attempts total)
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(8),
            max_retries: 3,
        }
    }
}

impl BackoffPolicy {
    /// Policy with millisecond delays and no growth, for tests and tooling
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            base_delay: Duration::from_millis(1),
            multiplier: 1.0,
            max_delay: Duration::from_millis(1),
            max_retries,
        }
    }

    /// Delay to wait before retry number `retry` (1-based)
    ///
    /// `base * multiplier^(retry-1)`, clamped to `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(32) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        let millis = self.base_delay.as_millis() as f64 * factor;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Serde helper: `Duration` as integer milliseconds
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
