//! Event types and in-process event bus
//!
//! Provides the push-style view of job progress. The pull-based status contract
//! stays authoritative; events are a best-effort notification stream for SSE
//! subscribers and logging.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::stage::Stage;
use crate::taxonomy::{ErrorKind, ErrorRecord};

/// Job lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DubEvent {
    /// Session accepted and queued
    SessionCreated {
        session_id: Uuid,
        target_language: String,
        timestamp: DateTime<Utc>,
    },

    /// Session entered a processing stage
    StageStarted {
        session_id: Uuid,
        stage: Stage,
        progress: u8,
        timestamp: DateTime<Utc>,
    },

    /// Stage failed with a retryable error and will be re-invoked
    StageRetrying {
        session_id: Uuid,
        stage: Stage,
        attempt: u32,
        kind: ErrorKind,
        delay_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Session reached `completed`
    SessionCompleted {
        session_id: Uuid,
        duration_seconds: Option<f64>,
        timestamp: DateTime<Utc>,
    },

    /// Session reached `failed`
    SessionFailed {
        session_id: Uuid,
        error: ErrorRecord,
        timestamp: DateTime<Utc>,
    },
}

impl DubEvent {
    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            DubEvent::SessionCreated { .. } => "SessionCreated",
            DubEvent::StageStarted { .. } => "StageStarted",
            DubEvent::StageRetrying { .. } => "StageRetrying",
            DubEvent::SessionCompleted { .. } => "SessionCompleted",
            DubEvent::SessionFailed { .. } => "SessionFailed",
        }
    }

    /// Session the event belongs to
    pub fn session_id(&self) -> Uuid {
        match self {
            DubEvent::SessionCreated { session_id, .. }
            | DubEvent::StageStarted { session_id, .. }
            | DubEvent::StageRetrying { session_id, .. }
            | DubEvent::SessionCompleted { session_id, .. }
            | DubEvent::SessionFailed { session_id, .. } => *session_id,
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// Wraps `tokio::sync::broadcast`:
/// - Non-blocking publish (slow subscribers never block the orchestrator)
/// - Multiple concurrent subscribers
/// - Lagging subscribers lose the oldest events rather than stalling producers
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DubEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<DubEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring the no-subscriber case
    pub fn emit_lossy(&self, event: DubEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("No subscribers for event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_emitted_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        let id = Uuid::new_v4();

        bus.emit_lossy(DubEvent::StageStarted {
            session_id: id,
            stage: Stage::Download,
            progress: 0,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.session_id(), id);
        assert_eq!(event.event_type(), "StageStarted");
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_dropped() {
        let bus = EventBus::new(4);
        bus.emit_lossy(DubEvent::SessionCompleted {
            session_id: Uuid::new_v4(),
            duration_seconds: None,
            timestamp: Utc::now(),
        });

        // Late subscribers only see events emitted after they joined
        let mut rx = bus.subscribe();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = DubEvent::StageRetrying {
            session_id: Uuid::nil(),
            stage: Stage::Translate,
            attempt: 2,
            kind: ErrorKind::Network,
            delay_ms: 1000,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "StageRetrying");
        assert_eq!(json["stage"], "translate");
        assert_eq!(json["kind"], "network");
    }
}
