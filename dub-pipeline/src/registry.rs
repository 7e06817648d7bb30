//! Session registry
//!
//! Process-wide map from session id to session record. Readers always get a
//! consistent snapshot. Writes go through a [`SessionWriter`], and at most one
//! writer may exist per session at a time: the orchestrator task that claimed it.

use chrono::{Duration as ChronoDuration, Utc};
use dub_common::api::SubmitRequest;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{JobParams, Session};

/// Registry failures
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Session not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid submission: {0}")]
    BadInput(String),

    #[error("Session {0} already has an active writer")]
    AlreadyClaimed(Uuid),
}

struct SessionEntry {
    record: RwLock<Session>,
    claimed: AtomicBool,
}

/// In-memory store of all sessions
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<SessionEntry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a submission and store a new queued session
    ///
    /// Returns a snapshot of the created session. Nothing is stored when
    /// validation fails.
    pub async fn create(&self, request: &SubmitRequest) -> Result<Session, RegistryError> {
        let params = JobParams::from_request(request).map_err(|e| match e {
            dub_common::Error::InvalidInput(msg) => RegistryError::BadInput(msg),
            other => RegistryError::BadInput(other.to_string()),
        })?;
        let session = Session::new(params);
        let snapshot = session.clone();

        let entry = Arc::new(SessionEntry {
            record: RwLock::new(session),
            claimed: AtomicBool::new(false),
        });
        self.sessions.write().await.insert(snapshot.id, entry);

        info!(
            session_id = %snapshot.id,
            target_language = %snapshot.target_language,
            "Session created"
        );
        Ok(snapshot)
    }

    /// Consistent snapshot of one session
    pub async fn get(&self, id: Uuid) -> Result<Session, RegistryError> {
        let entry = self.entry(id).await?;
        let snapshot = entry.record.read().await.clone();
        Ok(snapshot)
    }

    /// Take exclusive write access to a session
    ///
    /// Fails with [`RegistryError::AlreadyClaimed`] while another writer is
    /// alive. The claim is released when the writer is dropped.
    pub async fn claim(&self, id: Uuid) -> Result<SessionWriter, RegistryError> {
        let entry = self.entry(id).await?;
        if entry
            .claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RegistryError::AlreadyClaimed(id));
        }
        debug!(session_id = %id, "Session claimed");
        Ok(SessionWriter { id, entry })
    }

    /// Remove terminal sessions that finished more than `retention` ago
    ///
    /// Sessions with a live writer are never evicted. Each record is inspected
    /// without holding the index lock; the index is locked only to remove the
    /// expired ids. Returns the number removed.
    pub async fn evict_terminal(&self, retention: Duration) -> usize {
        let retention =
            ChronoDuration::from_std(retention).unwrap_or_else(|_| ChronoDuration::weeks(5200));
        let Some(cutoff) = Utc::now().checked_sub_signed(retention) else {
            return 0;
        };

        let entries: Vec<(Uuid, Arc<SessionEntry>)> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, entry)| (*id, Arc::clone(entry)))
            .collect();

        let mut expired = Vec::new();
        for (id, entry) in entries {
            if entry.claimed.load(Ordering::Acquire) {
                continue;
            }
            let session = entry.record.read().await;
            let finished_before_cutoff = session.completed_at.is_some_and(|done| done <= cutoff);
            if session.is_terminal() && finished_before_cutoff {
                expired.push(id);
            }
        }
        if expired.is_empty() {
            return 0;
        }

        let mut sessions = self.sessions.write().await;
        let mut removed = 0;
        for id in expired {
            // A writer may have claimed the session since it was inspected
            let unclaimed = matches!(
                sessions.get(&id),
                Some(entry) if !entry.claimed.load(Ordering::Acquire)
            );
            if unclaimed {
                sessions.remove(&id);
                removed += 1;
                debug!(session_id = %id, "Session evicted");
            }
        }
        removed
    }

    /// Number of sessions not yet terminal
    pub async fn active_count(&self) -> usize {
        let entries: Vec<Arc<SessionEntry>> =
            self.sessions.read().await.values().cloned().collect();
        let mut active = 0;
        for entry in entries {
            if !entry.record.read().await.is_terminal() {
                active += 1;
            }
        }
        active
    }

    /// Number of stored sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    async fn entry(&self, id: Uuid) -> Result<Arc<SessionEntry>, RegistryError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(RegistryError::NotFound(id))
    }
}

/// Exclusive write handle to one session
pub struct SessionWriter {
    id: Uuid,
    entry: Arc<SessionEntry>,
}

impl SessionWriter {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Apply a mutation atomically with respect to readers
    pub async fn mutate<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut session = self.entry.record.write().await;
        f(&mut session)
    }

    /// Current state as seen by this writer
    pub async fn snapshot(&self) -> Session {
        self.entry.record.read().await.clone()
    }
}

impl Drop for SessionWriter {
    fn drop(&mut self) {
        self.entry.claimed.store(false, Ordering::Release);
        debug!(session_id = %self.id, "Session released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dub_common::{ErrorKind, ErrorRecord, Stage};

    fn request() -> SubmitRequest {
        SubmitRequest::new("https://www.youtube.com/watch?v=abc", "French")
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let registry = SessionRegistry::new();
        let created = registry.create(&request()).await.unwrap();
        assert_eq!(created.stage, Stage::Queued);
        assert_eq!(created.target_language, "french");

        let fetched = registry.get(created.id).await.unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_invalid_submission_stores_nothing() {
        let registry = SessionRegistry::new();
        let result = registry
            .create(&SubmitRequest::new("", "spanish"))
            .await;
        assert!(matches!(result, Err(RegistryError::BadInput(_))));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        assert!(matches!(registry.get(id).await, Err(RegistryError::NotFound(x)) if x == id));
        assert!(matches!(registry.claim(id).await, Err(RegistryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_single_writer() {
        let registry = SessionRegistry::new();
        let id = registry.create(&request()).await.unwrap().id;

        let writer = registry.claim(id).await.unwrap();
        assert!(matches!(
            registry.claim(id).await,
            Err(RegistryError::AlreadyClaimed(_))
        ));

        drop(writer);
        assert!(registry.claim(id).await.is_ok());
    }

    #[tokio::test]
    async fn test_mutation_visible_to_readers() {
        let registry = SessionRegistry::new();
        let id = registry.create(&request()).await.unwrap().id;
        let writer = registry.claim(id).await.unwrap();

        writer
            .mutate(|s| s.enter_stage(Stage::Download))
            .await
            .unwrap();
        let snapshot = registry.get(id).await.unwrap();
        assert_eq!(snapshot.stage, Stage::Download);
        assert_eq!(writer.snapshot().await.stage, Stage::Download);
    }

    #[tokio::test]
    async fn test_evict_only_expired_terminal_sessions() {
        let registry = SessionRegistry::new();
        let running = registry.create(&request()).await.unwrap().id;
        let failed = registry.create(&request()).await.unwrap().id;

        {
            let writer = registry.claim(failed).await.unwrap();
            writer
                .mutate(|s| s.fail(ErrorRecord::new(Stage::Download, ErrorKind::BadInput)))
                .await
                .unwrap();
        }

        assert_eq!(registry.evict_terminal(Duration::from_secs(3600)).await, 0);
        assert_eq!(registry.active_count().await, 1);

        assert_eq!(registry.evict_terminal(Duration::ZERO).await, 1);
        assert!(registry.get(failed).await.is_err());
        assert!(registry.get(running).await.is_ok());
    }

    #[tokio::test]
    async fn test_sweep_does_not_block_unrelated_sessions() {
        let registry = Arc::new(SessionRegistry::new());
        let stuck = registry.create(&request()).await.unwrap().id;
        let other = registry.create(&request()).await.unwrap().id;
        {
            let writer = registry.claim(stuck).await.unwrap();
            writer
                .mutate(|s| s.fail(ErrorRecord::new(Stage::Download, ErrorKind::Network)))
                .await
                .unwrap();
        }

        // Hold one session's record lock for the whole sweep
        let entry = registry.entry(stuck).await.unwrap();
        let guard = entry.record.write().await;

        let sweeper = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.evict_terminal(Duration::ZERO).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let limit = Duration::from_millis(200);
        let read = tokio::time::timeout(limit, registry.get(other)).await;
        assert!(matches!(read, Ok(Ok(_))), "read of another session waited on the sweep");
        let created = tokio::time::timeout(limit, registry.create(&request())).await;
        assert!(matches!(created, Ok(Ok(_))), "create waited on the sweep");
        assert!(!sweeper.is_finished());

        drop(guard);
        assert_eq!(sweeper.await.unwrap(), 1);
        assert!(registry.get(stuck).await.is_err());
        assert!(registry.get(other).await.is_ok());
    }
}
