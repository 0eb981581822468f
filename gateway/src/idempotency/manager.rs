//! Idempotency Manager
//!
//! Check/commit discipline over a [`RecordStore`]. Two layers close the
//! check-then-act gap for concurrent requests carrying the same unseen
//! key: a per-key guard serializes the whole check → execute → commit
//! sequence so the operation runs once, and the store's atomic
//! conditional insert keeps the stored record unique even if a caller
//! bypasses the guard.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use super::store::{IdempotencyRecord, InsertOutcome, RecordStore, StoreError};

/// Outcome of a pre-execution check.
#[derive(Debug)]
pub enum CheckOutcome {
    /// Unknown key; execute the operation and commit afterward.
    Proceed,
    /// Known key, same body; return the cached record without executing.
    Replay(IdempotencyRecord),
    /// Known key, different body; reject with conflict semantics.
    Conflict { existing: IdempotencyRecord },
}

/// Outcome of a post-execution commit.
#[derive(Debug)]
pub enum CommitOutcome {
    /// This caller's record was stored.
    Stored(IdempotencyRecord),
    /// A racing commit with an identical body won; its record is canonical.
    RacedReplay(IdempotencyRecord),
    /// A racing commit with a different body won; conflict semantics apply.
    RacedConflict(IdempotencyRecord),
}

/// SHA-256 hex digest of a canonical byte serialization.
#[must_use]
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Manager enforcing at-most-once semantics for keyed operations.
pub struct IdempotencyManager {
    store: Arc<dyn RecordStore>,
    retention_hours: i64,
    key_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl IdempotencyManager {
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, retention_hours: i64) -> Self {
        Self {
            store,
            retention_hours,
            key_locks: DashMap::new(),
        }
    }

    /// Acquire the per-key guard serializing check → execute → commit.
    ///
    /// A caller handling a keyed request holds this guard for the whole
    /// sequence, so a racing duplicate waits here and then observes the
    /// committed record as a replay instead of executing the operation
    /// a second time.
    pub async fn lock_key(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .key_locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Pre-execution check for a keyed request body.
    pub async fn check(&self, key: &str, body: &[u8]) -> Result<CheckOutcome, StoreError> {
        let Some(existing) = self.store.get(key).await? else {
            return Ok(CheckOutcome::Proceed);
        };

        if existing.body_hash == hash_bytes(body) {
            Ok(CheckOutcome::Replay(existing))
        } else {
            Ok(CheckOutcome::Conflict { existing })
        }
    }

    /// Record the outcome of an executed operation.
    ///
    /// The stored record is never mutated: if another commit for the
    /// same key won the race, the winner's record is returned and this
    /// caller's outcome is discarded.
    pub async fn commit(
        &self,
        key: &str,
        body: &[u8],
        status: u16,
        result: &serde_json::Value,
    ) -> Result<CommitOutcome, StoreError> {
        let body_hash = hash_bytes(body);
        let result_bytes = serde_json::to_vec(result).unwrap_or_default();

        let record = IdempotencyRecord {
            key: key.to_string(),
            body_hash: body_hash.clone(),
            status: status as i16,
            result: result.clone(),
            result_hash: hash_bytes(&result_bytes),
            created_at: Utc::now(),
        };

        match self.store.insert_if_absent(record.clone()).await? {
            InsertOutcome::Inserted => Ok(CommitOutcome::Stored(record)),
            InsertOutcome::Existing(existing) if existing.body_hash == body_hash => {
                Ok(CommitOutcome::RacedReplay(existing))
            }
            InsertOutcome::Existing(existing) => Ok(CommitOutcome::RacedConflict(existing)),
        }
    }

    /// Remove records older than the retention horizon.
    pub async fn cleanup(&self) -> Result<u64, StoreError> {
        // Locks nobody holds are safe to drop; a held lock has a second
        // Arc alive in the guard holder.
        self.key_locks.retain(|_, lock| Arc::strong_count(lock) > 1);

        let horizon = Utc::now() - chrono::Duration::hours(self.retention_hours);
        self.store.delete_older_than(horizon).await
    }
}

/// Recurring cleanup worker; spawn from `main`, never per-request.
pub async fn run_cleanup_worker(manager: Arc<IdempotencyManager>, every: Duration) {
    info!(interval_secs = every.as_secs(), "Idempotency cleanup worker started");
    let mut interval = tokio::time::interval(every);
    // First tick fires immediately; skip it so startup is quiet.
    interval.tick().await;

    loop {
        interval.tick().await;
        match manager.cleanup().await {
            Ok(0) => {}
            Ok(removed) => info!(removed, "Expired idempotency records removed"),
            Err(e) => warn!(error = %e, "Idempotency cleanup failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idempotency::store::MemoryRecordStore;

    fn manager_with_store() -> (Arc<MemoryRecordStore>, IdempotencyManager) {
        let store = Arc::new(MemoryRecordStore::new());
        let manager = IdempotencyManager::new(store.clone(), 24);
        (store, manager)
    }

    #[tokio::test]
    async fn unknown_key_proceeds() {
        let (_, manager) = manager_with_store();
        let outcome = manager.check("k1", b"body").await.unwrap();
        assert!(matches!(outcome, CheckOutcome::Proceed));
    }

    #[tokio::test]
    async fn commit_then_check_replays_original_result() {
        let (_, manager) = manager_with_store();
        let result = serde_json::json!({"id": 7});

        manager.commit("k1", b"body", 201, &result).await.unwrap();

        match manager.check("k1", b"body").await.unwrap() {
            CheckOutcome::Replay(record) => {
                assert_eq!(record.status, 201);
                assert_eq!(record.result, result);
            }
            other => panic!("expected replay, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn same_key_different_body_is_conflict() {
        let (_, manager) = manager_with_store();
        let result = serde_json::json!({"id": 7});

        manager.commit("k1", b"body", 201, &result).await.unwrap();

        match manager.check("k1", b"other body").await.unwrap() {
            CheckOutcome::Conflict { existing } => assert_eq!(existing.status, 201),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn replayed_commit_never_refreshes_created_at() {
        let (store, manager) = manager_with_store();
        let result = serde_json::json!({"ok": true});

        manager.commit("k1", b"body", 200, &result).await.unwrap();
        let original = store.get("k1").await.unwrap().unwrap();

        // A retried commit with the identical body must reuse the
        // original record, not overwrite it.
        match manager.commit("k1", b"body", 200, &result).await.unwrap() {
            CommitOutcome::RacedReplay(record) => {
                assert_eq!(record.created_at, original.created_at);
            }
            other => panic!("expected raced replay, got {other:?}"),
        }

        let stored = store.get("k1").await.unwrap().unwrap();
        assert_eq!(stored.created_at, original.created_at);
    }

    #[tokio::test]
    async fn concurrent_commits_store_exactly_one_record() {
        let (store, manager) = manager_with_store();
        let manager = Arc::new(manager);
        let result = serde_json::json!({"n": 1});

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = manager.clone();
            let result = result.clone();
            handles.push(tokio::spawn(async move {
                manager.commit("k1", b"body", 201, &result).await.unwrap()
            }));
        }

        let mut stored = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), CommitOutcome::Stored(_)) {
                stored += 1;
            }
        }

        assert_eq!(stored, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn same_key_operation_executes_exactly_once() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let (store, manager) = manager_with_store();
        let manager = Arc::new(manager);
        let executions = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..2 {
            let manager = manager.clone();
            let executions = executions.clone();
            handles.push(tokio::spawn(async move {
                let _guard = manager.lock_key("k1").await;
                match manager.check("k1", b"body").await.unwrap() {
                    CheckOutcome::Proceed => {
                        // Suspension point standing in for the handler call.
                        tokio::task::yield_now().await;
                        executions.fetch_add(1, Ordering::SeqCst);
                        manager
                            .commit("k1", b"body", 201, &serde_json::json!({"n": 1}))
                            .await
                            .unwrap();
                    }
                    CheckOutcome::Replay(record) => assert_eq!(record.status, 201),
                    CheckOutcome::Conflict { .. } => panic!("bodies are identical"),
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn cleanup_honors_retention_horizon() {
        let (store, manager) = manager_with_store();

        let old = IdempotencyRecord {
            key: "old".to_string(),
            body_hash: "h".to_string(),
            status: 200,
            result: serde_json::json!({}),
            result_hash: "rh".to_string(),
            created_at: Utc::now() - chrono::Duration::hours(48),
        };
        store.insert_if_absent(old).await.unwrap();
        manager
            .commit("fresh", b"body", 200, &serde_json::json!({}))
            .await
            .unwrap();

        let removed = manager.cleanup().await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get("fresh").await.unwrap().is_some());
    }

    #[test]
    fn hash_is_stable_and_collision_sensitive() {
        assert_eq!(hash_bytes(b"abc"), hash_bytes(b"abc"));
        assert_ne!(hash_bytes(b"abc"), hash_bytes(b"abd"));
        assert_eq!(hash_bytes(b"abc").len(), 64);
    }
}
