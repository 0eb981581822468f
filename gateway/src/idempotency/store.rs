//! Idempotency Record Stores
//!
//! Pluggable persistence behind the manager. The contract every backend
//! must honor: `insert_if_absent` is atomic, so two racing commits for
//! the same key store exactly one record.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;

/// Outcome of a key-identified operation. Immutable once created;
/// removed only by time-based cleanup.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IdempotencyRecord {
    pub key: String,
    pub body_hash: String,
    pub status: i16,
    pub result: serde_json::Value,
    pub result_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The conditional insert neither stored a row nor found a winner
    /// within the retry budget.
    #[error("conditional insert for key {0} did not settle")]
    Unsettled(String),
}

/// Result of an atomic conditional insert.
#[derive(Debug)]
pub enum InsertOutcome {
    /// The record was stored; this caller won the key.
    Inserted,
    /// A record already existed; the original is returned untouched.
    Existing(IdempotencyRecord),
}

/// Pluggable record persistence.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert the record only if the key is absent. Must be atomic.
    async fn insert_if_absent(&self, record: IdempotencyRecord) -> Result<InsertOutcome, StoreError>;

    /// Look up a record by key.
    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>, StoreError>;

    /// Remove records created before `horizon`, returning the count.
    async fn delete_older_than(&self, horizon: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// In-memory store for single-process development and tests.
/// Lost on restart.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: DashMap<String, IdempotencyRecord>,
}

impl MemoryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records (test visibility).
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert_if_absent(&self, record: IdempotencyRecord) -> Result<InsertOutcome, StoreError> {
        use dashmap::mapref::entry::Entry;

        // DashMap's entry API holds the shard lock across the check and
        // the insert, which makes the conditional insert atomic.
        match self.records.entry(record.key.clone()) {
            Entry::Occupied(existing) => Ok(InsertOutcome::Existing(existing.get().clone())),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>, StoreError> {
        Ok(self.records.get(key).map(|r| r.clone()))
    }

    async fn delete_older_than(&self, horizon: DateTime<Utc>) -> Result<u64, StoreError> {
        let before = self.records.len();
        self.records.retain(|_, record| record.created_at >= horizon);
        Ok((before - self.records.len()) as u64)
    }
}

/// Durable store over Postgres, usable across multiple gateway
/// instances. The unique key constraint makes the conditional insert
/// atomic.
#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn insert_if_absent(&self, record: IdempotencyRecord) -> Result<InsertOutcome, StoreError> {
        // Cleanup can delete the winning row between the conflicting
        // insert and the follow-up read, so a miss retries the insert
        // instead of claiming the record was stored.
        for _ in 0..2 {
            let result = sqlx::query(
                r"
                INSERT INTO idempotency_records (key, body_hash, status, result, result_hash, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (key) DO NOTHING
                ",
            )
            .bind(&record.key)
            .bind(&record.body_hash)
            .bind(record.status)
            .bind(&record.result)
            .bind(&record.result_hash)
            .bind(record.created_at)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 1 {
                return Ok(InsertOutcome::Inserted);
            }

            // Lost the insert race; surface the winner's record.
            if let Some(existing) = self.get(&record.key).await? {
                return Ok(InsertOutcome::Existing(existing));
            }
        }

        Err(StoreError::Unsettled(record.key))
    }

    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>, StoreError> {
        let record = sqlx::query_as::<_, IdempotencyRecord>(
            r"
            SELECT key, body_hash, status, result, result_hash, created_at
            FROM idempotency_records
            WHERE key = $1
            ",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn delete_older_than(&self, horizon: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM idempotency_records WHERE created_at < $1")
            .bind(horizon)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
