//! Idempotency management.
//!
//! Records the outcome of key-identified operations so retried calls
//! return the original result instead of re-executing side effects, and
//! detects conflicting replays of the same key with a different body.

pub mod manager;
pub mod store;

pub use manager::{hash_bytes, run_cleanup_worker, CheckOutcome, CommitOutcome, IdempotencyManager};
pub use store::{IdempotencyRecord, InsertOutcome, MemoryRecordStore, PgRecordStore, RecordStore, StoreError};
