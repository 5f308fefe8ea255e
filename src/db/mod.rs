pub mod memory_repository;
pub mod thread_repository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::AppError;
use crate::models::ThreadRecord;

pub use memory_repository::MemoryThreadRepository;
pub use thread_repository::ThreadRepository;

/// Persistence for chat threads. Records expire a fixed time after
/// creation; expired records are never returned even before they are purged.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Inserts or fully replaces the record with the same id.
    async fn upsert(&self, record: &ThreadRecord) -> Result<(), AppError>;

    /// Live records, newest first.
    async fn find_all(&self) -> Result<Vec<ThreadRecord>, AppError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<ThreadRecord>, AppError>;

    /// Returns whether a record was removed.
    async fn delete(&self, id: &str) -> Result<bool, AppError>;

    /// Removes expired records, returning how many went.
    async fn purge_expired(&self) -> Result<u64, AppError>;
}

/// Records created at or before the returned instant are expired.
pub fn expiry_cutoff(now: DateTime<Utc>, ttl: chrono::Duration) -> DateTime<Utc> {
    now - ttl
}
