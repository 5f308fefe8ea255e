use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::db::{TranscriptStore, expiry_cutoff};
use crate::errors::AppError;
use crate::models::ThreadRecord;

/// Process-local [`TranscriptStore`], used when no database is configured.
#[derive(Clone)]
pub struct MemoryThreadRepository {
    threads: Arc<RwLock<HashMap<String, ThreadRecord>>>,
    ttl: chrono::Duration,
}

impl MemoryThreadRepository {
    pub fn new(ttl: chrono::Duration) -> Self {
        Self { threads: Arc::new(RwLock::new(HashMap::new())), ttl }
    }

    fn is_live(&self, record: &ThreadRecord) -> bool {
        record.created_at > expiry_cutoff(Utc::now(), self.ttl)
    }
}

#[async_trait]
impl TranscriptStore for MemoryThreadRepository {
    async fn upsert(&self, record: &ThreadRecord) -> Result<(), AppError> {
        let mut threads = self.threads.write().await;
        threads.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn find_all(&self) -> Result<Vec<ThreadRecord>, AppError> {
        let threads = self.threads.read().await;
        let mut live: Vec<ThreadRecord> =
            threads.values().filter(|r| self.is_live(r)).cloned().collect();
        live.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(live)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ThreadRecord>, AppError> {
        let threads = self.threads.read().await;
        Ok(threads.get(id).filter(|r| self.is_live(r)).cloned())
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let mut threads = self.threads.write().await;
        Ok(threads.remove(id).is_some())
    }

    async fn purge_expired(&self) -> Result<u64, AppError> {
        let mut threads = self.threads.write().await;
        let before = threads.len();
        threads.retain(|_, r| r.created_at > expiry_cutoff(Utc::now(), self.ttl));
        Ok((before - threads.len()) as u64)
    }
}
