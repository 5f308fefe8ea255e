use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::{error, info};

use crate::db::{TranscriptStore, expiry_cutoff};
use crate::errors::AppError;
use crate::models::{ChatTurn, ThreadRecord};

/// Postgres-backed [`TranscriptStore`]; each thread is one row holding its
/// messages as a JSONB array.
#[derive(Clone)]
pub struct ThreadRepository {
    pool: PgPool,
    ttl: chrono::Duration,
}

impl ThreadRepository {
    pub fn new(pool: PgPool, ttl: chrono::Duration) -> Self {
        Self { pool, ttl }
    }

    /// Makes sure expiry scans hit an index on `created_at`.
    pub async fn ensure_expiry_index(&self) -> Result<(), AppError> {
        sqlx::query("CREATE INDEX IF NOT EXISTS threads_created_at_idx ON threads (created_at)")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to create expiry index: {e}");
                AppError::db_query("Failed to create expiry index", e)
            })?;
        info!(ttl_days = self.ttl.num_days(), "Thread expiry index in place");
        Ok(())
    }

    fn from_row(row: PgRow) -> Result<ThreadRecord, AppError> {
        let messages: Json<Vec<ChatTurn>> = row
            .try_get("messages")
            .map_err(|e| AppError::db_query("Failed to read messages", e))?;
        Ok(ThreadRecord {
            id: row.try_get("id").map_err(|e| AppError::db_query("Failed to read id", e))?,
            created_at: row
                .try_get("created_at")
                .map_err(|e| AppError::db_query("Failed to read created_at", e))?,
            updated_at: row
                .try_get("updated_at")
                .map_err(|e| AppError::db_query("Failed to read updated_at", e))?,
            assistant_thread_id: row
                .try_get("assistant_thread_id")
                .map_err(|e| AppError::db_query("Failed to read assistant_thread_id", e))?,
            messages: messages.0,
        })
    }
}

#[async_trait]
impl TranscriptStore for ThreadRepository {
    async fn upsert(&self, record: &ThreadRecord) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO threads (id, created_at, updated_at, assistant_thread_id, messages)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (id) DO UPDATE
             SET updated_at = EXCLUDED.updated_at,
                 assistant_thread_id = EXCLUDED.assistant_thread_id,
                 messages = EXCLUDED.messages",
        )
        .bind(&record.id)
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(&record.assistant_thread_id)
        .bind(Json(&record.messages))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to save thread {}: {e}", record.id);
            AppError::db_query("Failed to save thread", e)
        })?;
        Ok(())
    }

    async fn find_all(&self) -> Result<Vec<ThreadRecord>, AppError> {
        let rows = sqlx::query(
            "SELECT id, created_at, updated_at, assistant_thread_id, messages
             FROM threads
             WHERE created_at > $1
             ORDER BY created_at DESC",
        )
        .bind(expiry_cutoff(Utc::now(), self.ttl))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to fetch all threads: {e}");
            AppError::db_query("Failed to fetch threads", e)
        })?;

        rows.into_iter().map(Self::from_row).collect()
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ThreadRecord>, AppError> {
        let row = sqlx::query(
            "SELECT id, created_at, updated_at, assistant_thread_id, messages
             FROM threads
             WHERE id = $1 AND created_at > $2",
        )
        .bind(id)
        .bind(expiry_cutoff(Utc::now(), self.ttl))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to find thread {id}: {e}");
            AppError::db_query(format!("Failed to find thread {id}"), e)
        })?;

        row.map(Self::from_row).transpose()
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM threads WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to delete thread {id}: {e}");
                AppError::db_query(format!("Failed to delete thread {id}"), e)
            })?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired(&self) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM threads WHERE created_at <= $1")
            .bind(expiry_cutoff(Utc::now(), self.ttl))
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to purge expired threads: {e}");
                AppError::db_query("Failed to purge expired threads", e)
            })?;
        Ok(result.rows_affected())
    }
}
