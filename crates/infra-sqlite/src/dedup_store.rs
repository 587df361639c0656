// SQLite EventDeduplicationStore Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;
use txflow_core::error::Result;
use txflow_core::port::EventDeduplicationStore;

/// Persistent dedup store (`published_events` table)
///
/// Survives restarts, so a transaction retried later still skips events it
/// already published as long as the id is within the retention window.
#[derive(Clone)]
pub struct SqliteEventDeduplicationStore {
    pool: SqlitePool,
}

impl SqliteEventDeduplicationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventDeduplicationStore for SqliteEventDeduplicationStore {
    async fn is_event_published(&self, event_id: &str) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM published_events WHERE event_id = ?")
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        Ok(found.is_some())
    }

    async fn mark_as_published(&self, event_id: &str, timestamp_ms: i64) -> Result<()> {
        // First writer wins: a re-mark keeps the original timestamp
        sqlx::query("INSERT OR IGNORE INTO published_events (event_id, published_at) VALUES (?, ?)")
            .bind(event_id)
            .bind(timestamp_ms)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn try_mark_as_published(&self, event_id: &str, timestamp_ms: i64) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO published_events (event_id, published_at) VALUES (?, ?)",
        )
        .bind(event_id)
        .bind(timestamp_ms)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, event_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM published_events WHERE event_id = ?")
            .bind(event_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn delete_published_before(&self, cutoff_ms: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM published_events WHERE published_at < ?")
            .bind(cutoff_ms)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        debug!(deleted = result.rows_affected(), cutoff_ms, "Purged published event ids");
        Ok(result.rows_affected())
    }

    async fn published_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM published_events")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(count as u64)
    }
}
