// Event Deduplication Store port (outbox idempotency)

use crate::error::Result;
use async_trait::async_trait;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Tracks which event ids have been published
///
/// Shared by all transactions: implementations must tolerate concurrent reads
/// and idempotent concurrent writes.
#[async_trait]
pub trait EventDeduplicationStore: Send + Sync {
    /// Whether the event id was already published
    async fn is_event_published(&self, event_id: &str) -> Result<bool>;

    /// Mark the event id as published at `timestamp_ms`.
    ///
    /// Marking an id twice keeps the first timestamp.
    async fn mark_as_published(&self, event_id: &str, timestamp_ms: i64) -> Result<()>;

    /// Atomically claim the event id for publication at `timestamp_ms`
    ///
    /// # Returns
    /// `true` for the one caller that recorded the id, `false` if it was
    /// already present. Concurrent claims of the same id yield exactly one
    /// `true`.
    async fn try_mark_as_published(&self, event_id: &str, timestamp_ms: i64) -> Result<bool>;

    /// Forget a claimed id whose publication failed, so a later flush can retry it
    async fn release(&self, event_id: &str) -> Result<()>;

    /// Purge entries published strictly before `cutoff_ms`
    ///
    /// # Returns
    /// Number of entries deleted
    async fn delete_published_before(&self, cutoff_ms: i64) -> Result<u64>;

    /// Number of remembered event ids
    async fn published_count(&self) -> Result<u64>;
}

/// Process-local dedup store.
///
/// Limitation: entries only live as long as the process and until purged by
/// `delete_published_before`. A transaction retried after its event ids were
/// purged (or after a restart) can publish those events again. Use the
/// persistent store when that matters.
#[derive(Default)]
pub struct InMemoryEventDeduplicationStore {
    published: RwLock<HashMap<String, i64>>,
}

impl InMemoryEventDeduplicationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventDeduplicationStore for InMemoryEventDeduplicationStore {
    async fn is_event_published(&self, event_id: &str) -> Result<bool> {
        Ok(self.published.read().await.contains_key(event_id))
    }

    async fn mark_as_published(&self, event_id: &str, timestamp_ms: i64) -> Result<()> {
        self.published
            .write()
            .await
            .entry(event_id.to_string())
            .or_insert(timestamp_ms);
        Ok(())
    }

    async fn try_mark_as_published(&self, event_id: &str, timestamp_ms: i64) -> Result<bool> {
        match self.published.write().await.entry(event_id.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(timestamp_ms);
                Ok(true)
            }
        }
    }

    async fn release(&self, event_id: &str) -> Result<()> {
        self.published.write().await.remove(event_id);
        Ok(())
    }

    async fn delete_published_before(&self, cutoff_ms: i64) -> Result<u64> {
        let mut published = self.published.write().await;
        let before = published.len();
        published.retain(|_, published_at| *published_at >= cutoff_ms);
        let deleted = (before - published.len()) as u64;
        debug!(deleted, cutoff_ms, "Purged published event ids");
        Ok(deleted)
    }

    async fn published_count(&self) -> Result<u64> {
        Ok(self.published.read().await.len() as u64)
    }
}

/// Dedup store that never remembers anything (repeated-publish test scenarios)
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpEventDeduplicationStore;

#[async_trait]
impl EventDeduplicationStore for NoOpEventDeduplicationStore {
    async fn is_event_published(&self, _event_id: &str) -> Result<bool> {
        Ok(false)
    }

    async fn mark_as_published(&self, _event_id: &str, _timestamp_ms: i64) -> Result<()> {
        Ok(())
    }

    async fn try_mark_as_published(&self, _event_id: &str, _timestamp_ms: i64) -> Result<bool> {
        Ok(true)
    }

    async fn release(&self, _event_id: &str) -> Result<()> {
        Ok(())
    }

    async fn delete_published_before(&self, _cutoff_ms: i64) -> Result<u64> {
        Ok(0)
    }

    async fn published_count(&self) -> Result<u64> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_mark_is_idempotent() {
        let store = InMemoryEventDeduplicationStore::new();
        assert!(!store.is_event_published("e1").await.unwrap());

        store.mark_as_published("e1", 1000).await.unwrap();
        let after_first = store.published_count().await.unwrap();
        store.mark_as_published("e1", 2000).await.unwrap();

        assert_eq!(store.published_count().await.unwrap(), after_first);
        assert_eq!(after_first, 1);
        assert!(store.is_event_published("e1").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_published_before_keeps_first_timestamp() {
        let store = InMemoryEventDeduplicationStore::new();
        store.mark_as_published("old", 1000).await.unwrap();
        store.mark_as_published("old", 9000).await.unwrap(); // ignored
        store.mark_as_published("new", 5000).await.unwrap();

        let deleted = store.delete_published_before(5000).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(!store.is_event_published("old").await.unwrap());
        assert!(store.is_event_published("new").await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_marks() {
        let store = Arc::new(InMemoryEventDeduplicationStore::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .mark_as_published(&format!("e{}", i % 4), i)
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.published_count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_concurrent_claims_have_one_winner() {
        let store = Arc::new(InMemoryEventDeduplicationStore::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.try_mark_as_published("same", i).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(store.published_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_released_claim_can_be_taken_again() {
        let store = InMemoryEventDeduplicationStore::new();
        assert!(tokio_test::assert_ok!(store.try_mark_as_published("e1", 1000).await));
        assert!(!tokio_test::assert_ok!(store.try_mark_as_published("e1", 2000).await));

        tokio_test::assert_ok!(store.release("e1").await);
        assert!(!store.is_event_published("e1").await.unwrap());
        assert!(tokio_test::assert_ok!(store.try_mark_as_published("e1", 3000).await));
    }

    #[tokio::test]
    async fn test_noop_never_reports_published() {
        let store = NoOpEventDeduplicationStore;
        assert!(store.try_mark_as_published("e1", 1000).await.unwrap());
        assert!(store.try_mark_as_published("e1", 1000).await.unwrap());
        store.mark_as_published("e1", 1000).await.unwrap();
        assert!(!store.is_event_published("e1").await.unwrap());
        assert_eq!(store.published_count().await.unwrap(), 0);
    }
}
