// Cache invalidation adapter

use crate::application::constants::CACHE_ADAPTER_PRIORITY;
use crate::domain::{DomainEvent, TransactionEventContext, TransactionPhase};
use crate::error::Result;
use crate::port::{CacheInvalidator, TransactionAdapter};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Maps a committed event to the cache keys it makes stale
pub type CacheKeyMapper = Arc<dyn Fn(&DomainEvent) -> Vec<String> + Send + Sync>;

/// Evicts cache keys derived from the committed events
pub struct CacheInvalidationAdapter {
    invalidator: Arc<dyn CacheInvalidator>,
    key_mapper: CacheKeyMapper,
}

impl CacheInvalidationAdapter {
    pub fn new(invalidator: Arc<dyn CacheInvalidator>, key_mapper: CacheKeyMapper) -> Self {
        Self {
            invalidator,
            key_mapper,
        }
    }

    /// Keys for all pending events, first occurrence order, no duplicates
    fn keys_for(&self, context: &TransactionEventContext) -> Vec<String> {
        let mut seen = HashSet::new();
        context
            .pending_events()
            .iter()
            .flat_map(|event| (self.key_mapper)(event))
            .filter(|key| seen.insert(key.clone()))
            .collect()
    }
}

#[async_trait]
impl TransactionAdapter for CacheInvalidationAdapter {
    fn name(&self) -> &str {
        "cache-invalidation"
    }

    fn priority(&self) -> i32 {
        CACHE_ADAPTER_PRIORITY
    }

    async fn on_phase(&self, phase: TransactionPhase, context: &TransactionEventContext) -> Result<()> {
        if phase != TransactionPhase::AfterCommit {
            return Ok(());
        }

        let keys = self.keys_for(context);
        if keys.is_empty() {
            return Ok(());
        }

        debug!(
            transaction_id = %context.transaction_id(),
            keys = keys.len(),
            "Invalidating cache keys"
        );
        self.invalidator.invalidate(&keys).await
    }
}
