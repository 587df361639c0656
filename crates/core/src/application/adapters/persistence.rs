// Persistence bookkeeping adapter

use crate::application::constants::PERSISTENCE_ADAPTER_PRIORITY;
use crate::domain::{TransactionEventContext, TransactionPhase};
use crate::error::Result;
use crate::port::TransactionAdapter;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Observes every phase first; commit and rollback themselves are done by the
/// transactional store
#[derive(Default)]
pub struct PersistenceAdapter {
    counters: Mutex<HashMap<TransactionPhase, u64>>,
}

impl PersistenceAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// How often `phase` has fired
    pub fn phase_count(&self, phase: TransactionPhase) -> u64 {
        self.counters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&phase)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl TransactionAdapter for PersistenceAdapter {
    fn name(&self) -> &str {
        "persistence"
    }

    fn priority(&self) -> i32 {
        PERSISTENCE_ADAPTER_PRIORITY
    }

    async fn on_phase(&self, phase: TransactionPhase, context: &TransactionEventContext) -> Result<()> {
        *self
            .counters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(phase)
            .or_insert(0) += 1;

        debug!(
            transaction_id = %context.transaction_id(),
            attempt = context.attempt(),
            phase = %phase,
            pending_events = context.pending_count(),
            "Persistence phase"
        );
        Ok(())
    }
}
