// Per-attempt transaction context (pending outbox events)

use crate::domain::event::DomainEvent;
use tracing::debug;

/// Context owned by exactly one transaction attempt.
///
/// Carries the pending domain events in enqueue order. Adapters receive it by
/// shared reference; only the owning attempt mutates it.
#[derive(Debug)]
pub struct TransactionEventContext {
    transaction_id: String,
    attempt: u32,
    workflow_id: Option<String>,
    pending_events: Vec<DomainEvent>,
    cleared: bool,
}

impl TransactionEventContext {
    pub fn new(transaction_id: impl Into<String>, attempt: u32, workflow_id: Option<String>) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            attempt,
            workflow_id,
            pending_events: Vec::new(),
            cleared: false,
        }
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    /// 1-based attempt number
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn workflow_id(&self) -> Option<&str> {
        self.workflow_id.as_deref()
    }

    /// Append an event (publish order == enqueue order)
    pub fn add_event(&mut self, event: DomainEvent) {
        self.pending_events.push(event);
    }

    pub fn pending_events(&self) -> &[DomainEvent] {
        &self.pending_events
    }

    pub fn pending_count(&self) -> usize {
        self.pending_events.len()
    }

    pub fn has_pending_events(&self) -> bool {
        !self.pending_events.is_empty()
    }

    /// Drop all pending events, returning how many were discarded.
    ///
    /// The attempt clears its context once; later calls are no-ops.
    pub fn clear(&mut self) -> usize {
        if self.cleared {
            debug!(
                transaction_id = %self.transaction_id,
                attempt = self.attempt,
                "Event context already cleared"
            );
            return 0;
        }
        self.cleared = true;
        let count = self.pending_events.len();
        self.pending_events.clear();
        count
    }

    pub fn is_cleared(&self) -> bool {
        self.cleared
    }
}
