// Events adapter - handler validation before commit, deduplicated publish after

use crate::application::constants::EVENTS_ADAPTER_PRIORITY;
use crate::domain::{TransactionEventContext, TransactionPhase};
use crate::error::{Result, TxError};
use crate::port::{
    EventDeduplicationStore, EventHandlerRegistry, EventPublisher, TimeProvider, TransactionAdapter,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outbox adapter
///
/// BEFORE_COMMIT_VALIDATION rejects events nobody handles. AFTER_COMMIT
/// publishes pending events in enqueue order. Each id is claimed in the dedup
/// store before it is published; a failed publish releases the claim.
pub struct EventsAdapter {
    handlers: Arc<dyn EventHandlerRegistry>,
    publisher: Arc<dyn EventPublisher>,
    dedup_store: Arc<dyn EventDeduplicationStore>,
    time_provider: Arc<dyn TimeProvider>,
}

impl EventsAdapter {
    pub fn new(
        handlers: Arc<dyn EventHandlerRegistry>,
        publisher: Arc<dyn EventPublisher>,
        dedup_store: Arc<dyn EventDeduplicationStore>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            handlers,
            publisher,
            dedup_store,
            time_provider,
        }
    }

    fn validate_handlers(&self, context: &TransactionEventContext) -> Result<()> {
        let missing: Vec<&str> = context
            .pending_events()
            .iter()
            .filter(|e| !self.handlers.has_handler(&e.event_type))
            .map(|e| e.event_type.as_str())
            .collect();

        if missing.is_empty() {
            return Ok(());
        }
        Err(TxError::Validation(format!(
            "No handler registered for event type(s): {}",
            missing.join(", ")
        )))
    }

    async fn publish_pending(&self, context: &TransactionEventContext) -> Result<()> {
        let events = context.pending_events();
        let mut published = 0usize;
        let mut skipped = 0usize;
        let mut failed = Vec::new();

        for event in events {
            // Claim first so concurrent flushes of the same id publish once
            let now = self.time_provider.now_millis();
            match self.dedup_store.try_mark_as_published(&event.id, now).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(event_id = %event.id, "Event already published, skipping");
                    skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(event_id = %event.id, error = %e, "Dedup claim failed");
                    failed.push(event.id.as_str());
                    continue;
                }
            }

            if let Err(e) = self.publisher.publish(event).await {
                warn!(
                    transaction_id = %context.transaction_id(),
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %e,
                    "Event publish failed"
                );
                if let Err(e) = self.dedup_store.release(&event.id).await {
                    warn!(event_id = %event.id, error = %e, "Failed to release dedup claim");
                }
                failed.push(event.id.as_str());
                continue;
            }
            published += 1;
        }

        info!(
            transaction_id = %context.transaction_id(),
            published,
            skipped,
            failed = failed.len(),
            "Outbox flushed"
        );

        if failed.is_empty() {
            Ok(())
        } else {
            Err(TxError::Internal(format!(
                "{} of {} event(s) not published: {}",
                failed.len(),
                events.len(),
                failed.join(", ")
            )))
        }
    }
}

#[async_trait]
impl TransactionAdapter for EventsAdapter {
    fn name(&self) -> &str {
        "events"
    }

    fn priority(&self) -> i32 {
        EVENTS_ADAPTER_PRIORITY
    }

    async fn on_phase(&self, phase: TransactionPhase, context: &TransactionEventContext) -> Result<()> {
        match phase {
            TransactionPhase::BeforeCommitValidation => self.validate_handlers(context),
            TransactionPhase::AfterCommit => self.publish_pending(context).await,
            TransactionPhase::AfterRollback if context.has_pending_events() => {
                debug!(
                    transaction_id = %context.transaction_id(),
                    discarded = context.pending_count(),
                    "Pending events dropped on rollback"
                );
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
