// Event bus ports (owned by the external event-bus module)

use crate::domain::DomainEvent;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashSet;

/// "Does a handler exist for this event type" predicate
pub trait EventHandlerRegistry: Send + Sync {
    fn has_handler(&self, event_type: &str) -> bool;
}

/// Publish function for committed events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> Result<()>;
}

/// Handler registry built once at startup from a fixed set of event types
#[derive(Debug, Clone, Default)]
pub struct StaticHandlerRegistry {
    event_types: HashSet<String>,
}

impl StaticHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler(mut self, event_type: impl Into<String>) -> Self {
        self.event_types.insert(event_type.into());
        self
    }
}

impl EventHandlerRegistry for StaticHandlerRegistry {
    fn has_handler(&self, event_type: &str) -> bool {
        self.event_types.contains(event_type)
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::TxError;
    use std::sync::{Arc, Mutex};

    /// Publisher recording every published event in order
    #[derive(Clone, Default)]
    pub struct RecordingPublisher {
        published: Arc<Mutex<Vec<DomainEvent>>>,
        failing_types: Arc<Mutex<HashSet<String>>>,
    }

    impl RecordingPublisher {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make publishes of this event type fail
        pub fn fail_type(&self, event_type: impl Into<String>) {
            self.failing_types.lock().unwrap().insert(event_type.into());
        }

        pub fn published(&self) -> Vec<DomainEvent> {
            self.published.lock().unwrap().clone()
        }

        pub fn published_ids(&self) -> Vec<String> {
            self.published
                .lock()
                .unwrap()
                .iter()
                .map(|e| e.id.clone())
                .collect()
        }
    }

    #[async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn publish(&self, event: &DomainEvent) -> Result<()> {
            if self.failing_types.lock().unwrap().contains(&event.event_type) {
                return Err(TxError::Connection(format!(
                    "broker unavailable for {}",
                    event.event_type
                )));
            }
            self.published.lock().unwrap().push(event.clone());
            Ok(())
        }
    }
}
