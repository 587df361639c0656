// Domain Event Model

use serde::{Deserialize, Serialize};

/// Event ID (caller supplied, used as the idempotency key)
pub type EventId = String;

/// Domain event queued inside a unit of work and published after commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: EventId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub occurred_at: i64, // epoch ms
}

impl DomainEvent {
    /// Create a new event
    ///
    /// # Arguments
    ///
    /// * `id` - Unique event ID (injected, not generated)
    /// * `event_type` - Type used to look up handlers
    /// * `payload` - Event body
    /// * `occurred_at` - Timestamp in epoch ms (injected, not system time)
    pub fn new(
        id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
        occurred_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            payload,
            occurred_at,
        }
    }
}
