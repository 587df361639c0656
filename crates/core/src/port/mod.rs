// Port Layer - Interfaces for external collaborators

pub mod adapter;
pub mod cache;
pub mod dedup_store;
pub mod event_bus;
pub mod id_provider; // For deterministic testing
pub mod operation_log;
pub mod side_effect;
pub mod time_provider;
pub mod transaction;
pub mod undo_strategy;

// Re-exports
pub use adapter::TransactionAdapter;
pub use cache::CacheInvalidator;
pub use dedup_store::{
    EventDeduplicationStore, InMemoryEventDeduplicationStore, NoOpEventDeduplicationStore,
};
pub use event_bus::{EventHandlerRegistry, EventPublisher, StaticHandlerRegistry};
pub use id_provider::IdProvider;
pub use operation_log::{InMemoryOperationLog, OperationLog};
pub use side_effect::SideEffect;
pub use time_provider::TimeProvider;
pub use transaction::{Transaction, TransactionalStore};
pub use undo_strategy::UndoStrategy;
