// Domain Layer - Transaction lifecycle model and value objects

pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod operation;
pub mod phase;

// Re-exports
pub use config::{
    BackoffStrategy, DedupSettings, DedupStoreKind, IsolationLevel, RetryPolicy,
    TransactionConfig, TransactionSettings,
};
pub use context::TransactionEventContext;
pub use error::{DomainError, ErrorKind};
pub use event::{DomainEvent, EventId};
pub use operation::{OperationStatus, OperationType, TransactionOperation, WorkflowId};
pub use phase::TransactionPhase;
