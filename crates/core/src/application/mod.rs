// Application Layer - Transaction coordination services

pub mod adapters;
pub mod cancel;
pub mod constants;
pub mod dedup_cleanup;
pub mod manager;
pub mod metrics;
pub mod registry;
pub mod retry;
pub mod undo;
pub mod unit_of_work;

// Re-exports
pub use adapters::{
    CacheInvalidationAdapter, CacheKeyMapper, EventsAdapter, PersistenceAdapter,
    SideEffectRetryAdapter,
};
pub use cancel::{cancel_channel, CancelHandle, CancelToken};
pub use dedup_cleanup::DedupCleanupScheduler;
pub use manager::TransactionManager;
pub use metrics::{
    AdapterRecord, MetricsSummary, TransactionMetrics, TransactionOutcome, TransactionRecord,
};
pub use registry::AdapterRegistry;
pub use retry::{RetryDecision, RetryEvaluator};
pub use undo::{OperationUndoResult, UndoEngine, UndoResult};
pub use unit_of_work::{OperationDraft, UnitOfWork, WorkflowScope};
