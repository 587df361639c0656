// Transaction Adapter SPI

use crate::domain::{TransactionEventContext, TransactionPhase};
use crate::error::Result;
use async_trait::async_trait;

/// Priority-ranked observer of transaction lifecycle phases
///
/// Implementations: persistence bookkeeping, event publishing, side-effect
/// retry, cache invalidation (see `application::adapters`).
#[async_trait]
pub trait TransactionAdapter: Send + Sync {
    /// Unique adapter name (used for unregister and metrics)
    fn name(&self) -> &str;

    /// Higher runs first
    fn priority(&self) -> i32;

    /// Handle one phase of one attempt
    ///
    /// # Errors
    /// Returning an error during BEFORE_COMMIT_VALIDATION vetoes the commit.
    /// In every other phase the error is logged and the transaction outcome
    /// is unaffected.
    async fn on_phase(&self, phase: TransactionPhase, context: &TransactionEventContext)
        -> Result<()>;
}
