// Undo Strategy SPI (implemented by repository-owning modules)

use crate::domain::{OperationType, TransactionOperation};
use crate::error::Result;
use async_trait::async_trait;

/// Compensation for one family of recorded operations
#[async_trait]
pub trait UndoStrategy: Send + Sync {
    /// Whether this strategy can compensate the given operation
    fn can_handle(&self, operation_type: &OperationType, resource_type: &str) -> bool;

    /// Compensate the operation
    ///
    /// # Returns
    /// `Ok(true)` when undone, `Ok(false)` when the strategy gave up.
    /// Errors are treated like `Ok(false)` by the undo engine.
    async fn undo(&self, operation: &TransactionOperation) -> Result<bool>;
}
