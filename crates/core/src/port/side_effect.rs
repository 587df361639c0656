// Side effect port (non-transactional external calls)
use crate::domain::TransactionEventContext;
use crate::error::Result;
use async_trait::async_trait;

/// External call executed after commit (e.g. notification send).
///
/// Failures never roll back the committed transaction.
#[async_trait]
pub trait SideEffect: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, context: &TransactionEventContext) -> Result<()>;
}
