// Operation Log port (workflow audit trail)

use crate::domain::TransactionOperation;
use crate::error::{Result, TxError};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Append-only log of operations recorded per workflow
#[async_trait]
pub trait OperationLog: Send + Sync {
    /// Append a new operation
    ///
    /// # Errors
    /// - TxError::Conflict if the index is not greater than the workflow's last index
    async fn append(&self, operation: &TransactionOperation) -> Result<()>;

    /// Next free operation index for the workflow (0 for a new workflow)
    async fn next_index(&self, workflow_id: &str) -> Result<i64>;

    /// All operations of a workflow ordered by index
    async fn find_by_workflow(&self, workflow_id: &str) -> Result<Vec<TransactionOperation>>;

    /// Persist status/error/updated_at of an existing operation
    ///
    /// # Errors
    /// - TxError::NotFound if the operation was never appended
    /// - TxError::Conflict if the stored operation is already UNDONE/FAILED
    async fn update_status(&self, operation: &TransactionOperation) -> Result<()>;
}

/// Process-local operation log
#[derive(Default)]
pub struct InMemoryOperationLog {
    workflows: RwLock<HashMap<String, Vec<TransactionOperation>>>,
}

impl InMemoryOperationLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OperationLog for InMemoryOperationLog {
    async fn append(&self, operation: &TransactionOperation) -> Result<()> {
        let mut workflows = self.workflows.write().await;
        let ops = workflows.entry(operation.workflow_id.clone()).or_default();

        if let Some(last) = ops.last() {
            if operation.operation_index <= last.operation_index {
                return Err(TxError::Conflict(format!(
                    "Operation index {} not after {} in workflow {}",
                    operation.operation_index, last.operation_index, operation.workflow_id
                )));
            }
        }

        ops.push(operation.clone());
        Ok(())
    }

    async fn next_index(&self, workflow_id: &str) -> Result<i64> {
        let workflows = self.workflows.read().await;
        Ok(workflows
            .get(workflow_id)
            .and_then(|ops| ops.last())
            .map(|op| op.operation_index + 1)
            .unwrap_or(0))
    }

    async fn find_by_workflow(&self, workflow_id: &str) -> Result<Vec<TransactionOperation>> {
        let workflows = self.workflows.read().await;
        Ok(workflows.get(workflow_id).cloned().unwrap_or_default())
    }

    async fn update_status(&self, operation: &TransactionOperation) -> Result<()> {
        let mut workflows = self.workflows.write().await;
        let stored = workflows
            .get_mut(&operation.workflow_id)
            .and_then(|ops| {
                ops.iter_mut()
                    .find(|op| op.operation_index == operation.operation_index)
            })
            .ok_or_else(|| {
                TxError::NotFound(format!(
                    "Operation {}#{}",
                    operation.workflow_id, operation.operation_index
                ))
            })?;

        if stored.status.is_final() {
            return Err(TxError::Conflict(format!(
                "Operation {}#{} is already {}",
                stored.workflow_id, stored.operation_index, stored.status
            )));
        }

        stored.status = operation.status;
        stored.error = operation.error.clone();
        stored.updated_at = operation.updated_at;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OperationStatus, OperationType};

    fn op(index: i64) -> TransactionOperation {
        TransactionOperation::new("wf-1", index, OperationType::Update, "account", "a-1", 1000)
    }

    #[tokio::test]
    async fn test_indices_strictly_increase() {
        let log = InMemoryOperationLog::new();
        assert_eq!(log.next_index("wf-1").await.unwrap(), 0);

        log.append(&op(0)).await.unwrap();
        log.append(&op(1)).await.unwrap();
        assert_eq!(log.next_index("wf-1").await.unwrap(), 2);

        let err = log.append(&op(1)).await.unwrap_err();
        assert!(matches!(err, TxError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_final_status_is_not_overwritten() {
        let log = InMemoryOperationLog::new();
        let mut operation = op(0);
        log.append(&operation).await.unwrap();

        operation.mark_undone(2000).unwrap();
        log.update_status(&operation).await.unwrap();

        let stored = log.find_by_workflow("wf-1").await.unwrap();
        assert_eq!(stored[0].status, OperationStatus::Undone);

        let err = log.update_status(&operation).await.unwrap_err();
        assert!(matches!(err, TxError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_unknown_operation() {
        let log = InMemoryOperationLog::new();
        let err = log.update_status(&op(7)).await.unwrap_err();
        assert!(matches!(err, TxError::NotFound(_)));
    }
}
