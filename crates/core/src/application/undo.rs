// Undo Engine - LIFO compensation of recorded workflow operations

use crate::application::unit_of_work::WorkflowScope;
use crate::domain::{OperationType, TransactionOperation};
use crate::error::Result;
use crate::port::{OperationLog, TimeProvider, UndoStrategy};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Outcome of undoing one operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationUndoResult {
    pub operation_index: i64,
    pub operation_type: OperationType,
    pub resource_type: String,
    pub resource_id: String,
    pub success: bool,
    pub error: Option<String>,
}

/// Outcome of undoing a workflow
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UndoResult {
    pub workflow_id: String,
    pub total_operations: usize,
    pub succeeded_count: usize,
    pub failed_count: usize,
    /// Per-operation results in undo (LIFO) order
    pub results: Vec<OperationUndoResult>,
}

impl UndoResult {
    /// Every operation was undone
    pub fn is_complete(&self) -> bool {
        self.failed_count == 0
    }
}

/// Workflow compensation engine
///
/// Undo is best-effort: a failing operation is recorded as FAILED and the
/// remaining operations are still processed. Failed undos are not retried.
pub struct UndoEngine {
    strategies: RwLock<Vec<Arc<dyn UndoStrategy>>>,
    operation_log: Arc<dyn OperationLog>,
    time_provider: Arc<dyn TimeProvider>,
}

impl UndoEngine {
    pub fn new(operation_log: Arc<dyn OperationLog>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            strategies: RwLock::new(Vec::new()),
            operation_log,
            time_provider,
        }
    }

    /// Register a strategy; earlier registrations win when several match
    pub fn register_strategy(&self, strategy: Arc<dyn UndoStrategy>) {
        let mut strategies = self.strategies.write().unwrap_or_else(|e| e.into_inner());
        strategies.push(strategy);
        debug!(strategies = strategies.len(), "Undo strategy registered");
    }

    pub fn strategy_count(&self) -> usize {
        self.strategies
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn operation_log(&self) -> &Arc<dyn OperationLog> {
        &self.operation_log
    }

    /// Start recording operations for one attempt of `workflow_id`
    pub fn open_scope(&self, workflow_id: &str) -> WorkflowScope {
        WorkflowScope::new(
            workflow_id,
            Arc::clone(&self.operation_log),
            Arc::clone(&self.time_provider),
        )
    }

    fn find_strategy(&self, operation: &TransactionOperation) -> Option<Arc<dyn UndoStrategy>> {
        self.strategies
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|s| s.can_handle(&operation.operation_type, &operation.resource_type))
            .cloned()
    }

    /// Undo `operations` in reverse index order
    ///
    /// Never fails: per-operation errors are logged and reported in the result.
    pub async fn undo_workflow(
        &self,
        workflow_id: &str,
        mut operations: Vec<TransactionOperation>,
    ) -> UndoResult {
        operations.sort_by(|a, b| b.operation_index.cmp(&a.operation_index));

        info!(
            workflow_id = %workflow_id,
            operations = operations.len(),
            "Undoing workflow"
        );

        let mut results = Vec::with_capacity(operations.len());
        for mut operation in operations {
            let outcome = self.undo_one(&mut operation).await;
            if let Err(reason) = &outcome {
                warn!(
                    workflow_id = %workflow_id,
                    operation_index = operation.operation_index,
                    resource_type = %operation.resource_type,
                    resource_id = %operation.resource_id,
                    error = %reason,
                    "Undo failed, continuing with remaining operations"
                );
            }

            results.push(OperationUndoResult {
                operation_index: operation.operation_index,
                operation_type: operation.operation_type.clone(),
                resource_type: operation.resource_type.clone(),
                resource_id: operation.resource_id.clone(),
                success: outcome.is_ok(),
                error: outcome.err(),
            });
        }

        let succeeded_count = results.iter().filter(|r| r.success).count();
        let result = UndoResult {
            workflow_id: workflow_id.to_string(),
            total_operations: results.len(),
            succeeded_count,
            failed_count: results.len() - succeeded_count,
            results,
        };

        if result.is_complete() {
            info!(
                workflow_id = %workflow_id,
                undone = result.succeeded_count,
                "Workflow undone"
            );
        } else {
            warn!(
                workflow_id = %workflow_id,
                undone = result.succeeded_count,
                failed = result.failed_count,
                "Workflow partially undone"
            );
        }
        result
    }

    async fn undo_one(&self, operation: &mut TransactionOperation) -> std::result::Result<(), String> {
        if operation.status.is_final() {
            return Err(format!("Operation already {}", operation.status));
        }

        let outcome = match self.find_strategy(operation) {
            None => Err(format!(
                "No undo strategy for {} {}",
                operation.operation_type, operation.resource_type
            )),
            Some(strategy) => match strategy.undo(operation).await {
                Ok(true) => Ok(()),
                Ok(false) => Err("Undo strategy reported failure".to_string()),
                Err(e) => Err(e.to_string()),
            },
        };

        let now = self.time_provider.now_millis();
        let transition = match &outcome {
            Ok(()) => operation.mark_undone(now),
            Err(reason) => operation.mark_failed(now, reason.clone()),
        };
        if let Err(e) = transition {
            warn!(error = %e, "Operation status not updated");
        } else if let Err(e) = self.operation_log.update_status(operation).await {
            warn!(
                workflow_id = %operation.workflow_id,
                operation_index = operation.operation_index,
                error = %e,
                "Failed to persist undo status"
            );
        }

        outcome
    }

    /// Undo every still-active (PENDING/COMMITTED) operation in the log
    pub async fn undo_recorded(&self, workflow_id: &str) -> Result<UndoResult> {
        let operations: Vec<_> = self
            .operation_log
            .find_by_workflow(workflow_id)
            .await?
            .into_iter()
            .filter(|op| !op.status.is_final())
            .collect();
        Ok(self.undo_workflow(workflow_id, operations).await)
    }

    /// Mark the operations of a committed attempt as COMMITTED
    ///
    /// # Returns
    /// Number of operations whose status was persisted
    pub async fn commit_operations(&self, operations: Vec<TransactionOperation>) -> usize {
        let now = self.time_provider.now_millis();
        let mut committed = 0;

        for mut operation in operations {
            let persisted = match operation.commit(now) {
                Ok(()) => self.operation_log.update_status(&operation).await,
                Err(e) => Err(e.into()),
            };
            match persisted {
                Ok(()) => committed += 1,
                Err(e) => warn!(
                    workflow_id = %operation.workflow_id,
                    operation_index = operation.operation_index,
                    error = %e,
                    "Failed to mark operation committed"
                ),
            }
        }
        committed
    }
}
