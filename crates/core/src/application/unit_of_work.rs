// Unit of work handed to the transaction block

use crate::domain::{DomainEvent, OperationType, TransactionEventContext, TransactionOperation};
use crate::error::{Result, TxError};
use crate::port::{OperationLog, TimeProvider, Transaction};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Mutation to record in the workflow operation log
#[derive(Debug, Clone)]
pub struct OperationDraft {
    pub operation_type: OperationType,
    pub resource_type: String,
    pub resource_id: String,
    pub original_data: Option<Value>,
    pub undo_data: Option<Value>,
}

impl OperationDraft {
    pub fn new(
        operation_type: OperationType,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            operation_type,
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            original_data: None,
            undo_data: None,
        }
    }

    pub fn with_original_data(mut self, data: Value) -> Self {
        self.original_data = Some(data);
        self
    }

    pub fn with_undo_data(mut self, data: Value) -> Self {
        self.undo_data = Some(data);
        self
    }
}

/// Operation recorder for one attempt of a workflow transaction
///
/// Indices continue from the log's `next_index`, so a retried attempt never
/// reuses an index of an earlier attempt. The recorded list is shared with the
/// manager so an attempt dropped mid-block can still be compensated.
pub struct WorkflowScope {
    workflow_id: String,
    next_index: Option<i64>,
    recorded: Arc<Mutex<Vec<TransactionOperation>>>,
    operation_log: Arc<dyn OperationLog>,
    time_provider: Arc<dyn TimeProvider>,
}

impl WorkflowScope {
    pub(crate) fn new(
        workflow_id: impl Into<String>,
        operation_log: Arc<dyn OperationLog>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            next_index: None,
            recorded: Arc::default(),
            operation_log,
            time_provider,
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Append a PENDING operation to the log
    pub async fn record(&mut self, draft: OperationDraft) -> Result<TransactionOperation> {
        let index = match self.next_index {
            Some(index) => index,
            None => self.operation_log.next_index(&self.workflow_id).await?,
        };

        let mut operation = TransactionOperation::new(
            self.workflow_id.clone(),
            index,
            draft.operation_type,
            draft.resource_type,
            draft.resource_id,
            self.time_provider.now_millis(),
        );
        operation.original_data = draft.original_data;
        operation.undo_data = draft.undo_data;

        self.operation_log.append(&operation).await?;
        self.next_index = Some(index + 1);

        debug!(
            workflow_id = %self.workflow_id,
            operation_index = index,
            operation_type = %operation.operation_type,
            resource_type = %operation.resource_type,
            "Operation recorded"
        );

        self.lock_recorded().push(operation.clone());
        Ok(operation)
    }

    /// Operations recorded so far, in recording order
    pub fn recorded(&self) -> Vec<TransactionOperation> {
        self.lock_recorded().clone()
    }

    /// Take the recorded operations, leaving the shared list empty
    pub fn into_recorded(self) -> Vec<TransactionOperation> {
        std::mem::take(&mut *self.lock_recorded())
    }

    pub(crate) fn shared_recorded(&self) -> Arc<Mutex<Vec<TransactionOperation>>> {
        Arc::clone(&self.recorded)
    }

    fn lock_recorded(&self) -> std::sync::MutexGuard<'_, Vec<TransactionOperation>> {
        self.recorded.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// What the transaction block sees: the persistence transaction, the outbox
/// queue and (for workflows) the operation recorder
pub struct UnitOfWork<Tx> {
    tx: Box<Tx>,
    context: TransactionEventContext,
    workflow: Option<WorkflowScope>,
}

impl<Tx: Transaction> UnitOfWork<Tx> {
    pub(crate) fn new(
        tx: Box<Tx>,
        context: TransactionEventContext,
        workflow: Option<WorkflowScope>,
    ) -> Self {
        Self {
            tx,
            context,
            workflow,
        }
    }

    /// Store-specific transaction handle for reads and writes
    pub fn tx(&mut self) -> &mut Tx {
        &mut self.tx
    }

    pub fn transaction_id(&self) -> &str {
        self.context.transaction_id()
    }

    pub fn attempt(&self) -> u32 {
        self.context.attempt()
    }

    pub fn workflow_id(&self) -> Option<&str> {
        self.context.workflow_id()
    }

    /// Queue a domain event; it is published only after commit
    pub fn enqueue_event(&mut self, event: DomainEvent) {
        self.context.add_event(event);
    }

    pub fn pending_events(&self) -> &[DomainEvent] {
        self.context.pending_events()
    }

    /// Record an undoable operation of the current workflow
    ///
    /// # Errors
    /// - TxError::InvalidState if the transaction was started without a workflow id
    pub async fn record_operation(&mut self, draft: OperationDraft) -> Result<TransactionOperation> {
        match self.workflow.as_mut() {
            Some(scope) => scope.record(draft).await,
            None => Err(TxError::InvalidState(format!(
                "Transaction {} has no workflow; cannot record {} {}",
                self.context.transaction_id(),
                draft.operation_type,
                draft.resource_type
            ))),
        }
    }

    pub fn recorded_operations(&self) -> Vec<TransactionOperation> {
        self.workflow
            .as_ref()
            .map(WorkflowScope::recorded)
            .unwrap_or_default()
    }

    pub(crate) fn into_parts(self) -> (Box<Tx>, TransactionEventContext, Option<WorkflowScope>) {
        (self.tx, self.context, self.workflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::time_provider::mocks::FixedTimeProvider;
    use crate::port::transaction::mocks::MockStore;
    use crate::port::{InMemoryOperationLog, TransactionalStore};
    use crate::domain::IsolationLevel;
    use serde_json::json;

    fn scope(log: Arc<InMemoryOperationLog>) -> WorkflowScope {
        WorkflowScope::new("wf-1", log, Arc::new(FixedTimeProvider::new(1_000)))
    }

    #[tokio::test]
    async fn test_scope_continues_log_indices() {
        let log = Arc::new(InMemoryOperationLog::new());

        let mut first = scope(log.clone());
        first
            .record(OperationDraft::new(OperationType::Insert, "order", "o-1"))
            .await
            .unwrap();

        let mut second = scope(log.clone());
        let op = second
            .record(
                OperationDraft::new(OperationType::Update, "stock", "sku-1")
                    .with_original_data(json!({"qty": 5}))
                    .with_undo_data(json!({"qty": 5})),
            )
            .await
            .unwrap();

        assert_eq!(op.operation_index, 1);
        assert_eq!(op.created_at, 1_000);
        assert_eq!(second.recorded().len(), 1);
        assert_eq!(log.find_by_workflow("wf-1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_into_recorded_drains_shared_list() {
        let log = Arc::new(InMemoryOperationLog::new());
        let mut scope = scope(log);
        let shared = scope.shared_recorded();
        scope
            .record(OperationDraft::new(OperationType::Insert, "order", "o-1"))
            .await
            .unwrap();
        assert_eq!(shared.lock().unwrap().len(), 1);

        let taken = scope.into_recorded();
        assert_eq!(taken.len(), 1);
        assert!(shared.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_without_workflow_is_invalid_state() {
        let store = MockStore::new();
        let tx = store
            .begin_transaction(IsolationLevel::ReadCommitted)
            .await
            .unwrap();
        let mut uow = UnitOfWork::new(tx, TransactionEventContext::new("tx-1", 1, None), None);

        let err = uow
            .record_operation(OperationDraft::new(OperationType::Delete, "order", "o-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, TxError::InvalidState(_)));
        assert!(uow.recorded_operations().is_empty());

        uow.enqueue_event(DomainEvent::new("e1", "OrderPlaced", json!({}), 1));
        uow.tx().write("row");
        assert_eq!(uow.pending_events().len(), 1);
        assert_eq!(uow.tx().writes().to_vec(), vec!["row".to_string()]);
    }
}
