// Transaction Operation Model (workflow / undo audit trail)

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Workflow identifier
pub type WorkflowId = String;

/// Kind of tracked mutation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
    Insert,
    Update,
    Delete,
    Custom(String),
}

impl OperationType {
    pub fn parse(s: &str) -> Self {
        match s {
            "INSERT" => OperationType::Insert,
            "UPDATE" => OperationType::Update,
            "DELETE" => OperationType::Delete,
            other => OperationType::Custom(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            OperationType::Insert => "INSERT",
            OperationType::Update => "UPDATE",
            OperationType::Delete => "DELETE",
            OperationType::Custom(tag) => tag,
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Operation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Pending,
    Committed,
    Undone,
    Failed,
}

impl OperationStatus {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(OperationStatus::Pending),
            "COMMITTED" => Ok(OperationStatus::Committed),
            "UNDONE" => Ok(OperationStatus::Undone),
            "FAILED" => Ok(OperationStatus::Failed),
            other => Err(DomainError::ValidationError(format!(
                "Unknown operation status: {}",
                other
            ))),
        }
    }

    /// UNDONE and FAILED are never left
    pub fn is_final(&self) -> bool {
        matches!(self, OperationStatus::Undone | OperationStatus::Failed)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationStatus::Pending => write!(f, "PENDING"),
            OperationStatus::Committed => write!(f, "COMMITTED"),
            OperationStatus::Undone => write!(f, "UNDONE"),
            OperationStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// One recorded mutation inside a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionOperation {
    pub workflow_id: WorkflowId,
    pub operation_index: i64, // 0-based, strictly increasing per workflow
    pub operation_type: OperationType,
    pub resource_type: String,
    pub resource_id: String,

    pub original_data: Option<serde_json::Value>,
    pub undo_data: Option<serde_json::Value>,

    pub status: OperationStatus,
    pub error: Option<String>,

    pub created_at: i64, // epoch ms
    pub updated_at: i64,
}

impl TransactionOperation {
    /// Create a new PENDING operation
    ///
    /// # Arguments
    ///
    /// * `workflow_id` - Owning workflow
    /// * `operation_index` - Sequence number assigned by the workflow scope
    /// * `operation_type` - INSERT/UPDATE/DELETE or a custom tag
    /// * `resource_type` - Kind of resource touched (e.g. "order")
    /// * `resource_id` - Identifier of the touched resource
    /// * `created_at` - Timestamp in epoch ms (injected)
    pub fn new(
        workflow_id: impl Into<String>,
        operation_index: i64,
        operation_type: OperationType,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        created_at: i64,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            operation_index,
            operation_type,
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            original_data: None,
            undo_data: None,
            status: OperationStatus::Pending,
            error: None,
            created_at,
            updated_at: created_at,
        }
    }

    pub fn with_original_data(mut self, data: serde_json::Value) -> Self {
        self.original_data = Some(data);
        self
    }

    pub fn with_undo_data(mut self, data: serde_json::Value) -> Self {
        self.undo_data = Some(data);
        self
    }

    /// PENDING → COMMITTED
    pub fn commit(&mut self, now_millis: i64) -> Result<()> {
        self.transition(OperationStatus::Committed, now_millis)
    }

    /// PENDING|COMMITTED → UNDONE
    pub fn mark_undone(&mut self, now_millis: i64) -> Result<()> {
        self.transition(OperationStatus::Undone, now_millis)
    }

    /// PENDING|COMMITTED → FAILED (undo attempt failed)
    pub fn mark_failed(&mut self, now_millis: i64, error: impl Into<String>) -> Result<()> {
        self.transition(OperationStatus::Failed, now_millis)?;
        self.error = Some(error.into());
        Ok(())
    }

    fn transition(&mut self, to: OperationStatus, now_millis: i64) -> Result<()> {
        let allowed = match (self.status, to) {
            (OperationStatus::Pending, OperationStatus::Committed) => true,
            (OperationStatus::Pending | OperationStatus::Committed, OperationStatus::Undone) => {
                true
            }
            (OperationStatus::Pending | OperationStatus::Committed, OperationStatus::Failed) => {
                true
            }
            _ => false,
        };

        if !allowed {
            return Err(DomainError::InvalidStatusTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }

        self.status = to;
        self.updated_at = now_millis;
        Ok(())
    }
}
