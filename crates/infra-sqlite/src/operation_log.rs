// SQLite OperationLog Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use sqlx::SqlitePool;
use txflow_core::domain::{OperationStatus, OperationType, TransactionOperation};
use txflow_core::error::{Result, TxError};
use txflow_core::port::OperationLog;

/// Workflow operation log (`transaction_operations` table)
///
/// Writes go through their own pool, outside the unit of work, so the
/// audit trail survives a rollback. Point it at a database file other than
/// the one the unit of work writes to: a second writer on the same SQLite
/// file would wait on the open transaction's lock.
#[derive(Clone)]
pub struct SqliteOperationLog {
    pool: SqlitePool,
}

impl SqliteOperationLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OperationLog for SqliteOperationLog {
    async fn append(&self, operation: &TransactionOperation) -> Result<()> {
        let last: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(operation_index) FROM transaction_operations WHERE workflow_id = ?",
        )
        .bind(&operation.workflow_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if let Some(last) = last {
            if operation.operation_index <= last {
                return Err(TxError::Conflict(format!(
                    "Operation index {} not after {} in workflow {}",
                    operation.operation_index, last, operation.workflow_id
                )));
            }
        }

        let original_data = operation.original_data.as_ref().map(|v| v.to_string());
        let undo_data = operation.undo_data.as_ref().map(|v| v.to_string());

        sqlx::query(
            r#"
            INSERT INTO transaction_operations (
                workflow_id, operation_index, operation_type, resource_type, resource_id,
                original_data, undo_data, status, error, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&operation.workflow_id)
        .bind(operation.operation_index)
        .bind(operation.operation_type.as_str())
        .bind(&operation.resource_type)
        .bind(&operation.resource_id)
        .bind(&original_data)
        .bind(&undo_data)
        .bind(operation.status.to_string())
        .bind(&operation.error)
        .bind(operation.created_at)
        .bind(operation.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn next_index(&self, workflow_id: &str) -> Result<i64> {
        let last: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(operation_index) FROM transaction_operations WHERE workflow_id = ?",
        )
        .bind(workflow_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(last.map(|i| i + 1).unwrap_or(0))
    }

    async fn find_by_workflow(&self, workflow_id: &str) -> Result<Vec<TransactionOperation>> {
        let rows: Vec<OperationRow> = sqlx::query_as(
            "SELECT * FROM transaction_operations WHERE workflow_id = ? ORDER BY operation_index",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(OperationRow::into_operation).collect()
    }

    async fn update_status(&self, operation: &TransactionOperation) -> Result<()> {
        let stored: Option<String> = sqlx::query_scalar(
            "SELECT status FROM transaction_operations WHERE workflow_id = ? AND operation_index = ?",
        )
        .bind(&operation.workflow_id)
        .bind(operation.operation_index)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let stored = stored.ok_or_else(|| {
            TxError::NotFound(format!(
                "Operation {}#{}",
                operation.workflow_id, operation.operation_index
            ))
        })?;
        let stored = OperationStatus::parse(&stored)?;
        if stored.is_final() {
            return Err(TxError::Conflict(format!(
                "Operation {}#{} is already {}",
                operation.workflow_id, operation.operation_index, stored
            )));
        }

        sqlx::query(
            r#"
            UPDATE transaction_operations
            SET status = ?, error = ?, updated_at = ?
            WHERE workflow_id = ? AND operation_index = ?
            "#,
        )
        .bind(operation.status.to_string())
        .bind(&operation.error)
        .bind(operation.updated_at)
        .bind(&operation.workflow_id)
        .bind(operation.operation_index)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct OperationRow {
    workflow_id: String,
    operation_index: i64,
    operation_type: String,
    resource_type: String,
    resource_id: String,
    original_data: Option<String>,
    undo_data: Option<String>,
    status: String,
    error: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl OperationRow {
    fn into_operation(self) -> Result<TransactionOperation> {
        let parse_json = |raw: Option<String>| -> Result<Option<serde_json::Value>> {
            raw.map(|s| serde_json::from_str(&s)).transpose().map_err(Into::into)
        };

        Ok(TransactionOperation {
            workflow_id: self.workflow_id,
            operation_index: self.operation_index,
            operation_type: OperationType::parse(&self.operation_type),
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            original_data: parse_json(self.original_data)?,
            undo_data: parse_json(self.undo_data)?,
            status: OperationStatus::parse(&self.status)?,
            error: self.error,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
