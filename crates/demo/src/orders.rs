//! Sample order-placement flow
//!
//! Orders are written to SQLite inside the unit of work. Stock lives in an
//! in-process inventory standing in for an external service, so its
//! reservations are compensated by an undo strategy instead of a rollback.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::info;
use txflow_core::application::{OperationDraft, TransactionManager};
use txflow_core::domain::{
    DomainEvent, OperationType, TransactionConfig, TransactionEventContext, TransactionOperation,
};
use txflow_core::error::{Result, TxError};
use txflow_core::port::{
    CacheInvalidator, EventPublisher, SideEffect, TimeProvider, UndoStrategy,
};
use txflow_infra_sqlite::{map_sqlx_error, SqliteStore};

pub const ORDER_PLACED: &str = "OrderPlaced";
pub const STOCK_RESERVED: &str = "StockReserved";

/// Create the sample `orders` table
pub async fn create_schema(store: &SqliteStore) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            sku TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(store.pool())
    .await
    .map_err(map_sqlx_error)?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub order_id: String,
    pub sku: String,
    pub quantity: i64,
}

/// In-process stock levels (external system stand-in)
#[derive(Default)]
pub struct Inventory {
    stock: Mutex<HashMap<String, i64>>,
}

impl Inventory {
    pub fn with_stock(items: &[(&str, i64)]) -> Self {
        let stock = items
            .iter()
            .map(|(sku, qty)| (sku.to_string(), *qty))
            .collect();
        Self {
            stock: Mutex::new(stock),
        }
    }

    pub fn available(&self, sku: &str) -> i64 {
        self.stock
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(sku)
            .copied()
            .unwrap_or(0)
    }

    /// Take `quantity` units; returns the level before the reservation
    pub fn reserve(&self, sku: &str, quantity: i64) -> Result<i64> {
        let mut stock = self.stock.lock().unwrap_or_else(|e| e.into_inner());
        let level = stock.entry(sku.to_string()).or_insert(0);
        if *level < quantity {
            return Err(TxError::Validation(format!(
                "Insufficient stock for {}: {} requested, {} available",
                sku, quantity, level
            )));
        }
        let before = *level;
        *level -= quantity;
        Ok(before)
    }

    pub fn release(&self, sku: &str, quantity: i64) {
        let mut stock = self.stock.lock().unwrap_or_else(|e| e.into_inner());
        *stock.entry(sku.to_string()).or_insert(0) += quantity;
    }
}

/// Releases stock reserved by a failed order
pub struct ReleaseStockStrategy {
    inventory: Arc<Inventory>,
}

impl ReleaseStockStrategy {
    pub fn new(inventory: Arc<Inventory>) -> Self {
        Self { inventory }
    }
}

#[async_trait]
impl UndoStrategy for ReleaseStockStrategy {
    fn can_handle(&self, operation_type: &OperationType, resource_type: &str) -> bool {
        *operation_type == OperationType::Update && resource_type == "stock"
    }

    async fn undo(&self, operation: &TransactionOperation) -> Result<bool> {
        let quantity = operation
            .undo_data
            .as_ref()
            .and_then(|d| d["release"].as_i64());
        match quantity {
            Some(quantity) => {
                self.inventory.release(&operation.resource_id, quantity);
                info!(sku = %operation.resource_id, quantity, "Stock released");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Places one order: stock reservation, row insert, two events
pub async fn place_order(
    manager: &TransactionManager<SqliteStore>,
    inventory: &Arc<Inventory>,
    time_provider: &dyn TimeProvider,
    config: &TransactionConfig,
    request: &OrderRequest,
) -> Result<String> {
    let workflow_id = format!("order-{}", request.order_id);

    manager
        .transaction(Some(&workflow_id), config, |uow| {
            let request = request.clone();
            let inventory = Arc::clone(inventory);
            let now = time_provider.now_millis();
            Box::pin(async move {
                let before = inventory.reserve(&request.sku, request.quantity)?;
                uow.record_operation(
                    OperationDraft::new(OperationType::Update, "stock", &request.sku)
                        .with_original_data(json!({"level": before}))
                        .with_undo_data(json!({"release": request.quantity})),
                )
                .await?;
                uow.enqueue_event(DomainEvent::new(
                    format!("{}-reserved", request.order_id),
                    STOCK_RESERVED,
                    json!({"order_id": request.order_id, "quantity": request.quantity}),
                    now,
                ));

                // A duplicate order id fails here, after the reservation
                sqlx::query("INSERT INTO orders (id, sku, quantity, created_at) VALUES (?, ?, ?, ?)")
                    .bind(&request.order_id)
                    .bind(&request.sku)
                    .bind(request.quantity)
                    .bind(now)
                    .execute(uow.tx().conn())
                    .await
                    .map_err(map_sqlx_error)?;
                uow.enqueue_event(DomainEvent::new(
                    format!("{}-placed", request.order_id),
                    ORDER_PLACED,
                    json!({"order_id": request.order_id, "sku": request.sku}),
                    now,
                ));

                Ok(request.order_id)
            })
        })
        .await
}

/// Publisher that logs instead of talking to a broker
pub struct LoggingPublisher;

#[async_trait]
impl EventPublisher for LoggingPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<()> {
        info!(
            event_id = %event.id,
            event_type = %event.event_type,
            payload = %event.payload,
            "Event published"
        );
        Ok(())
    }
}

/// Cache that only logs evictions
pub struct LoggingCache;

#[async_trait]
impl CacheInvalidator for LoggingCache {
    async fn invalidate(&self, keys: &[String]) -> Result<()> {
        info!(keys = ?keys, "Cache keys invalidated");
        Ok(())
    }
}

/// Post-commit receipt notification
pub struct ReceiptNotifier;

#[async_trait]
impl SideEffect for ReceiptNotifier {
    fn name(&self) -> &str {
        "receipt"
    }

    async fn execute(&self, context: &TransactionEventContext) -> Result<()> {
        for event in context
            .pending_events()
            .iter()
            .filter(|e| e.event_type == ORDER_PLACED)
        {
            info!(order = %event.payload["order_id"], "Receipt sent");
        }
        Ok(())
    }
}

/// Cache keys made stale by an order event
pub fn order_cache_keys(event: &DomainEvent) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(order_id) = event.payload["order_id"].as_str() {
        keys.push(format!("order:{}", order_id));
    }
    if let Some(sku) = event.payload["sku"].as_str() {
        keys.push(format!("stock:{}", sku));
    }
    keys
}
