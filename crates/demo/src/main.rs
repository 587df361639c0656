//! txflow demo - Main Entry Point
//! Wires the transaction manager with SQLite, runs a sample order flow

mod orders;
mod settings;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use txflow_core::application::{
    cancel_channel, AdapterRegistry, CacheInvalidationAdapter, DedupCleanupScheduler,
    EventsAdapter, PersistenceAdapter, SideEffectRetryAdapter, TransactionManager,
    TransactionMetrics, UndoEngine,
};
use txflow_core::domain::{DedupStoreKind, RetryPolicy};
use txflow_core::port::time_provider::SystemTimeProvider;
use txflow_core::port::{
    EventDeduplicationStore, InMemoryEventDeduplicationStore, NoOpEventDeduplicationStore,
    StaticHandlerRegistry, TimeProvider,
};
use txflow_infra_sqlite::{
    create_pool, run_migrations, SqliteEventDeduplicationStore, SqliteOperationLog, SqliteStore,
};

use orders::{
    LoggingCache, LoggingPublisher, OrderRequest, ReceiptNotifier, ReleaseStockStrategy,
    ORDER_PLACED, STOCK_RESERVED,
};
use settings::AppSettings;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging
    init_logging()?;
    info!("txflow demo v{} starting...", VERSION);

    // 2. Load configuration
    let settings = AppSettings::load()?;
    let tx_config = settings.transaction_config()?;
    info!(
        db_path = %settings.database_path,
        operation_log_path = %settings.operation_log_path,
        dedup_store = ?settings.dedup.store,
        "Configuration loaded"
    );

    // 3. Initialize databases
    let pool = create_pool(&settings.database_url())
        .await
        .context("DB pool creation failed")?;
    run_migrations(&pool).await.context("Migration failed")?;

    let log_pool = create_pool(&settings.operation_log_url())
        .await
        .context("Operation log pool creation failed")?;
    run_migrations(&log_pool)
        .await
        .context("Operation log migration failed")?;

    let store = Arc::new(SqliteStore::new(pool.clone()));
    orders::create_schema(&store).await?;

    // 4. Setup dependencies (DI wiring)
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let dedup_store = build_dedup_store(settings.dedup.store, &pool);
    let metrics = Arc::new(TransactionMetrics::new());

    let registry = Arc::new(AdapterRegistry::with_metrics(Arc::clone(&metrics)));
    registry.register(Arc::new(PersistenceAdapter::new()));
    registry.register(Arc::new(EventsAdapter::new(
        Arc::new(
            StaticHandlerRegistry::new()
                .with_handler(ORDER_PLACED)
                .with_handler(STOCK_RESERVED),
        ),
        Arc::new(LoggingPublisher),
        Arc::clone(&dedup_store),
        Arc::clone(&time_provider),
    )));
    registry.register(Arc::new(CacheInvalidationAdapter::new(
        Arc::new(LoggingCache),
        Arc::new(orders::order_cache_keys),
    )));
    registry.register(Arc::new(SideEffectRetryAdapter::new(
        Arc::new(ReceiptNotifier),
        RetryPolicy::default().with_max_retries(2),
    )));

    let inventory = Arc::new(orders::Inventory::with_stock(&[("sku-espresso", 3)]));
    let undo_engine = Arc::new(UndoEngine::new(
        Arc::new(SqliteOperationLog::new(log_pool)),
        Arc::clone(&time_provider),
    ));
    undo_engine.register_strategy(Arc::new(ReleaseStockStrategy::new(Arc::clone(&inventory))));

    let manager = TransactionManager::new(Arc::clone(&store), registry)
        .with_undo_engine(undo_engine)
        .with_metrics(Arc::clone(&metrics));

    // 5. Start dedup cleanup scheduler
    let (cleanup_cancel, cleanup_token) = cancel_channel();
    let cleanup = DedupCleanupScheduler::new(
        Arc::clone(&dedup_store),
        Arc::clone(&time_provider),
        settings.dedup.retention(),
        settings.dedup.cleanup_interval(),
    );
    let cleanup_handle = tokio::spawn(cleanup.run(cleanup_token));

    // 6. Run the sample flow: a duplicate order id (rolled back, stock
    // released by undo) and an order exceeding the remaining stock
    let run_id = uuid::Uuid::new_v4().simple().to_string();
    let order = |suffix: &str, quantity: i64| OrderRequest {
        order_id: format!("{}-{}", &run_id[..8], suffix),
        sku: "sku-espresso".to_string(),
        quantity,
    };
    let requests = [order("1", 2), order("1", 1), order("2", 2)];

    for request in &requests {
        match orders::place_order(&manager, &inventory, time_provider.as_ref(), &tx_config, request)
            .await
        {
            Ok(order_id) => info!(order_id = %order_id, "Order placed"),
            Err(e) => warn!(order_id = %request.order_id, error = %e, "Order rejected"),
        }
    }

    info!(
        remaining_stock = inventory.available("sku-espresso"),
        "Inventory after sample flow"
    );

    let summary = metrics.summary().await;
    info!(
        transactions = summary.transactions,
        committed = summary.committed,
        rolled_back = summary.rolled_back,
        retries_exhausted = summary.retries_exhausted,
        adapter_failures = summary.adapter_failures,
        "Metrics summary"
    );

    // 7. Graceful shutdown
    cleanup_cancel.cancel();
    if let Err(e) = cleanup_handle.await {
        error!(error = ?e, "Cleanup scheduler task failed");
    }

    info!("Shutdown complete.");
    Ok(())
}

/// `RUST_LOG` filter (default `txflow=info`), `TXFLOW_LOG_FORMAT=json` for JSON lines
fn init_logging() -> Result<()> {
    let log_format = std::env::var("TXFLOW_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("txflow=info,txflow_core=info,txflow_infra_sqlite=info,txflow_demo=info"))
        .context("Failed to create env filter")?;

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }
    Ok(())
}

fn build_dedup_store(
    kind: DedupStoreKind,
    pool: &sqlx::SqlitePool,
) -> Arc<dyn EventDeduplicationStore> {
    match kind {
        DedupStoreKind::Sqlite => Arc::new(SqliteEventDeduplicationStore::new(pool.clone())),
        DedupStoreKind::Memory => {
            warn!("In-memory dedup store: published ids are lost on restart");
            Arc::new(InMemoryEventDeduplicationStore::new())
        }
        DedupStoreKind::Noop => Arc::new(NoOpEventDeduplicationStore),
    }
}
