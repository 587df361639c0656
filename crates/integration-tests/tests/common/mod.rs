//! Shared setup for the SQLite-backed integration tests

#![allow(dead_code)]

use std::sync::Arc;

use sqlx::SqlitePool;
use txflow_core::application::{AdapterRegistry, EventsAdapter, TransactionMetrics};
use txflow_core::domain::{BackoffStrategy, RetryPolicy, TransactionConfig};
use txflow_core::port::event_bus::mocks::RecordingPublisher;
use txflow_core::port::time_provider::mocks::FixedTimeProvider;
use txflow_core::port::{EventPublisher, StaticHandlerRegistry};
use txflow_core::TransactionManager;
use txflow_infra_sqlite::{create_pool, run_migrations, SqliteEventDeduplicationStore, SqliteStore};

pub const LEDGER_ENTRY: &str = "LedgerEntryAdded";
pub const NOW: i64 = 1_700_000_000_000;

/// Fresh database file under the temp dir
pub fn temp_db_url() -> String {
    let path = std::env::temp_dir().join(format!("txflow_it_{}.db", uuid::Uuid::new_v4()));
    format!("sqlite://{}", path.display())
}

/// Migrated pool with a `ledger` table for unit-of-work writes
pub async fn ledger_pool(url: &str) -> SqlitePool {
    let pool = create_pool(url).await.unwrap();
    run_migrations(&pool).await.unwrap();
    sqlx::query("CREATE TABLE IF NOT EXISTS ledger (id TEXT PRIMARY KEY, amount INTEGER NOT NULL)")
        .execute(&pool)
        .await
        .unwrap();
    pool
}

pub async fn ledger_ids(pool: &SqlitePool) -> Vec<String> {
    sqlx::query_scalar("SELECT id FROM ledger ORDER BY id")
        .fetch_all(pool)
        .await
        .unwrap()
}

/// Retries without delay so tests stay fast
pub fn fast_config(max_retries: u32) -> TransactionConfig {
    TransactionConfig::default().with_retry_policy(
        RetryPolicy::default()
            .with_max_retries(max_retries)
            .with_backoff(BackoffStrategy::Immediate),
    )
}

pub struct Outbox {
    pub pool: SqlitePool,
    pub publisher: RecordingPublisher,
    pub dedup: Arc<SqliteEventDeduplicationStore>,
    pub metrics: Arc<TransactionMetrics>,
    pub manager: TransactionManager<SqliteStore>,
}

/// Manager over `pool` with the events adapter and a persistent dedup store
pub fn outbox(pool: SqlitePool, publisher: RecordingPublisher) -> Outbox {
    let sink: Arc<dyn EventPublisher> = Arc::new(publisher.clone());
    outbox_publishing_to(pool, publisher, sink)
}

/// Like [`outbox`], but the adapter publishes through `sink`, which is
/// expected to forward to `publisher`
pub fn outbox_publishing_to(
    pool: SqlitePool,
    publisher: RecordingPublisher,
    sink: Arc<dyn EventPublisher>,
) -> Outbox {
    let dedup = Arc::new(SqliteEventDeduplicationStore::new(pool.clone()));
    let metrics = Arc::new(TransactionMetrics::new());
    let registry = Arc::new(AdapterRegistry::with_metrics(Arc::clone(&metrics)));
    registry.register(Arc::new(EventsAdapter::new(
        Arc::new(StaticHandlerRegistry::new().with_handler(LEDGER_ENTRY)),
        sink,
        dedup.clone(),
        Arc::new(FixedTimeProvider::new(NOW)),
    )));

    let manager = TransactionManager::new(Arc::new(SqliteStore::new(pool.clone())), registry)
        .with_metrics(Arc::clone(&metrics));

    Outbox {
        pool,
        publisher,
        dedup,
        metrics,
        manager,
    }
}
