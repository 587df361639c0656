// txflow Infrastructure - SQLite Adapter
// Implements: TransactionalStore, EventDeduplicationStore, OperationLog

mod connection;
mod dedup_store;
mod error;
mod migration;
mod operation_log;
mod transaction;

pub use connection::create_pool;
pub use dedup_store::SqliteEventDeduplicationStore;
pub use error::map_sqlx_error;
pub use migration::run_migrations;
pub use operation_log::SqliteOperationLog;
pub use transaction::{SqliteStore, SqliteTransaction};

// Note: sqlx::Error conversion is handled by map_sqlx_error
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for TxError here)

#[cfg(test)]
pub(crate) mod test_support {
    /// File-backed database in the temp dir (WAL needs a real file)
    pub fn temp_db_url() -> String {
        let path = std::env::temp_dir().join(format!("txflow_test_{}.db", uuid::Uuid::new_v4()));
        format!("sqlite://{}", path.display())
    }
}
