// SQLite Transaction Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction as SqlxTransaction};
use tracing::debug;
use txflow_core::domain::IsolationLevel;
use txflow_core::error::Result;
use txflow_core::port::{Transaction, TransactionalStore};

/// Open SQLite transaction handed to the unit of work
///
/// Dropping it without commit rolls back (sqlx semantics).
pub struct SqliteTransaction {
    tx: SqlxTransaction<'static, Sqlite>,
}

impl SqliteTransaction {
    pub fn new(tx: SqlxTransaction<'static, Sqlite>) -> Self {
        Self { tx }
    }

    /// Connection to run queries on, e.g. `.execute(tx.conn())`
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }
}

#[async_trait]
impl Transaction for SqliteTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(map_sqlx_error)
    }
}

/// Pool-backed [`TransactionalStore`]
///
/// SQLite transactions are serializable. Every requested isolation level is
/// served by that, which meets or exceeds what was asked for.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl TransactionalStore for SqliteStore {
    type Tx = SqliteTransaction;

    async fn begin_transaction(&self, isolation: IsolationLevel) -> Result<Box<SqliteTransaction>> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        debug!(requested = %isolation, effective = "SERIALIZABLE", "SQLite transaction started");
        Ok(Box::new(SqliteTransaction::new(tx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create_pool;
    use crate::test_support::temp_db_url;

    async fn store_with_table() -> SqliteStore {
        let pool = create_pool(&temp_db_url()).await.unwrap();
        sqlx::query("CREATE TABLE items (name TEXT NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();
        SqliteStore::new(pool)
    }

    async fn count(store: &SqliteStore) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM items")
            .fetch_one(store.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_commit_persists() {
        let store = store_with_table().await;
        let mut tx = store
            .begin_transaction(IsolationLevel::Serializable)
            .await
            .unwrap();
        sqlx::query("INSERT INTO items (name) VALUES ('a')")
            .execute(tx.conn())
            .await
            .unwrap();
        tokio_test::assert_ok!(tx.commit().await);

        assert_eq!(count(&store).await, 1);
    }

    #[tokio::test]
    async fn test_rollback_and_drop_discard_writes() {
        let store = store_with_table().await;

        let mut tx = store
            .begin_transaction(IsolationLevel::ReadCommitted)
            .await
            .unwrap();
        sqlx::query("INSERT INTO items (name) VALUES ('a')")
            .execute(tx.conn())
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        let mut dropped = store
            .begin_transaction(IsolationLevel::ReadCommitted)
            .await
            .unwrap();
        sqlx::query("INSERT INTO items (name) VALUES ('b')")
            .execute(dropped.conn())
            .await
            .unwrap();
        drop(dropped);

        assert_eq!(count(&store).await, 0);
    }
}
