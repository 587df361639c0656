// sqlx::Error -> TxError mapping

use txflow_core::error::TxError;

/// Convert sqlx::Error to TxError, keeping lock contention retryable
pub fn map_sqlx_error(err: sqlx::Error) -> TxError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message();
            match db_err.code().as_deref() {
                // SQLite result codes: https://www.sqlite.org/rescode.html
                // SQLITE_BUSY, SQLITE_LOCKED and their extended codes
                Some("5" | "6" | "261" | "262" | "517") => {
                    TxError::Deadlock(format!("Database locked: {}", message))
                }
                // UNIQUE / PRIMARY KEY constraint failed
                Some("2067" | "1555") => {
                    TxError::Conflict(format!("Unique constraint violation: {}", message))
                }
                Some(code) => TxError::Database(format!("Database error [{}]: {}", code, message)),
                None => TxError::Database(format!("Database error: {}", message)),
            }
        }
        sqlx::Error::PoolTimedOut => {
            TxError::Connection("Connection pool timed out".to_string())
        }
        sqlx::Error::PoolClosed => TxError::Connection("Connection pool closed".to_string()),
        sqlx::Error::Io(e) => TxError::Connection(format!("IO error: {}", e)),
        sqlx::Error::WorkerCrashed => {
            TxError::Connection("SQLite worker thread crashed".to_string())
        }
        sqlx::Error::RowNotFound => TxError::NotFound("Row not found".to_string()),
        _ => TxError::Database(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_transient() {
        assert!(map_sqlx_error(sqlx::Error::PoolTimedOut).is_transient());
        assert!(map_sqlx_error(sqlx::Error::PoolClosed).is_transient());
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            TxError::NotFound(_)
        ));
        assert!(!map_sqlx_error(sqlx::Error::Protocol("bad frame".into())).is_transient());
    }
}
