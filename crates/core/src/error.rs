// Central Error Type for the transaction engine

use crate::domain::ErrorKind;
use std::time::Duration;
use thiserror::Error;

/// Engine-level error type
///
/// Every failure that can end a transaction attempt is expressed here so the
/// retry classifier can reason about it through [`TxError::kind`].
#[derive(Error, Debug)]
pub enum TxError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authorization error: {0}")]
    Authorization(String),

    #[error("Transaction {transaction_id} timed out after {timeout:?} (attempt {attempt})")]
    Timeout {
        transaction_id: String,
        attempt: u32,
        timeout: Duration,
    },

    #[error("Deadlock detected: {0}")]
    Deadlock(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Transaction {transaction_id} cancelled: {reason}")]
    Cancelled {
        transaction_id: String,
        reason: String,
    },

    /// Application-defined failure tagged with a custom kind
    #[error("{kind}: {message}")]
    Business { kind: String, message: String },

    #[error(
        "Transaction {transaction_id} failed after {attempts} attempt(s) ({total_retries} retries): {source}"
    )]
    RetriesExhausted {
        transaction_id: String,
        attempts: u32,
        total_retries: u32,
        #[source]
        source: Box<TxError>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TxError {
    /// Build an application-defined error with a custom kind tag
    pub fn business(kind: impl Into<String>, message: impl Into<String>) -> Self {
        TxError::Business {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Classification tag used by retry policies
    pub fn kind(&self) -> ErrorKind {
        match self {
            TxError::Domain(_) | TxError::Validation(_) | TxError::Serialization(_) => {
                ErrorKind::Validation
            }
            TxError::Authorization(_) => ErrorKind::Authorization,
            TxError::Timeout { .. } => ErrorKind::Timeout,
            TxError::Deadlock(_) => ErrorKind::Deadlock,
            TxError::Connection(_) => ErrorKind::Connection,
            TxError::Io(_) => ErrorKind::Io,
            TxError::Database(_) => ErrorKind::Database,
            TxError::Config(_) => ErrorKind::Config,
            TxError::NotFound(_) => ErrorKind::NotFound,
            TxError::Conflict(_) | TxError::InvalidState(_) => ErrorKind::Conflict,
            TxError::Cancelled { .. } => ErrorKind::Cancelled,
            TxError::Business { kind, .. } => ErrorKind::Custom(kind.clone()),
            TxError::RetriesExhausted { source, .. } => source.kind(),
            TxError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Infrastructure faults (timeout, deadlock, connection, IO)
    pub fn is_transient(&self) -> bool {
        match self {
            TxError::RetriesExhausted { .. } => false,
            other => other.kind().is_transient(),
        }
    }

    /// Whether the error describes a condition worth retrying.
    ///
    /// For `RetriesExhausted` this reports whether the final cause was transient;
    /// the manager never retries an exhausted transaction again.
    pub fn is_retryable(&self) -> bool {
        match self {
            TxError::RetriesExhausted { source, .. } => source.is_transient(),
            other => other.is_transient(),
        }
    }

    /// Innermost cause (unwraps `RetriesExhausted`)
    pub fn root_cause(&self) -> &TxError {
        match self {
            TxError::RetriesExhausted { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Result type alias using TxError
pub type Result<T> = std::result::Result<T, TxError>;
