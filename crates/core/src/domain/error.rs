// Domain Error Types

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid operation status transition: {from} -> {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Operation not found: {0}")]
    OperationNotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;

/// Error classification tag consumed by retry policies
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Timeout,
    Deadlock,
    Connection,
    Io,
    Validation,
    Authorization,
    Conflict,
    NotFound,
    Database,
    Config,
    Cancelled,
    Internal,
    /// Application-defined kind (e.g. "PAYMENT_DECLINED")
    Custom(String),
}

impl ErrorKind {
    /// Infrastructure faults are always retryable regardless of policy sets
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::Deadlock | ErrorKind::Connection | ErrorKind::Io
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Deadlock => "DEADLOCK",
            ErrorKind::Connection => "CONNECTION",
            ErrorKind::Io => "IO",
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Authorization => "AUTHORIZATION",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Database => "DATABASE",
            ErrorKind::Config => "CONFIG",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::Internal => "INTERNAL",
            ErrorKind::Custom(tag) => tag,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = Infallible;

    /// Unknown tags become `Custom`, so settings files can name application kinds
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let kind = match s.trim().to_ascii_uppercase().as_str() {
            "TIMEOUT" => ErrorKind::Timeout,
            "DEADLOCK" => ErrorKind::Deadlock,
            "CONNECTION" => ErrorKind::Connection,
            "IO" => ErrorKind::Io,
            "VALIDATION" => ErrorKind::Validation,
            "AUTHORIZATION" => ErrorKind::Authorization,
            "CONFLICT" => ErrorKind::Conflict,
            "NOT_FOUND" => ErrorKind::NotFound,
            "DATABASE" => ErrorKind::Database,
            "CONFIG" => ErrorKind::Config,
            "CANCELLED" => ErrorKind::Cancelled,
            "INTERNAL" => ErrorKind::Internal,
            _ => ErrorKind::Custom(s.trim().to_string()),
        };
        Ok(kind)
    }
}
