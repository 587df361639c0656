// Transaction Phase Model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of a transaction attempt
///
/// Success path: BEFORE_BEGIN → AFTER_BEGIN → BEFORE_COMMIT_VALIDATION →
/// BEFORE_COMMIT → AFTER_COMMIT. Failure path: ON_ROLLBACK → AFTER_ROLLBACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionPhase {
    BeforeBegin,
    AfterBegin,
    BeforeCommitValidation,
    BeforeCommit,
    AfterCommit,
    OnRollback,
    AfterRollback,
}

impl TransactionPhase {
    /// Success path in firing order
    pub const SUCCESS_PATH: [TransactionPhase; 5] = [
        TransactionPhase::BeforeBegin,
        TransactionPhase::AfterBegin,
        TransactionPhase::BeforeCommitValidation,
        TransactionPhase::BeforeCommit,
        TransactionPhase::AfterCommit,
    ];

    /// Failure path in firing order
    pub const FAILURE_PATH: [TransactionPhase; 2] =
        [TransactionPhase::OnRollback, TransactionPhase::AfterRollback];

    pub fn is_success_path(&self) -> bool {
        !self.is_failure_path()
    }

    pub fn is_failure_path(&self) -> bool {
        matches!(
            self,
            TransactionPhase::OnRollback | TransactionPhase::AfterRollback
        )
    }

    /// AFTER_COMMIT and AFTER_ROLLBACK end an attempt
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionPhase::AfterCommit | TransactionPhase::AfterRollback
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionPhase::BeforeBegin => "BEFORE_BEGIN",
            TransactionPhase::AfterBegin => "AFTER_BEGIN",
            TransactionPhase::BeforeCommitValidation => "BEFORE_COMMIT_VALIDATION",
            TransactionPhase::BeforeCommit => "BEFORE_COMMIT",
            TransactionPhase::AfterCommit => "AFTER_COMMIT",
            TransactionPhase::OnRollback => "ON_ROLLBACK",
            TransactionPhase::AfterRollback => "AFTER_ROLLBACK",
        }
    }
}

impl fmt::Display for TransactionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_disjoint() {
        for phase in TransactionPhase::SUCCESS_PATH {
            assert!(phase.is_success_path());
        }
        for phase in TransactionPhase::FAILURE_PATH {
            assert!(phase.is_failure_path());
        }
    }

    #[test]
    fn test_terminal_phases() {
        assert!(TransactionPhase::AfterCommit.is_terminal());
        assert!(TransactionPhase::AfterRollback.is_terminal());
        assert!(!TransactionPhase::OnRollback.is_terminal());
        assert_eq!(
            TransactionPhase::BeforeCommitValidation.to_string(),
            "BEFORE_COMMIT_VALIDATION"
        );
    }
}
