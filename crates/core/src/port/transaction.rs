// Transaction port: the pluggable persistence commit/rollback primitive

use crate::domain::IsolationLevel;
use crate::error::Result;
use async_trait::async_trait;

/// Underlying persistence transaction
#[async_trait]
pub trait Transaction: Send {
    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Store that can open persistence transactions
///
/// The unit of work receives `&mut Self::Tx` and uses its store-specific API
/// for reads and writes.
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    type Tx: Transaction + 'static;

    /// Begin a new transaction with the requested isolation level
    async fn begin_transaction(&self, isolation: IsolationLevel) -> Result<Box<Self::Tx>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::TxError;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct StoreState {
        journal: Vec<String>,
        committed: Vec<String>,
        failing_begins: u32,
        fail_commits: bool,
    }

    /// In-memory store journaling begin/commit/rollback calls
    #[derive(Clone, Default)]
    pub struct MockStore {
        state: Arc<Mutex<StoreState>>,
    }

    impl MockStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make the next `n` begins fail with a connection error
        pub fn fail_next_begins(&self, n: u32) {
            self.state.lock().unwrap().failing_begins = n;
        }

        pub fn fail_commits(&self, fail: bool) {
            self.state.lock().unwrap().fail_commits = fail;
        }

        /// Calls in order: "begin:READ_COMMITTED", "commit", "rollback", ...
        pub fn journal(&self) -> Vec<String> {
            self.state.lock().unwrap().journal.clone()
        }

        /// Writes of committed transactions
        pub fn committed_writes(&self) -> Vec<String> {
            self.state.lock().unwrap().committed.clone()
        }

        pub fn count(&self, entry_prefix: &str) -> usize {
            self.state
                .lock()
                .unwrap()
                .journal
                .iter()
                .filter(|e| e.starts_with(entry_prefix))
                .count()
        }
    }

    /// Transaction buffering writes until commit
    pub struct MockTransaction {
        state: Arc<Mutex<StoreState>>,
        writes: Vec<String>,
    }

    impl MockTransaction {
        pub fn write(&mut self, value: impl Into<String>) {
            self.writes.push(value.into());
        }

        pub fn writes(&self) -> &[String] {
            &self.writes
        }
    }

    #[async_trait]
    impl Transaction for MockTransaction {
        async fn commit(self: Box<Self>) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            if state.fail_commits {
                state.journal.push("commit_failed".to_string());
                return Err(TxError::Database("commit failed".to_string()));
            }
            state.journal.push("commit".to_string());
            state.committed.extend(self.writes.iter().cloned());
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> Result<()> {
            self.state
                .lock()
                .unwrap()
                .journal
                .push("rollback".to_string());
            Ok(())
        }
    }

    #[async_trait]
    impl TransactionalStore for MockStore {
        type Tx = MockTransaction;

        async fn begin_transaction(&self, isolation: IsolationLevel) -> Result<Box<MockTransaction>> {
            let mut state = self.state.lock().unwrap();
            if state.failing_begins > 0 {
                state.failing_begins -= 1;
                state.journal.push("begin_failed".to_string());
                return Err(TxError::Connection("connection refused".to_string()));
            }
            state.journal.push(format!("begin:{}", isolation));
            Ok(Box::new(MockTransaction {
                state: Arc::clone(&self.state),
                writes: Vec::new(),
            }))
        }
    }
}
