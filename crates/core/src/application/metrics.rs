// Transaction metrics (per-transaction and per-adapter records)

use crate::domain::TransactionPhase;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::application::constants::DEFAULT_METRICS_CAPACITY;

/// Final outcome of a `transaction(...)` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionOutcome {
    Committed,
    /// Non-retryable failure, rolled back and surfaced unwrapped
    RolledBack,
    RetriesExhausted,
    Cancelled,
}

/// One `transaction(...)` call across all of its attempts
#[derive(Debug, Clone, Serialize)]
pub struct TransactionRecord {
    pub transaction_id: String,
    pub workflow_id: Option<String>,
    pub outcome: TransactionOutcome,
    pub attempts: u32,
    /// Attempts that ended because the block exceeded its deadline
    pub timeouts: u32,
    /// Backoff slept between attempt k and k+1
    pub backoff_delays: Vec<Duration>,
    /// Every phase fired, in order, across all attempts
    pub phases: Vec<TransactionPhase>,
    /// Events pending at commit time of the successful attempt
    pub events_enqueued: usize,
    pub duration: Duration,
    pub error: Option<String>,
}

/// One adapter invocation
#[derive(Debug, Clone, Serialize)]
pub struct AdapterRecord {
    pub transaction_id: String,
    pub attempt: u32,
    pub adapter: String,
    pub phase: TransactionPhase,
    pub duration: Duration,
    pub success: bool,
    pub error: Option<String>,
}

/// Aggregated counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSummary {
    pub transactions: usize,
    pub committed: usize,
    pub rolled_back: usize,
    pub retries_exhausted: usize,
    pub cancelled: usize,
    pub total_attempts: u64,
    pub adapter_invocations: usize,
    pub adapter_failures: usize,
}

/// In-memory metrics collector
///
/// Keeps the most recent records (bounded) and mirrors each one as a
/// structured tracing event.
pub struct TransactionMetrics {
    capacity: usize,
    transactions: RwLock<VecDeque<TransactionRecord>>,
    adapters: RwLock<VecDeque<AdapterRecord>>,
}

impl Default for TransactionMetrics {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_METRICS_CAPACITY)
    }
}

impl TransactionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `capacity` records of each kind
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            transactions: RwLock::new(VecDeque::new()),
            adapters: RwLock::new(VecDeque::new()),
        }
    }

    pub async fn record_transaction(&self, record: TransactionRecord) {
        info!(
            transaction_id = %record.transaction_id,
            workflow_id = ?record.workflow_id,
            outcome = ?record.outcome,
            attempts = record.attempts,
            timeouts = record.timeouts,
            events = record.events_enqueued,
            duration_ms = record.duration.as_millis() as u64,
            "Transaction finished"
        );

        let mut transactions = self.transactions.write().await;
        if transactions.len() == self.capacity {
            transactions.pop_front();
        }
        transactions.push_back(record);
    }

    pub async fn record_adapter(&self, record: AdapterRecord) {
        debug!(
            transaction_id = %record.transaction_id,
            adapter = %record.adapter,
            phase = %record.phase,
            success = record.success,
            duration_us = record.duration.as_micros() as u64,
            "Adapter executed"
        );

        let mut adapters = self.adapters.write().await;
        if adapters.len() == self.capacity {
            adapters.pop_front();
        }
        adapters.push_back(record);
    }

    pub async fn transactions(&self) -> Vec<TransactionRecord> {
        self.transactions.read().await.iter().cloned().collect()
    }

    /// Record of a specific transaction id
    pub async fn transaction(&self, transaction_id: &str) -> Option<TransactionRecord> {
        self.transactions
            .read()
            .await
            .iter()
            .find(|r| r.transaction_id == transaction_id)
            .cloned()
    }

    pub async fn adapter_records(&self) -> Vec<AdapterRecord> {
        self.adapters.read().await.iter().cloned().collect()
    }

    pub async fn summary(&self) -> MetricsSummary {
        let transactions = self.transactions.read().await;
        let adapters = self.adapters.read().await;

        let mut summary = MetricsSummary {
            transactions: transactions.len(),
            adapter_invocations: adapters.len(),
            adapter_failures: adapters.iter().filter(|a| !a.success).count(),
            ..MetricsSummary::default()
        };

        for record in transactions.iter() {
            summary.total_attempts += u64::from(record.attempts);
            match record.outcome {
                TransactionOutcome::Committed => summary.committed += 1,
                TransactionOutcome::RolledBack => summary.rolled_back += 1,
                TransactionOutcome::RetriesExhausted => summary.retries_exhausted += 1,
                TransactionOutcome::Cancelled => summary.cancelled += 1,
            }
        }

        summary
    }

    pub async fn reset(&self) {
        self.transactions.write().await.clear();
        self.adapters.write().await.clear();
    }
}
