// Transaction Manager - unit of work with phases, timeout, retry and undo

use crate::application::cancel::CancelToken;
use crate::application::metrics::{TransactionMetrics, TransactionOutcome, TransactionRecord};
use crate::application::registry::AdapterRegistry;
use crate::application::retry::{RetryDecision, RetryEvaluator};
use crate::application::undo::UndoEngine;
use crate::application::unit_of_work::{UnitOfWork, WorkflowScope};
use crate::domain::{
    TransactionConfig, TransactionEventContext, TransactionOperation, TransactionPhase,
};
use crate::error::{Result, TxError};
use crate::port::id_provider::UuidProvider;
use crate::port::{IdProvider, Transaction, TransactionAdapter, TransactionalStore};
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, warn};

/// Result of one successful attempt: block value and events pending at commit
type AttemptOutput<T> = (T, usize);

/// Per-call bookkeeping shared by all attempts
struct CallState {
    transaction_id: String,
    workflow_id: Option<String>,
    started: Instant,
    phases: Vec<TransactionPhase>,
    backoff_delays: Vec<Duration>,
    timeouts: u32,
}

/// Rolls back an attempt whose future is dropped before it commits or aborts
///
/// A caller-side timeout or `select!` drops the manager future at its current
/// await point. The store transaction then rolls back on drop; this guard
/// spawns the remaining compensation: undo of recorded operations, then
/// ON_ROLLBACK and AFTER_ROLLBACK.
struct AttemptGuard {
    registry: Arc<AdapterRegistry>,
    undo_engine: Option<Arc<UndoEngine>>,
    transaction_id: String,
    attempt: u32,
    workflow_id: Option<String>,
    recorded: Option<Arc<Mutex<Vec<TransactionOperation>>>>,
    armed: bool,
}

impl AttemptGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for AttemptGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let operations = self
            .recorded
            .as_ref()
            .map(|shared| std::mem::take(&mut *shared.lock().unwrap_or_else(|e| e.into_inner())))
            .unwrap_or_default();

        warn!(
            transaction_id = %self.transaction_id,
            attempt = self.attempt,
            operations = operations.len(),
            "Attempt dropped before completion, rolling back"
        );

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!(
                transaction_id = %self.transaction_id,
                "No runtime available; rollback phases of dropped attempt skipped"
            );
            return;
        };

        let registry = Arc::clone(&self.registry);
        let undo_engine = self.undo_engine.clone();
        let context = TransactionEventContext::new(
            self.transaction_id.clone(),
            self.attempt,
            self.workflow_id.clone(),
        );

        runtime.spawn(async move {
            if let (Some(engine), Some(workflow_id)) = (undo_engine, context.workflow_id()) {
                if !operations.is_empty() {
                    engine.undo_workflow(workflow_id, operations).await;
                }
            }
            for phase in [TransactionPhase::OnRollback, TransactionPhase::AfterRollback] {
                if let Err(e) = registry.execute_adapters(phase, &context, false).await {
                    warn!(phase = %phase, error = %e, "Phase dispatch failed");
                }
            }
        });
    }
}

/// Runs units of work against a [`TransactionalStore`]
///
/// Each call fires the lifecycle phases through the adapter registry, applies
/// the configured timeout and retry policy, and compensates recorded workflow
/// operations when an attempt fails.
pub struct TransactionManager<S: TransactionalStore> {
    store: Arc<S>,
    registry: Arc<AdapterRegistry>,
    undo_engine: Option<Arc<UndoEngine>>,
    metrics: Arc<TransactionMetrics>,
    id_provider: Arc<dyn IdProvider>,
}

impl<S: TransactionalStore> TransactionManager<S> {
    pub fn new(store: Arc<S>, registry: Arc<AdapterRegistry>) -> Self {
        Self {
            store,
            registry,
            undo_engine: None,
            metrics: Arc::new(TransactionMetrics::new()),
            id_provider: Arc::new(UuidProvider),
        }
    }

    /// Enable workflow recording and LIFO compensation
    pub fn with_undo_engine(mut self, undo_engine: Arc<UndoEngine>) -> Self {
        self.undo_engine = Some(undo_engine);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<TransactionMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Override transaction id generation (deterministic ids in tests)
    pub fn with_id_provider(mut self, id_provider: Arc<dyn IdProvider>) -> Self {
        self.id_provider = id_provider;
        self
    }

    pub fn add_adapter(&self, adapter: Arc<dyn TransactionAdapter>) {
        self.registry.register(adapter);
    }

    pub fn remove_adapter(&self, name: &str) -> bool {
        self.registry.unregister(name)
    }

    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<TransactionMetrics> {
        &self.metrics
    }

    pub fn undo_engine(&self) -> Option<&Arc<UndoEngine>> {
        self.undo_engine.as_ref()
    }

    /// Run `block` as a transaction
    ///
    /// # Arguments
    /// * `workflow_id` - Enables operation recording and undo on failure
    /// * `config` - Timeout, retry policy and isolation
    /// * `block` - Unit of work; called once per attempt
    ///
    /// # Errors
    /// - Non-retryable errors are returned as raised by the failing step
    /// - Retryable errors that exhaust the policy are wrapped in
    ///   TxError::RetriesExhausted
    /// - TxError::Config for an invalid config, or a workflow id without an
    ///   undo engine
    pub async fn transaction<T, F>(
        &self,
        workflow_id: Option<&str>,
        config: &TransactionConfig,
        block: F,
    ) -> Result<T>
    where
        T: Send,
        F: for<'a> FnMut(&'a mut UnitOfWork<S::Tx>) -> BoxFuture<'a, Result<T>> + Send,
    {
        self.execute(workflow_id, config, None, block).await
    }

    /// Same as [`transaction`](Self::transaction), aborted when `cancel` fires
    ///
    /// Cancellation is observed while the block runs and during backoff; the
    /// attempt is rolled back and TxError::Cancelled is returned.
    pub async fn transaction_with_cancel<T, F>(
        &self,
        workflow_id: Option<&str>,
        config: &TransactionConfig,
        cancel: CancelToken,
        block: F,
    ) -> Result<T>
    where
        T: Send,
        F: for<'a> FnMut(&'a mut UnitOfWork<S::Tx>) -> BoxFuture<'a, Result<T>> + Send,
    {
        self.execute(workflow_id, config, Some(cancel), block).await
    }

    async fn execute<T, F>(
        &self,
        workflow_id: Option<&str>,
        config: &TransactionConfig,
        mut cancel: Option<CancelToken>,
        mut block: F,
    ) -> Result<T>
    where
        T: Send,
        F: for<'a> FnMut(&'a mut UnitOfWork<S::Tx>) -> BoxFuture<'a, Result<T>> + Send,
    {
        config.validate()?;
        if workflow_id.is_some() && self.undo_engine.is_none() {
            return Err(TxError::Config(
                "Workflow transactions require an undo engine".to_string(),
            ));
        }

        let evaluator = RetryEvaluator::new(&config.retry_policy);
        let mut state = CallState {
            transaction_id: self.id_provider.generate_id(),
            workflow_id: workflow_id.map(str::to_string),
            started: Instant::now(),
            phases: Vec::new(),
            backoff_delays: Vec::new(),
            timeouts: 0,
        };

        info!(
            transaction_id = %state.transaction_id,
            workflow_id = ?state.workflow_id,
            isolation = %config.isolation,
            timeout_ms = config.timeout.as_millis() as u64,
            max_retries = config.retry_policy.max_retries,
            "Transaction started"
        );

        let mut attempt = 0;
        loop {
            attempt += 1;

            let err = match self
                .run_attempt(&mut state, attempt, config, &mut block, cancel.as_mut())
                .await
            {
                Ok((value, events)) => {
                    self.finish(state, TransactionOutcome::Committed, attempt, events, None)
                        .await;
                    return Ok(value);
                }
                Err(e) => e,
            };

            if matches!(err, TxError::Timeout { .. }) {
                state.timeouts += 1;
            }

            match evaluator.decide(&err, attempt) {
                RetryDecision::Retry(delay) => {
                    warn!(
                        transaction_id = %state.transaction_id,
                        attempt,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "Attempt failed, retrying"
                    );
                    state.backoff_delays.push(delay);

                    if let Some(token) = cancel.as_mut() {
                        tokio::select! {
                            biased;
                            _ = token.cancelled() => {
                                let cancelled = TxError::Cancelled {
                                    transaction_id: state.transaction_id.clone(),
                                    reason: "cancelled during backoff".to_string(),
                                };
                                self.finish(state, TransactionOutcome::Cancelled, attempt, 0, Some(&cancelled))
                                    .await;
                                return Err(cancelled);
                            }
                            _ = sleep(delay) => {}
                        }
                    } else {
                        sleep(delay).await;
                    }
                }
                RetryDecision::Exhausted => {
                    let exhausted = TxError::RetriesExhausted {
                        transaction_id: state.transaction_id.clone(),
                        attempts: attempt,
                        total_retries: attempt - 1,
                        source: Box::new(err),
                    };
                    error!(
                        transaction_id = %state.transaction_id,
                        attempts = attempt,
                        error = %exhausted,
                        "Transaction failed, retries exhausted"
                    );
                    self.finish(state, TransactionOutcome::RetriesExhausted, attempt, 0, Some(&exhausted))
                        .await;
                    return Err(exhausted);
                }
                RetryDecision::NotRetryable => {
                    let outcome = if matches!(err, TxError::Cancelled { .. }) {
                        TransactionOutcome::Cancelled
                    } else {
                        TransactionOutcome::RolledBack
                    };
                    error!(
                        transaction_id = %state.transaction_id,
                        attempt,
                        error = %err,
                        "Transaction rolled back"
                    );
                    self.finish(state, outcome, attempt, 0, Some(&err)).await;
                    return Err(err);
                }
            }
        }
    }

    async fn run_attempt<T, F>(
        &self,
        state: &mut CallState,
        attempt: u32,
        config: &TransactionConfig,
        block: &mut F,
        cancel: Option<&mut CancelToken>,
    ) -> Result<AttemptOutput<T>>
    where
        T: Send,
        F: for<'a> FnMut(&'a mut UnitOfWork<S::Tx>) -> BoxFuture<'a, Result<T>> + Send,
    {
        let context = TransactionEventContext::new(
            state.transaction_id.clone(),
            attempt,
            state.workflow_id.clone(),
        );
        let scope = match (&state.workflow_id, &self.undo_engine) {
            (Some(id), Some(engine)) => Some(engine.open_scope(id)),
            _ => None,
        };
        let mut guard = AttemptGuard {
            registry: Arc::clone(&self.registry),
            undo_engine: self.undo_engine.clone(),
            transaction_id: state.transaction_id.clone(),
            attempt,
            workflow_id: state.workflow_id.clone(),
            recorded: scope.as_ref().map(WorkflowScope::shared_recorded),
            armed: true,
        };

        debug!(transaction_id = %state.transaction_id, attempt, "Attempt started");
        self.fire(TransactionPhase::BeforeBegin, &context, &mut state.phases)
            .await;

        let tx = match self.store.begin_transaction(config.isolation).await {
            Ok(tx) => tx,
            Err(e) => {
                self.abort(None, context, scope, &mut state.phases).await;
                guard.disarm();
                return Err(e);
            }
        };

        self.fire(TransactionPhase::AfterBegin, &context, &mut state.phases)
            .await;

        let mut uow = UnitOfWork::new(tx, context, scope);
        let outcome = Self::run_block(&mut uow, block, config.timeout, cancel).await;
        let (tx, mut context, scope) = uow.into_parts();

        let value = match outcome {
            Ok(value) => value,
            Err(e) => {
                self.abort(Some(tx), context, scope, &mut state.phases).await;
                guard.disarm();
                return Err(e);
            }
        };

        state.phases.push(TransactionPhase::BeforeCommitValidation);
        if let Err(e) = self
            .registry
            .execute_adapters(TransactionPhase::BeforeCommitValidation, &context, true)
            .await
        {
            self.abort(Some(tx), context, scope, &mut state.phases).await;
            guard.disarm();
            return Err(e);
        }

        self.fire(TransactionPhase::BeforeCommit, &context, &mut state.phases)
            .await;

        if let Err(e) = tx.commit().await {
            // The store discards a transaction whose commit failed
            self.abort(None, context, scope, &mut state.phases).await;
            guard.disarm();
            return Err(e);
        }
        guard.disarm();

        if let (Some(scope), Some(engine)) = (scope, &self.undo_engine) {
            engine.commit_operations(scope.into_recorded()).await;
        }

        self.fire(TransactionPhase::AfterCommit, &context, &mut state.phases)
            .await;

        let events = context.clear();
        Ok((value, events))
    }

    async fn run_block<T, F>(
        uow: &mut UnitOfWork<S::Tx>,
        block: &mut F,
        limit: Duration,
        cancel: Option<&mut CancelToken>,
    ) -> Result<T>
    where
        F: for<'a> FnMut(&'a mut UnitOfWork<S::Tx>) -> BoxFuture<'a, Result<T>>,
    {
        let transaction_id = uow.transaction_id().to_string();
        let attempt = uow.attempt();
        let timed_out = || TxError::Timeout {
            transaction_id: transaction_id.clone(),
            attempt,
            timeout: limit,
        };

        let deadline = timeout(limit, block(uow));
        match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(TxError::Cancelled {
                    transaction_id: transaction_id.clone(),
                    reason: "cancelled by caller".to_string(),
                }),
                result = deadline => result.unwrap_or_else(|_| Err(timed_out())),
            },
            None => deadline.await.unwrap_or_else(|_| Err(timed_out())),
        }
    }

    /// Failure path: undo, ON_ROLLBACK, rollback, AFTER_ROLLBACK, clear
    async fn abort(
        &self,
        tx: Option<Box<S::Tx>>,
        mut context: TransactionEventContext,
        scope: Option<WorkflowScope>,
        phases: &mut Vec<TransactionPhase>,
    ) {
        if let (Some(scope), Some(engine)) = (scope, &self.undo_engine) {
            let workflow_id = scope.workflow_id().to_string();
            let operations = scope.into_recorded();
            if !operations.is_empty() {
                engine.undo_workflow(&workflow_id, operations).await;
            }
        }

        self.fire(TransactionPhase::OnRollback, &context, phases).await;

        if let Some(tx) = tx {
            if let Err(e) = tx.rollback().await {
                warn!(
                    transaction_id = %context.transaction_id(),
                    error = %e,
                    "Rollback failed"
                );
            }
        }

        self.fire(TransactionPhase::AfterRollback, &context, phases)
            .await;

        let discarded = context.clear();
        if discarded > 0 {
            debug!(
                transaction_id = %context.transaction_id(),
                discarded,
                "Discarded pending events"
            );
        }
    }

    /// Dispatch a non-vetoing phase
    async fn fire(
        &self,
        phase: TransactionPhase,
        context: &TransactionEventContext,
        phases: &mut Vec<TransactionPhase>,
    ) {
        phases.push(phase);
        if let Err(e) = self.registry.execute_adapters(phase, context, false).await {
            warn!(phase = %phase, error = %e, "Phase dispatch failed");
        }
    }

    async fn finish(
        &self,
        state: CallState,
        outcome: TransactionOutcome,
        attempts: u32,
        events_enqueued: usize,
        err: Option<&TxError>,
    ) {
        self.metrics
            .record_transaction(TransactionRecord {
                transaction_id: state.transaction_id,
                workflow_id: state.workflow_id,
                outcome,
                attempts,
                timeouts: state.timeouts,
                backoff_delays: state.backoff_delays,
                phases: state.phases,
                events_enqueued,
                duration: state.started.elapsed(),
                error: err.map(|e| e.to_string()),
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::cancel::cancel_channel;
    use crate::application::registry::mocks::{CallLog, RecordingAdapter};
    use crate::application::unit_of_work::OperationDraft;
    use crate::domain::{
        BackoffStrategy, DomainEvent, ErrorKind, OperationStatus, OperationType, RetryPolicy,
        TransactionOperation,
    };
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::time_provider::mocks::FixedTimeProvider;
    use crate::port::transaction::mocks::MockStore;
    use crate::port::{InMemoryOperationLog, OperationLog, UndoStrategy};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct Harness {
        store: MockStore,
        log: CallLog,
        metrics: Arc<TransactionMetrics>,
        manager: TransactionManager<MockStore>,
    }

    fn harness() -> Harness {
        let store = MockStore::new();
        let log = CallLog::default();
        let metrics = Arc::new(TransactionMetrics::new());
        let registry = Arc::new(AdapterRegistry::with_metrics(Arc::clone(&metrics)));
        registry.register(Arc::new(RecordingAdapter::new("recorder", 1, log.clone())));

        let manager = TransactionManager::new(Arc::new(store.clone()), registry)
            .with_metrics(Arc::clone(&metrics))
            .with_id_provider(Arc::new(SequentialIdProvider::new("tx")));

        Harness {
            store,
            log,
            metrics,
            manager,
        }
    }

    fn recorded_phases(log: &CallLog) -> Vec<String> {
        log.lock()
            .unwrap()
            .iter()
            .filter_map(|e| e.strip_prefix("recorder:").map(str::to_string))
            .collect()
    }

    fn linear_config(max_retries: u32) -> TransactionConfig {
        TransactionConfig::default().with_retry_policy(
            RetryPolicy::default()
                .with_max_retries(max_retries)
                .with_backoff(BackoffStrategy::Linear)
                .with_delays(Duration::from_millis(100), Duration::from_secs(30))
                .with_jitter(0.0),
        )
    }

    #[tokio::test]
    async fn test_commit_fires_success_phases_in_order() {
        let h = harness();

        let value = h
            .manager
            .transaction(None, &TransactionConfig::default(), |uow| {
                Box::pin(async move {
                    uow.tx().write("order-1");
                    uow.enqueue_event(DomainEvent::new("e1", "OrderPlaced", json!({}), 1));
                    Ok(42)
                })
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(
            recorded_phases(&h.log),
            vec![
                "BEFORE_BEGIN",
                "AFTER_BEGIN",
                "BEFORE_COMMIT_VALIDATION",
                "BEFORE_COMMIT",
                "AFTER_COMMIT"
            ]
        );
        assert_eq!(h.store.journal(), vec!["begin:READ_COMMITTED", "commit"]);
        assert_eq!(h.store.committed_writes(), vec!["order-1"]);

        let record = h.metrics.transaction("tx-1").await.unwrap();
        assert_eq!(record.outcome, TransactionOutcome::Committed);
        assert_eq!(record.attempts, 1);
        assert_eq!(record.events_enqueued, 1);
        assert_eq!(record.phases.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_linear_backoff_retries_then_wraps_error() {
        let h = harness();
        let calls = Arc::new(AtomicU32::new(0));

        let started = Instant::now();
        let err = h
            .manager
            .transaction(None, &linear_config(2), |_uow| {
                let calls = Arc::clone(&calls);
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(TxError::Deadlock("victim".into()))
                })
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_millis(300));
        match err {
            TxError::RetriesExhausted {
                attempts,
                total_retries,
                source,
                ..
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(total_retries, 2);
                assert!(matches!(*source, TxError::Deadlock(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let record = h.metrics.transaction("tx-1").await.unwrap();
        assert_eq!(record.outcome, TransactionOutcome::RetriesExhausted);
        assert_eq!(
            record.backoff_delays,
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
        assert_eq!(h.store.count("rollback"), 3);
        assert_eq!(h.store.count("commit"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_linear_backoff_succeeds_on_third_attempt() {
        let h = harness();
        let calls = Arc::new(AtomicU32::new(0));

        let value = h
            .manager
            .transaction(None, &linear_config(2), |uow| {
                let calls = Arc::clone(&calls);
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    if uow.attempt() < 3 {
                        return Err(TxError::Deadlock("victim".into()));
                    }
                    Ok(uow.attempt())
                })
            })
            .await
            .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let record = h.metrics.transaction("tx-1").await.unwrap();
        assert_eq!(record.outcome, TransactionOutcome::Committed);
        assert_eq!(record.attempts, 3);
        assert_eq!(
            record.backoff_delays,
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
        assert_eq!(h.store.count("rollback"), 2);
        assert_eq!(h.store.count("commit"), 1);
    }

    #[tokio::test]
    async fn test_non_retryable_runs_once_and_is_unwrapped() {
        let h = harness();
        let calls = Arc::new(AtomicU32::new(0));

        let err = h
            .manager
            .transaction(None, &TransactionConfig::default(), |uow| {
                let calls = Arc::clone(&calls);
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    uow.enqueue_event(DomainEvent::new("e1", "OrderPlaced", json!({}), 1));
                    Err::<(), _>(TxError::Validation("amount must be positive".into()))
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(err, TxError::Validation(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            recorded_phases(&h.log),
            vec!["BEFORE_BEGIN", "AFTER_BEGIN", "ON_ROLLBACK", "AFTER_ROLLBACK"]
        );
        assert_eq!(h.store.journal(), vec!["begin:READ_COMMITTED", "rollback"]);
        assert_eq!(
            h.metrics.transaction("tx-1").await.unwrap().outcome,
            TransactionOutcome::RolledBack
        );
    }

    #[tokio::test]
    async fn test_validation_veto_prevents_before_commit() {
        let h = harness();
        h.manager.add_adapter(Arc::new(
            RecordingAdapter::new("validator", 50, h.log.clone())
                .failing_on(TransactionPhase::BeforeCommitValidation),
        ));

        let err = h
            .manager
            .transaction(None, &TransactionConfig::default(), |_uow| {
                Box::pin(async { Ok(()) })
            })
            .await
            .unwrap_err();

        assert!(matches!(err, TxError::Validation(_)));
        let entries = h.log.lock().unwrap().clone();
        assert!(entries.contains(&"validator:BEFORE_COMMIT_VALIDATION".to_string()));
        assert!(!entries.contains(&"recorder:BEFORE_COMMIT_VALIDATION".to_string()));
        assert!(!entries.iter().any(|e| e.ends_with(":BEFORE_COMMIT")));
        assert!(entries.contains(&"recorder:AFTER_ROLLBACK".to_string()));
        assert_eq!(h.store.count("commit"), 0);

        assert!(h.manager.remove_adapter("validator"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_retried_and_succeeds() {
        let h = harness();
        let config = linear_config(1).with_timeout(Duration::from_millis(50));

        let value = h
            .manager
            .transaction(None, &config, |uow| {
                Box::pin(async move {
                    if uow.attempt() == 1 {
                        sleep(Duration::from_secs(5)).await;
                    }
                    Ok(uow.attempt())
                })
            })
            .await
            .unwrap();

        assert_eq!(value, 2);
        let record = h.metrics.transaction("tx-1").await.unwrap();
        assert_eq!(record.timeouts, 1);
        assert_eq!(record.attempts, 2);
        assert_eq!(
            h.store.journal(),
            vec![
                "begin:READ_COMMITTED",
                "rollback",
                "begin:READ_COMMITTED",
                "commit"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_error_carries_context() {
        let h = harness();
        let config = TransactionConfig::default()
            .with_timeout(Duration::from_millis(10))
            .with_retry_policy(RetryPolicy::no_retry());

        let err = h
            .manager
            .transaction(None, &config, |_uow| {
                Box::pin(async {
                    sleep(Duration::from_secs(1)).await;
                    Ok(())
                })
            })
            .await
            .unwrap_err();

        match err {
            TxError::RetriesExhausted { source, .. } => match *source {
                TxError::Timeout {
                    transaction_id,
                    attempt,
                    timeout,
                } => {
                    assert_eq!(transaction_id, "tx-1");
                    assert_eq!(attempt, 1);
                    assert_eq!(timeout, Duration::from_millis(10));
                }
                other => panic!("unexpected source: {other:?}"),
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_begin_failure_is_retried() {
        let h = harness();
        h.store.fail_next_begins(1);

        h.manager
            .transaction(None, &linear_config(1), |_uow| Box::pin(async { Ok(()) }))
            .await
            .unwrap();

        assert_eq!(
            h.store.journal(),
            vec!["begin_failed", "begin:READ_COMMITTED", "commit"]
        );
        let phases = recorded_phases(&h.log);
        assert_eq!(&phases[..3], ["BEFORE_BEGIN", "ON_ROLLBACK", "AFTER_ROLLBACK"]);
    }

    #[tokio::test]
    async fn test_commit_failure_rolls_back_phases_without_rollback_call() {
        let h = harness();
        h.store.fail_commits(true);
        let config = TransactionConfig::default().with_retry_policy(RetryPolicy::no_retry());

        let err = h
            .manager
            .transaction(None, &config, |_uow| Box::pin(async { Ok(()) }))
            .await
            .unwrap_err();

        assert!(matches!(err, TxError::Database(_)));
        assert_eq!(h.store.journal(), vec!["begin:READ_COMMITTED", "commit_failed"]);
        assert_eq!(recorded_phases(&h.log).last().unwrap(), "AFTER_ROLLBACK");
    }

    #[tokio::test]
    async fn test_custom_kind_retry_policy() {
        let h = harness();
        let config = TransactionConfig::default().with_retry_policy(
            RetryPolicy::default()
                .with_max_retries(1)
                .with_backoff(BackoffStrategy::Immediate)
                .retry_on(ErrorKind::Custom("STALE_QUOTE".into())),
        );

        let value = h
            .manager
            .transaction(None, &config, |uow| {
                Box::pin(async move {
                    if uow.attempt() == 1 {
                        return Err(TxError::business("STALE_QUOTE", "quote expired"));
                    }
                    Ok("priced")
                })
            })
            .await
            .unwrap();
        assert_eq!(value, "priced");
    }

    #[tokio::test]
    async fn test_cancel_rolls_back_and_is_not_retried() {
        let h = harness();
        let (handle, token) = cancel_channel();

        let err = h
            .manager
            .transaction_with_cancel(None, &linear_config(3), token, |_uow| {
                handle.cancel();
                Box::pin(async {
                    sleep(Duration::from_secs(60)).await;
                    Ok(())
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(err, TxError::Cancelled { .. }));
        assert_eq!(h.store.journal(), vec!["begin:READ_COMMITTED", "rollback"]);
        assert_eq!(
            h.metrics.transaction("tx-1").await.unwrap().outcome,
            TransactionOutcome::Cancelled
        );
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_begin() {
        let h = harness();
        let config = TransactionConfig::default().with_timeout(Duration::ZERO);

        let err = h
            .manager
            .transaction(None, &config, |_uow| Box::pin(async { Ok(()) }))
            .await
            .unwrap_err();
        assert!(matches!(err, TxError::Config(_)));

        let err = h
            .manager
            .transaction(Some("wf-1"), &TransactionConfig::default(), |_uow| {
                Box::pin(async { Ok(()) })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TxError::Config(_)));
        assert!(h.store.journal().is_empty());
    }

    struct CountingUndo {
        undone: Arc<Mutex<Vec<i64>>>,
    }

    #[async_trait]
    impl UndoStrategy for CountingUndo {
        fn can_handle(&self, _operation_type: &OperationType, _resource_type: &str) -> bool {
            true
        }

        async fn undo(&self, operation: &TransactionOperation) -> Result<bool> {
            self.undone.lock().unwrap().push(operation.operation_index);
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_workflow_failure_undoes_attempt_operations() {
        let h = harness();
        let op_log = Arc::new(InMemoryOperationLog::new());
        let engine = Arc::new(UndoEngine::new(
            op_log.clone(),
            Arc::new(FixedTimeProvider::new(1_000)),
        ));
        let undone = Arc::new(Mutex::new(Vec::new()));
        engine.register_strategy(Arc::new(CountingUndo {
            undone: undone.clone(),
        }));
        let manager = h.manager.with_undo_engine(engine);

        let err = manager
            .transaction(Some("wf-1"), &TransactionConfig::default(), |uow| {
                Box::pin(async move {
                    uow.record_operation(OperationDraft::new(OperationType::Insert, "order", "o-1"))
                        .await?;
                    uow.record_operation(OperationDraft::new(OperationType::Update, "stock", "s-1"))
                        .await?;
                    Err::<(), _>(TxError::Validation("payment declined".into()))
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(err, TxError::Validation(_)));
        assert_eq!(*undone.lock().unwrap(), vec![1, 0]);
        let statuses: Vec<_> = op_log
            .find_by_workflow("wf-1")
            .await
            .unwrap()
            .iter()
            .map(|op| op.status)
            .collect();
        assert_eq!(statuses, vec![OperationStatus::Undone, OperationStatus::Undone]);
    }

    #[tokio::test]
    async fn test_workflow_commit_marks_operations_committed() {
        let h = harness();
        let op_log = Arc::new(InMemoryOperationLog::new());
        let engine = Arc::new(UndoEngine::new(
            op_log.clone(),
            Arc::new(FixedTimeProvider::new(1_000)),
        ));
        let manager = h.manager.with_undo_engine(engine);

        manager
            .transaction(Some("wf-2"), &TransactionConfig::default(), |uow| {
                Box::pin(async move {
                    let op = uow
                        .record_operation(OperationDraft::new(OperationType::Insert, "order", "o-9"))
                        .await?;
                    assert_eq!(uow.recorded_operations().len(), 1);
                    assert_eq!(op.status, OperationStatus::Pending);
                    Ok(())
                })
            })
            .await
            .unwrap();

        let stored = op_log.find_by_workflow("wf-2").await.unwrap();
        assert_eq!(stored[0].status, OperationStatus::Committed);
        assert_eq!(
            manager.metrics().transaction("tx-1").await.unwrap().workflow_id.as_deref(),
            Some("wf-2")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_timeout_rolls_back_dropped_attempt() {
        let h = harness();
        let op_log = Arc::new(InMemoryOperationLog::new());
        let engine = Arc::new(UndoEngine::new(
            op_log.clone(),
            Arc::new(FixedTimeProvider::new(1_000)),
        ));
        let undone = Arc::new(Mutex::new(Vec::new()));
        engine.register_strategy(Arc::new(CountingUndo {
            undone: undone.clone(),
        }));
        let manager = h.manager.with_undo_engine(engine);

        let config = TransactionConfig::default();
        let call = manager.transaction(Some("wf-slow"), &config, |uow| {
            Box::pin(async move {
                uow.record_operation(OperationDraft::new(OperationType::Insert, "order", "o-1"))
                    .await?;
                sleep(Duration::from_secs(10)).await;
                Ok(())
            })
        });
        let elapsed = tokio::time::timeout(Duration::from_secs(1), call).await;
        assert!(elapsed.is_err());

        // Let the spawned compensation run
        sleep(Duration::from_millis(10)).await;

        assert_eq!(
            recorded_phases(&h.log),
            vec!["BEFORE_BEGIN", "AFTER_BEGIN", "ON_ROLLBACK", "AFTER_ROLLBACK"]
        );
        assert_eq!(*undone.lock().unwrap(), vec![0]);
        let stored = op_log.find_by_workflow("wf-slow").await.unwrap();
        assert_eq!(stored[0].status, OperationStatus::Undone);
        assert_eq!(h.store.count("commit"), 0);
    }

    #[tokio::test]
    async fn test_completed_attempt_fires_rollback_phases_once() {
        let h = harness();

        let _ = h
            .manager
            .transaction(None, &TransactionConfig::default(), |_uow| {
                Box::pin(async { Err::<(), _>(TxError::Validation("rejected".into())) })
            })
            .await;
        tokio::task::yield_now().await;

        let phases = recorded_phases(&h.log);
        assert_eq!(phases.iter().filter(|p| *p == "ON_ROLLBACK").count(), 1);
        assert_eq!(phases.iter().filter(|p| *p == "AFTER_ROLLBACK").count(), 1);
    }
}
