// Adapter Registry - priority-ordered phase dispatch

use crate::application::metrics::{AdapterRecord, TransactionMetrics};
use crate::domain::{TransactionEventContext, TransactionPhase};
use crate::error::Result;
use crate::port::TransactionAdapter;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::{debug, info, warn};

type AdapterList = Arc<Vec<Arc<dyn TransactionAdapter>>>;

/// Holds adapters ordered by priority (descending, ties in registration order)
///
/// Copy-on-write: every dispatch iterates a snapshot, so concurrent
/// register/unregister calls never disturb a phase already in progress.
pub struct AdapterRegistry {
    adapters: RwLock<AdapterList>,
    metrics: Option<Arc<TransactionMetrics>>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: RwLock::new(Arc::new(Vec::new())),
            metrics: None,
        }
    }

    /// Report every adapter invocation to the metrics collector
    pub fn with_metrics(metrics: Arc<TransactionMetrics>) -> Self {
        Self {
            adapters: RwLock::new(Arc::new(Vec::new())),
            metrics: Some(metrics),
        }
    }

    /// Add an adapter and re-sort by priority
    pub fn register(&self, adapter: Arc<dyn TransactionAdapter>) {
        let mut guard = self.adapters.write().unwrap_or_else(|e| e.into_inner());

        if guard.iter().any(|a| a.name() == adapter.name()) {
            warn!(adapter = %adapter.name(), "Adapter with this name already registered");
        }

        let mut next: Vec<_> = guard.as_ref().clone();
        next.push(Arc::clone(&adapter));
        // sort_by is stable: equal priorities keep registration order
        next.sort_by(|a, b| b.priority().cmp(&a.priority()));
        *guard = Arc::new(next);

        info!(
            adapter = %adapter.name(),
            priority = adapter.priority(),
            total = guard.len(),
            "Transaction adapter registered"
        );
    }

    /// Remove every adapter with the given name
    ///
    /// # Returns
    /// true if at least one adapter was removed
    pub fn unregister(&self, name: &str) -> bool {
        let mut guard = self.adapters.write().unwrap_or_else(|e| e.into_inner());
        let next: Vec<_> = guard
            .iter()
            .filter(|a| a.name() != name)
            .cloned()
            .collect();
        let removed = next.len() != guard.len();
        *guard = Arc::new(next);

        if removed {
            info!(adapter = %name, "Transaction adapter unregistered");
        }
        removed
    }

    /// Snapshot of the current adapters in dispatch order
    pub fn adapters(&self) -> Vec<Arc<dyn TransactionAdapter>> {
        self.snapshot().as_ref().clone()
    }

    pub fn clear(&self) {
        let mut guard = self.adapters.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(Vec::new());
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    fn snapshot(&self) -> AdapterList {
        let guard = self.adapters.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Dispatch a phase to every adapter in priority order
    ///
    /// With `fail_fast == false` adapter errors are logged and skipped, and
    /// this always returns `Ok(())`. With `fail_fast == true` the first error
    /// stops the phase and is returned.
    pub async fn execute_adapters(
        &self,
        phase: TransactionPhase,
        context: &TransactionEventContext,
        fail_fast: bool,
    ) -> Result<()> {
        let adapters = self.snapshot();
        debug!(
            transaction_id = %context.transaction_id(),
            phase = %phase,
            adapters = adapters.len(),
            "Dispatching phase"
        );

        for adapter in adapters.iter() {
            let started = Instant::now();
            let result = adapter.on_phase(phase, context).await;
            let elapsed = started.elapsed();

            if let Some(metrics) = &self.metrics {
                metrics
                    .record_adapter(AdapterRecord {
                        transaction_id: context.transaction_id().to_string(),
                        attempt: context.attempt(),
                        adapter: adapter.name().to_string(),
                        phase,
                        duration: elapsed,
                        success: result.is_ok(),
                        error: result.as_ref().err().map(|e| e.to_string()),
                    })
                    .await;
            }

            if let Err(e) = result {
                if fail_fast {
                    warn!(
                        transaction_id = %context.transaction_id(),
                        adapter = %adapter.name(),
                        phase = %phase,
                        error = %e,
                        "Adapter vetoed phase"
                    );
                    return Err(e);
                }

                warn!(
                    transaction_id = %context.transaction_id(),
                    adapter = %adapter.name(),
                    phase = %phase,
                    error = %e,
                    "Adapter failed, continuing with remaining adapters"
                );
            }
        }

        Ok(())
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::TxError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Shared log of `adapter:PHASE` entries across several recording adapters
    pub type CallLog = Arc<Mutex<Vec<String>>>;

    /// Adapter that appends `name:PHASE` to a shared log and can fail on demand
    pub struct RecordingAdapter {
        name: String,
        priority: i32,
        log: CallLog,
        fail_on: Mutex<Vec<TransactionPhase>>,
    }

    impl RecordingAdapter {
        pub fn new(name: impl Into<String>, priority: i32, log: CallLog) -> Self {
            Self {
                name: name.into(),
                priority,
                log,
                fail_on: Mutex::new(Vec::new()),
            }
        }

        /// Fail with a validation error whenever `phase` fires
        pub fn failing_on(self, phase: TransactionPhase) -> Self {
            self.fail_on.lock().unwrap().push(phase);
            self
        }
    }

    #[async_trait]
    impl TransactionAdapter for RecordingAdapter {
        fn name(&self) -> &str {
            &self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        async fn on_phase(
            &self,
            phase: TransactionPhase,
            _context: &TransactionEventContext,
        ) -> Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, phase));
            if self.fail_on.lock().unwrap().contains(&phase) {
                return Err(TxError::Validation(format!(
                    "{} rejected {}",
                    self.name, phase
                )));
            }
            Ok(())
        }
    }
}
