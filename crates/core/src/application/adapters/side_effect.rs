// Side-effect retry adapter - post-commit external calls with their own policy

use crate::application::constants::SIDE_EFFECT_ADAPTER_PRIORITY;
use crate::application::retry::{RetryDecision, RetryEvaluator};
use crate::domain::{RetryPolicy, TransactionEventContext, TransactionPhase};
use crate::error::{Result, TxError};
use crate::port::{SideEffect, TransactionAdapter};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{info, warn};

/// Runs a [`SideEffect`] at AFTER_COMMIT, retrying per its own policy
///
/// The transaction is already committed; an exhausted side effect is
/// reported as an adapter failure only.
pub struct SideEffectRetryAdapter {
    name: String,
    side_effect: Arc<dyn SideEffect>,
    policy: RetryPolicy,
}

impl SideEffectRetryAdapter {
    pub fn new(side_effect: Arc<dyn SideEffect>, policy: RetryPolicy) -> Self {
        Self {
            name: format!("side-effect:{}", side_effect.name()),
            side_effect,
            policy,
        }
    }

    async fn run(&self, context: &TransactionEventContext) -> Result<()> {
        let evaluator = RetryEvaluator::new(&self.policy);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match self.side_effect.execute(context).await {
                Ok(()) => {
                    if attempt > 1 {
                        info!(
                            side_effect = %self.side_effect.name(),
                            attempt,
                            "Side effect succeeded after retry"
                        );
                    }
                    return Ok(());
                }
                Err(e) => e,
            };

            match evaluator.decide(&err, attempt) {
                RetryDecision::Retry(delay) => {
                    warn!(
                        side_effect = %self.side_effect.name(),
                        attempt,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "Side effect failed, retrying"
                    );
                    sleep(delay).await;
                }
                RetryDecision::Exhausted => {
                    return Err(TxError::RetriesExhausted {
                        transaction_id: context.transaction_id().to_string(),
                        attempts: attempt,
                        total_retries: attempt - 1,
                        source: Box::new(err),
                    });
                }
                RetryDecision::NotRetryable => return Err(err),
            }
        }
    }
}

#[async_trait]
impl TransactionAdapter for SideEffectRetryAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        SIDE_EFFECT_ADAPTER_PRIORITY
    }

    async fn on_phase(&self, phase: TransactionPhase, context: &TransactionEventContext) -> Result<()> {
        if phase != TransactionPhase::AfterCommit {
            return Ok(());
        }
        self.run(context).await
    }
}
