// Retry classification and backoff
use crate::domain::{BackoffStrategy, RetryPolicy};
use crate::error::TxError;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the given (jittered) backoff
    Retry(Duration),
    /// Retryable, but no attempts remain
    Exhausted,
    /// Permanent failure, surface unwrapped
    NotRetryable,
}

/// Evaluates errors and delays against a [`RetryPolicy`]
///
/// Classification:
/// - Timeout, deadlock, connection and IO faults are always retryable
/// - Otherwise the error kind must be in `retryable` and not in `non_retryable`
/// - Cancellation and already-exhausted errors are never retried
pub struct RetryEvaluator<'a> {
    policy: &'a RetryPolicy,
}

impl<'a> RetryEvaluator<'a> {
    pub fn new(policy: &'a RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn is_retryable(&self, error: &TxError) -> bool {
        if matches!(
            error,
            TxError::Cancelled { .. } | TxError::RetriesExhausted { .. }
        ) {
            return false;
        }
        if error.is_transient() {
            return true;
        }

        let kind = error.kind();
        self.policy.retryable.contains(&kind) && !self.policy.non_retryable.contains(&kind)
    }

    /// Undecorated delay after attempt `attempt` (1-indexed), capped at `max_delay`
    ///
    /// EXPONENTIAL: initial * 2^(n-1); LINEAR: initial * n; IMMEDIATE: 0
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let n = attempt.max(1);
        let delay = match self.policy.backoff {
            BackoffStrategy::Exponential => self
                .policy
                .initial_delay
                .saturating_mul(2u32.saturating_pow(n - 1)),
            BackoffStrategy::Linear => self.policy.initial_delay.saturating_mul(n),
            BackoffStrategy::Immediate => Duration::ZERO,
        };
        delay.min(self.policy.max_delay)
    }

    /// Delay with multiplicative jitter `delay * (1 ± jitter_factor)`, still capped
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let jitter = self.policy.jitter_factor.clamp(0.0, 1.0);
        if base.is_zero() || jitter == 0.0 {
            return base;
        }

        let factor = 1.0 + rand::thread_rng().gen_range(-jitter..=jitter);
        Duration::try_from_secs_f64(base.as_secs_f64() * factor)
            .unwrap_or(self.policy.max_delay)
            .min(self.policy.max_delay)
    }

    /// Decide what to do after attempt `attempt` failed with `error`
    pub fn decide(&self, error: &TxError, attempt: u32) -> RetryDecision {
        if !self.is_retryable(error) {
            debug!(kind = %error.kind(), attempt, "Error is not retryable");
            return RetryDecision::NotRetryable;
        }

        if attempt >= self.policy.total_attempts() {
            warn!(
                kind = %error.kind(),
                attempt,
                max_retries = self.policy.max_retries,
                "Max retry attempts reached"
            );
            return RetryDecision::Exhausted;
        }

        let delay = self.delay_for_attempt(attempt);
        debug!(
            kind = %error.kind(),
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Scheduling retry"
        );
        RetryDecision::Retry(delay)
    }
}
