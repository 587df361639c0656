// Transaction configuration value objects

use crate::domain::error::ErrorKind;
use crate::error::{Result, TxError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

/// Default transaction timeout (30s)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default retry count (total attempts = 4)
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default first backoff delay (1s)
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Default backoff cap (30s)
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Default ±10% jitter
pub const DEFAULT_JITTER_FACTOR: f64 = 0.1;

/// Default retention for published event ids (7 days)
pub const DEFAULT_DEDUP_RETENTION: Duration = Duration::from_secs(7 * 24 * 3600);

/// Default interval between dedup cleanups (1 hour)
pub const DEFAULT_DEDUP_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// Isolation level requested from the persistence layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsolationLevel::ReadUncommitted => write!(f, "READ_UNCOMMITTED"),
            IsolationLevel::ReadCommitted => write!(f, "READ_COMMITTED"),
            IsolationLevel::RepeatableRead => write!(f, "REPEATABLE_READ"),
            IsolationLevel::Serializable => write!(f, "SERIALIZABLE"),
        }
    }
}

/// Delay growth between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackoffStrategy {
    #[default]
    Exponential,
    Linear,
    Immediate,
}

/// Retry policy for a transaction (or a single side effect)
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: BackoffStrategy,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Fractional variance applied to every delay (0.0 - 1.0)
    pub jitter_factor: f64,
    /// Kinds retried on top of the intrinsically transient ones
    pub retryable: HashSet<ErrorKind>,
    /// Deny-list; wins over `retryable` when both name a kind
    pub non_retryable: HashSet<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: BackoffStrategy::Exponential,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter_factor: DEFAULT_JITTER_FACTOR,
            retryable: HashSet::new(),
            non_retryable: [ErrorKind::Validation, ErrorKind::Authorization]
                .into_iter()
                .collect(),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_delays(mut self, initial_delay: Duration, max_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor;
        self
    }

    pub fn retry_on(mut self, kind: ErrorKind) -> Self {
        self.retryable.insert(kind);
        self
    }

    pub fn never_retry_on(mut self, kind: ErrorKind) -> Self {
        self.non_retryable.insert(kind);
        self
    }

    /// Total attempts including the first
    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Kinds listed in both sets (the deny-list wins for these)
    pub fn overlapping_kinds(&self) -> Vec<&ErrorKind> {
        self.retryable.intersection(&self.non_retryable).collect()
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(TxError::Config(format!(
                "jitter_factor must be within 0.0..=1.0, got {}",
                self.jitter_factor
            )));
        }
        if self.max_delay < self.initial_delay {
            return Err(TxError::Config(format!(
                "max_delay ({:?}) must not be below initial_delay ({:?})",
                self.max_delay, self.initial_delay
            )));
        }
        let overlap = self.overlapping_kinds();
        if !overlap.is_empty() {
            tracing::warn!(
                kinds = ?overlap,
                "Retry policy lists kinds as both retryable and non-retryable; non-retryable wins"
            );
        }
        Ok(())
    }
}

/// Immutable configuration of one `transaction(...)` call
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionConfig {
    pub timeout: Duration,
    pub retry_policy: RetryPolicy,
    pub isolation: IsolationLevel,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retry_policy: RetryPolicy::default(),
            isolation: IsolationLevel::ReadCommitted,
        }
    }
}

impl TransactionConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(TxError::Config("timeout must be greater than zero".into()));
        }
        self.retry_policy.validate()
    }
}

/// Serializable transaction settings (flat millisecond fields).
///
/// Loaded by the composition root and converted into a validated
/// [`TransactionConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionSettings {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub backoff: BackoffStrategy,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
    pub isolation: IsolationLevel,
    pub retryable: Vec<String>,
    pub non_retryable: Vec<String>,
}

impl Default for TransactionSettings {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: BackoffStrategy::Exponential,
            initial_delay_ms: DEFAULT_INITIAL_DELAY.as_millis() as u64,
            max_delay_ms: DEFAULT_MAX_DELAY.as_millis() as u64,
            jitter_factor: DEFAULT_JITTER_FACTOR,
            isolation: IsolationLevel::ReadCommitted,
            retryable: Vec::new(),
            non_retryable: vec!["VALIDATION".to_string(), "AUTHORIZATION".to_string()],
        }
    }
}

impl TryFrom<TransactionSettings> for TransactionConfig {
    type Error = TxError;

    fn try_from(settings: TransactionSettings) -> Result<Self> {
        let parse_kinds = |tags: &[String]| -> HashSet<ErrorKind> {
            tags.iter()
                .filter_map(|tag| tag.parse::<ErrorKind>().ok())
                .collect()
        };

        let config = TransactionConfig {
            timeout: Duration::from_millis(settings.timeout_ms),
            retry_policy: RetryPolicy {
                max_retries: settings.max_retries,
                backoff: settings.backoff,
                initial_delay: Duration::from_millis(settings.initial_delay_ms),
                max_delay: Duration::from_millis(settings.max_delay_ms),
                jitter_factor: settings.jitter_factor,
                retryable: parse_kinds(&settings.retryable),
                non_retryable: parse_kinds(&settings.non_retryable),
            },
            isolation: settings.isolation,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Which event deduplication store backs the outbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DedupStoreKind {
    /// Process-local map (lost on restart, bounded by cleanup)
    Memory,
    /// Persistent store (production default)
    #[default]
    Sqlite,
    /// Never remembers anything (test environments)
    Noop,
}

/// Serializable dedup store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupSettings {
    pub store: DedupStoreKind,
    pub retention_ms: u64,
    pub cleanup_interval_ms: u64,
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            store: DedupStoreKind::default(),
            retention_ms: DEFAULT_DEDUP_RETENTION.as_millis() as u64,
            cleanup_interval_ms: DEFAULT_DEDUP_CLEANUP_INTERVAL.as_millis() as u64,
        }
    }
}

impl DedupSettings {
    pub fn retention(&self) -> Duration {
        Duration::from_millis(self.retention_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documented_defaults() {
        let config = TransactionConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.isolation, IsolationLevel::ReadCommitted);

        let policy = &config.retry_policy;
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.total_attempts(), 4);
        assert_eq!(policy.backoff, BackoffStrategy::Exponential);
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
        assert!((policy.jitter_factor - 0.1).abs() < f64::EPSILON);
        assert!(policy.non_retryable.contains(&ErrorKind::Validation));
        assert!(policy.non_retryable.contains(&ErrorKind::Authorization));
    }

    #[test]
    fn test_validate_rejects_bad_jitter_and_delays() {
        let policy = RetryPolicy::default().with_jitter(1.5);
        assert!(policy.validate().is_err());

        let policy = RetryPolicy::default()
            .with_delays(Duration::from_secs(5), Duration::from_secs(1));
        assert!(policy.validate().is_err());

        let config = TransactionConfig::default().with_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(TxError::Config(_))));
    }

    #[test]
    fn test_settings_conversion() {
        let settings = TransactionSettings {
            timeout_ms: 5_000,
            max_retries: 2,
            backoff: BackoffStrategy::Linear,
            retryable: vec!["conflict".into(), "PAYMENT_GATEWAY".into()],
            ..TransactionSettings::default()
        };

        let config = TransactionConfig::try_from(settings).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.retry_policy.backoff, BackoffStrategy::Linear);
        assert!(config.retry_policy.retryable.contains(&ErrorKind::Conflict));
        assert!(config
            .retry_policy
            .retryable
            .contains(&ErrorKind::Custom("PAYMENT_GATEWAY".into())));
    }

    #[test]
    fn test_settings_deserialize_with_defaults() {
        let settings: TransactionSettings =
            serde_json::from_str(r#"{"max_retries": 5, "isolation": "SERIALIZABLE"}"#).unwrap();
        assert_eq!(settings.max_retries, 5);
        assert_eq!(settings.isolation, IsolationLevel::Serializable);
        assert_eq!(settings.timeout_ms, 30_000);

        let dedup: DedupSettings = serde_json::from_str(r#"{"store": "noop"}"#).unwrap();
        assert_eq!(dedup.store, DedupStoreKind::Noop);
        assert_eq!(dedup.retention(), DEFAULT_DEDUP_RETENTION);
    }

    #[test]
    fn test_overlap_detected() {
        let policy = RetryPolicy::default().retry_on(ErrorKind::Validation);
        assert_eq!(policy.overlapping_kinds(), vec![&ErrorKind::Validation]);
        assert!(policy.validate().is_ok());
    }
}
