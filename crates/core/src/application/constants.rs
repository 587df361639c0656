// Engine constants (no magic values)
use std::time::Duration;

/// Priority of the persistence bookkeeping adapter (runs first)
pub const PERSISTENCE_ADAPTER_PRIORITY: i32 = 100;

/// Priority of the events adapter (validation + outbox publish)
pub const EVENTS_ADAPTER_PRIORITY: i32 = 50;

/// Priority of the cache invalidation adapter
pub const CACHE_ADAPTER_PRIORITY: i32 = 20;

/// Priority of side-effect retry adapters (run last, after events are out)
pub const SIDE_EFFECT_ADAPTER_PRIORITY: i32 = 10;

/// Records kept per kind by the metrics collector
pub const DEFAULT_METRICS_CAPACITY: usize = 10_000;

/// Pause after a failed dedup cleanup before the next tick
pub const CLEANUP_ERROR_BACKOFF: Duration = Duration::from_secs(60);
