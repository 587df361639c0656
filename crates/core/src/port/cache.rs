// Cache invalidation port
use crate::error::Result;
use async_trait::async_trait;

/// Cache owned by an external module
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    /// Evict the given keys
    async fn invalidate(&self, keys: &[String]) -> Result<()>;
}
