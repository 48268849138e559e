//! Cache plugins for league-sync
//!
//! Backends implement `CachePlugin`; `CacheLayer` sits on top and turns
//! backend failures into misses. The default backend is in-process memory,
//! with Redis for deployments that share a cache between instances.

pub mod layer;
pub mod traits;

mod memory;
mod redis;

pub use layer::{keys, CacheLayer, CacheStatistics};
pub use traits::{CacheEntry, CacheMeta, CachePlugin, CacheStats, Expiration};

#[cfg(test)]
pub use traits::MockCachePlugin;

pub use memory::MemoryCache;
pub use redis::RedisCache;

use std::sync::Arc;

use crate::config::{CacheBackendKind, CacheConfig};
use crate::error::CacheError;

/// Build the configured backend
pub fn build_backend(config: &CacheConfig) -> Result<Arc<dyn CachePlugin>, CacheError> {
    let backend: Arc<dyn CachePlugin> = match config.backend {
        CacheBackendKind::Memory => Arc::new(MemoryCache::new(config.max_size_bytes())),
        CacheBackendKind::Redis => Arc::new(RedisCache::new(&config.redis)?),
    };
    Ok(backend)
}
