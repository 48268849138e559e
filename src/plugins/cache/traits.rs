//! Cache plugin trait and related types
//!
//! This module defines the CachePlugin trait that all cache backends implement,
//! as well as the associated types like CacheEntry, CacheMeta, and CacheStats.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::CacheError;

/// How an entry's lifetime is counted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "ttl_ms")]
pub enum Expiration {
    /// Expires `ttl` after it was written
    #[serde(with = "duration_ms")]
    Absolute(Duration),
    /// Expires `ttl` after it was last read or written
    #[serde(with = "duration_ms")]
    Sliding(Duration),
}

impl Expiration {
    pub fn ttl(&self) -> Duration {
        match self {
            Expiration::Absolute(ttl) | Expiration::Sliding(ttl) => *ttl,
        }
    }

    pub fn is_sliding(&self) -> bool {
        matches!(self, Expiration::Sliding(_))
    }

    /// Absolute or sliding depending on configuration
    pub fn for_ttl(ttl: Duration, sliding: bool) -> Self {
        if sliding {
            Expiration::Sliding(ttl)
        } else {
            Expiration::Absolute(ttl)
        }
    }
}

/// Serde helper for Duration as milliseconds
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

/// A cached entry containing data and metadata
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub data: Bytes,
    pub meta: CacheMeta,
}

/// Metadata associated with a cache entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    /// Size of the cached data in bytes
    pub size: u64,
    pub expiration: Expiration,
    /// When the entry was written
    pub created_at: DateTime<Utc>,
}

impl CacheMeta {
    pub fn new(size: u64, expiration: Expiration) -> Self {
        Self {
            size,
            expiration,
            created_at: Utc::now(),
        }
    }
}

/// Backend-side occupancy
///
/// Hit and miss counting belongs to the cache layer. Backends that cannot
/// count their entries without walking a shared keyspace report `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Total number of cached entries
    pub entries: Option<u64>,
    /// Total size of all cached data in bytes
    pub total_size_bytes: Option<u64>,
    /// Number of evictions due to size limits
    pub evictions: u64,
}

/// Trait for cache backends
///
/// Backends report failures as `CacheError`; the cache layer above them turns
/// those into misses so callers never see a backend outage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CachePlugin: Send + Sync {
    fn name(&self) -> &str;

    /// Returns `Ok(None)` for absent or expired entries; expired entries are removed
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Stores data, replacing any existing entry
    async fn set(&self, key: &str, data: Bytes, expiration: Expiration) -> Result<(), CacheError>;

    /// Removes one entry; returns whether it existed
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Removes every entry whose key starts with `prefix`
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError>;

    async fn stats(&self) -> CacheStats;

    /// Removes everything
    async fn purge(&self) -> Result<(), CacheError>;

    /// Removes expired entries; returns how many
    async fn purge_expired(&self) -> Result<u64, CacheError>;
}
