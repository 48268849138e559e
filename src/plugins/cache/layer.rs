//! Cache-aside layer over a cache backend
//!
//! Callers see a cache that never fails: backend errors are logged and
//! reported as misses (reads) or as "not stored" (writes). Request, hit and
//! miss counters are kept here so they reflect what callers experienced,
//! including reads that degraded because the backend was down.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::traits::{CachePlugin, Expiration};

/// Cache key layout shared by writers and invalidators
pub mod keys {
    use chrono::NaiveDate;

    pub const TEAMS_PREFIX: &str = "teams:";
    pub const GAMES_PREFIX: &str = "games:";
    pub const GAMES_RANGE_PREFIX: &str = "games:range:";

    pub fn teams_all() -> String {
        "teams:all".to_string()
    }

    pub fn games_on(date: NaiveDate) -> String {
        format!("games:date:{date}")
    }

    pub fn games_between(from: NaiveDate, to: NaiveDate) -> String {
        format!("games:range:{from}:{to}")
    }

    /// Prefix covering every cached date range for one team
    pub fn team_games_prefix(team_external_id: i64) -> String {
        format!("games:team:{team_external_id}:")
    }

    pub fn team_games(team_external_id: i64, from: NaiveDate, to: NaiveDate) -> String {
        format!("games:team:{team_external_id}:{from}:{to}")
    }

    pub fn game_stats(game_external_id: i64) -> String {
        format!("stats:game:{game_external_id}")
    }
}

/// Counters as seen by cache callers plus backend occupancy
///
/// `entries` and `total_bytes` are `None` when the backend cannot count them
/// cheaply (Redis).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStatistics {
    pub total_requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: Option<u64>,
    pub total_bytes: Option<u64>,
}

impl CacheStatistics {
    /// Hit rate as a percentage, 0 when there were no requests
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            (self.hits as f64 / self.total_requests as f64) * 100.0
        }
    }
}

pub struct CacheLayer {
    backend: Arc<dyn CachePlugin>,
    requests: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheLayer {
    pub fn new(backend: Arc<dyn CachePlugin>) -> Self {
        Self {
            backend,
            requests: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub async fn get(&self, key: &str) -> Option<Bytes> {
        self.requests.fetch_add(1, Ordering::Relaxed);

        match self.backend.get(key).await {
            Ok(Some(entry)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = key, "Cache hit");
                Some(entry.data)
            }
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = key, "Cache miss");
                None
            }
            Err(e) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                warn!(key = key, backend = self.backend.name(), error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    /// Returns whether the value was stored
    pub async fn set(&self, key: &str, value: Bytes, expiration: Expiration) -> bool {
        match self.backend.set(key, value, expiration).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key = key, backend = self.backend.name(), error = %e, "Cache write failed");
                false
            }
        }
    }

    pub async fn invalidate(&self, key: &str) -> bool {
        match self.backend.delete(key).await {
            Ok(existed) => existed,
            Err(e) => {
                warn!(key = key, error = %e, "Cache invalidation failed");
                false
            }
        }
    }

    /// Remove every key starting with `prefix`; returns how many were removed
    pub async fn invalidate_pattern(&self, prefix: &str) -> u64 {
        match self.backend.delete_prefix(prefix).await {
            Ok(removed) => {
                debug!(prefix = prefix, removed, "Invalidated cache prefix");
                removed
            }
            Err(e) => {
                warn!(prefix = prefix, error = %e, "Cache prefix invalidation failed");
                0
            }
        }
    }

    pub async fn purge_expired(&self) -> u64 {
        self.backend.purge_expired().await.unwrap_or_else(|e| {
            warn!(error = %e, "Purging expired cache entries failed");
            0
        })
    }

    pub async fn statistics(&self) -> CacheStatistics {
        let backend = self.backend.stats().await;
        CacheStatistics {
            total_requests: self.requests.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: backend.evictions,
            entries: backend.entries,
            total_bytes: backend.total_size_bytes,
        }
    }

    /// Read and decode a JSON value; undecodable entries are dropped
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await?;
        match serde_json::from_slice(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = key, error = %e, "Dropping undecodable cache entry");
                self.invalidate(key).await;
                None
            }
        }
    }

    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T, expiration: Expiration) -> bool {
        match serde_json::to_vec(value) {
            Ok(raw) => self.set(key, Bytes::from(raw), expiration).await,
            Err(e) => {
                warn!(key = key, error = %e, "Failed to encode cache value");
                false
            }
        }
    }
}
