//! In-process cache implementation
//!
//! Entries live in a map guarded by a tokio `RwLock`. The total payload size
//! is bounded; when a write would exceed the bound, expired entries go first,
//! then least recently used ones.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::error::CacheError;

use super::traits::{CacheEntry, CacheMeta, CachePlugin, CacheStats, Expiration};

struct Slot {
    data: Bytes,
    meta: CacheMeta,
    expires_at: Instant,
    last_accessed: Instant,
}

impl Slot {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Slot>,
    total_size: u64,
    evictions: u64,
}

impl CacheState {
    fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(slot) => {
                self.total_size = self.total_size.saturating_sub(slot.meta.size);
                true
            }
            None => false,
        }
    }

    fn remove_expired(&mut self, now: Instant) -> u64 {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, slot)| slot.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();

        for key in &expired {
            self.remove(key);
        }
        expired.len() as u64
    }

    /// Evict least recently used entries until `required` more bytes fit
    fn evict_lru(&mut self, required: u64, max_size: u64) {
        while self.total_size + required > max_size {
            let lru_key = self
                .entries
                .iter()
                .min_by_key(|(_, slot)| slot.last_accessed)
                .map(|(k, _)| k.clone());

            match lru_key {
                Some(key) => {
                    self.remove(&key);
                    self.evictions += 1;
                    debug!(key = %key, "Evicted cache entry");
                }
                None => break,
            }
        }
    }
}

/// Size-bounded in-memory cache
pub struct MemoryCache {
    max_size_bytes: u64,
    state: Arc<RwLock<CacheState>>,
}

impl MemoryCache {
    pub fn new(max_size_bytes: u64) -> Self {
        Self {
            max_size_bytes,
            state: Arc::new(RwLock::new(CacheState::default())),
        }
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }
}

#[async_trait]
impl CachePlugin for MemoryCache {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let now = Instant::now();
        let mut state = self.state.write().await;

        let expired = match state.entries.get(key) {
            Some(slot) => slot.is_expired(now),
            None => return Ok(None),
        };

        if expired {
            state.remove(key);
            return Ok(None);
        }

        let slot = match state.entries.get_mut(key) {
            Some(slot) => slot,
            None => return Ok(None),
        };
        slot.last_accessed = now;
        if let Expiration::Sliding(ttl) = slot.meta.expiration {
            slot.expires_at = now + ttl;
        }

        Ok(Some(CacheEntry {
            data: slot.data.clone(),
            meta: slot.meta.clone(),
        }))
    }

    async fn set(&self, key: &str, data: Bytes, expiration: Expiration) -> Result<(), CacheError> {
        let size = data.len() as u64;
        let now = Instant::now();
        let mut state = self.state.write().await;

        state.remove(key);

        if size > self.max_size_bytes {
            debug!(key = key, size, "Entry larger than cache, not storing");
            return Ok(());
        }

        if state.total_size + size > self.max_size_bytes {
            state.remove_expired(now);
            state.evict_lru(size, self.max_size_bytes);
        }

        state.total_size += size;
        state.entries.insert(
            key.to_string(),
            Slot {
                data,
                meta: CacheMeta::new(size, expiration),
                expires_at: now + expiration.ttl(),
                last_accessed: now,
            },
        );

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut state = self.state.write().await;
        Ok(state.remove(key))
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let mut state = self.state.write().await;
        let keys: Vec<String> = state
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();

        for key in &keys {
            state.remove(key);
        }
        Ok(keys.len() as u64)
    }

    async fn stats(&self) -> CacheStats {
        let state = self.state.read().await;
        CacheStats {
            entries: Some(state.entries.len() as u64),
            total_size_bytes: Some(state.total_size),
            evictions: state.evictions,
        }
    }

    async fn purge(&self) -> Result<(), CacheError> {
        let mut state = self.state.write().await;
        state.entries.clear();
        state.total_size = 0;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, CacheError> {
        let mut state = self.state.write().await;
        Ok(state.remove_expired(Instant::now()))
    }
}
