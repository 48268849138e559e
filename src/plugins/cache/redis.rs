//! Redis-based cache implementation
//!
//! Each entry is a hash under `<prefix><key>` with fields `data`, `ttl_ms`,
//! `sliding` and `created_ms`; expiry is delegated to Redis via PEXPIRE.
//! Sliding entries get their PEXPIRE refreshed on every hit.
//!
//! The keyspace is shared with other instances and expired by Redis, so
//! occupancy is not counted; `stats` never talks to the server.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use redis::aio::ConnectionManager;
use tracing::debug;

use crate::config::RedisCacheConfig;
use crate::error::CacheError;
use crate::plugins::connector::{escape_glob, RedisConnector};

use super::traits::{CacheEntry, CacheMeta, CachePlugin, CacheStats, Expiration};

const SCAN_BATCH: usize = 200;

/// Redis-backed cache shared between instances
pub struct RedisCache {
    connector: Arc<RedisConnector>,
    prefix: String,
    op_timeout: Duration,
}

impl RedisCache {
    pub fn new(config: &RedisCacheConfig) -> Result<Self, CacheError> {
        let connector = RedisConnector::new(
            &config.url,
            Duration::from_millis(config.connect_timeout_ms),
        )?;
        Ok(Self::with_connector(
            Arc::new(connector),
            &config.prefix,
            Duration::from_millis(config.op_timeout_ms),
        ))
    }

    pub fn with_connector(connector: Arc<RedisConnector>, prefix: &str, op_timeout: Duration) -> Self {
        Self {
            connector,
            prefix: prefix.to_string(),
            op_timeout,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn make_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Run one round trip against a connection under the op timeout
    async fn with_conn<T, F, Fut>(&self, op: F) -> Result<T, CacheError>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: Future<Output = Result<T, CacheError>>,
    {
        let work = async {
            let conn = self.connector.connection().await?;
            op(conn).await
        };

        match tokio::time::timeout(self.op_timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Unavailable(format!(
                "redis operation timed out after {}ms",
                self.op_timeout.as_millis()
            ))),
        }
    }

    /// Collect all stored keys starting with `prefix` (already namespaced)
    async fn scan_keys(conn: &mut ConnectionManager, pattern: &str) -> Result<Vec<String>, CacheError> {
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(keys)
    }

    fn pattern_for(&self, prefix: &str) -> String {
        format!("{}*", escape_glob(&self.make_key(prefix)))
    }
}

#[async_trait]
impl CachePlugin for RedisCache {
    fn name(&self) -> &str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let redis_key = self.make_key(key);

        self.with_conn(|mut conn| async move {
            let (data, ttl_ms, sliding, created_ms): (
                Option<Vec<u8>>,
                Option<u64>,
                Option<u8>,
                Option<i64>,
            ) = redis::cmd("HMGET")
                .arg(&redis_key)
                .arg("data")
                .arg("ttl_ms")
                .arg("sliding")
                .arg("created_ms")
                .query_async(&mut conn)
                .await?;

            let Some(data) = data else {
                return Ok(None);
            };

            let ttl = Duration::from_millis(ttl_ms.unwrap_or(0));
            let sliding = sliding.unwrap_or(0) == 1;
            if sliding && !ttl.is_zero() {
                let _: i64 = redis::cmd("PEXPIRE")
                    .arg(&redis_key)
                    .arg(ttl.as_millis() as u64)
                    .query_async(&mut conn)
                    .await?;
            }

            let mut meta = CacheMeta::new(data.len() as u64, Expiration::for_ttl(ttl, sliding));
            if let Some(created) = created_ms.and_then(|ms| Utc.timestamp_millis_opt(ms).single()) {
                meta.created_at = created;
            }

            Ok(Some(CacheEntry {
                data: Bytes::from(data),
                meta,
            }))
        })
        .await
    }

    async fn set(&self, key: &str, data: Bytes, expiration: Expiration) -> Result<(), CacheError> {
        let redis_key = self.make_key(key);
        let ttl_ms = expiration.ttl().as_millis() as u64;

        self.with_conn(|mut conn| async move {
            if ttl_ms == 0 {
                let _: i64 = redis::cmd("DEL").arg(&redis_key).query_async(&mut conn).await?;
                return Ok(());
            }

            let _: () = redis::pipe()
                .atomic()
                .cmd("DEL")
                .arg(&redis_key)
                .ignore()
                .cmd("HSET")
                .arg(&redis_key)
                .arg("data")
                .arg(data.as_ref())
                .arg("ttl_ms")
                .arg(ttl_ms)
                .arg("sliding")
                .arg(u8::from(expiration.is_sliding()))
                .arg("created_ms")
                .arg(Utc::now().timestamp_millis())
                .ignore()
                .cmd("PEXPIRE")
                .arg(&redis_key)
                .arg(ttl_ms)
                .ignore()
                .query_async(&mut conn)
                .await?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let redis_key = self.make_key(key);
        self.with_conn(|mut conn| async move {
            let removed: i64 = redis::cmd("DEL").arg(&redis_key).query_async(&mut conn).await?;
            Ok(removed > 0)
        })
        .await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let pattern = self.pattern_for(prefix);

        self.with_conn(|mut conn| async move {
            let keys = Self::scan_keys(&mut conn, &pattern).await?;
            let mut removed = 0u64;
            for chunk in keys.chunks(SCAN_BATCH) {
                let n: i64 = redis::cmd("DEL").arg(chunk.to_vec()).query_async(&mut conn).await?;
                removed += n.max(0) as u64;
            }
            debug!(pattern = %pattern, removed, "Deleted cache keys by prefix");
            Ok(removed)
        })
        .await
    }

    async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: None,
            total_size_bytes: None,
            evictions: 0,
        }
    }

    async fn purge(&self) -> Result<(), CacheError> {
        self.delete_prefix("").await.map(|_| ())
    }

    async fn purge_expired(&self) -> Result<u64, CacheError> {
        // Redis drops expired keys itself
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_cache() -> RedisCache {
        RedisCache::new(&RedisCacheConfig {
            url: "redis://127.0.0.1:1/".to_string(),
            prefix: "test:".to_string(),
            connect_timeout_ms: 200,
            op_timeout_ms: 500,
        })
        .unwrap()
    }

    // Test 1: Key prefixing and scan patterns
    #[test]
    fn test_key_prefixing() {
        let cache = unreachable_cache();
        assert_eq!(cache.name(), "redis");
        assert_eq!(cache.prefix(), "test:");
        assert_eq!(cache.make_key("teams:all"), "test:teams:all");
        assert_eq!(cache.pattern_for("games:date:"), "test:games:date:*");
        assert_eq!(cache.pattern_for("odd*"), "test:odd\\**");
    }

    // Test 2: Unreachable redis surfaces as an unavailable backend
    #[tokio::test]
    async fn test_unreachable_is_unavailable() {
        let cache = unreachable_cache();
        let result = cache.get("teams:all").await;
        assert!(matches!(result, Err(CacheError::Unavailable(_))));

        let result = cache
            .set("teams:all", Bytes::from("[]"), Expiration::Absolute(Duration::from_secs(5)))
            .await;
        assert!(matches!(result, Err(CacheError::Unavailable(_))));
    }

    // Test 3: Stats answer without a round trip and claim no occupancy
    #[tokio::test]
    async fn test_stats_skip_the_server() {
        let cache = unreachable_cache();
        let stats = tokio::time::timeout(Duration::from_millis(50), cache.stats())
            .await
            .unwrap();
        assert_eq!(stats.entries, None);
        assert_eq!(stats.total_size_bytes, None);
        assert_eq!(stats.evictions, 0);
    }

    // Test 4: Expiry is Redis' job
    #[tokio::test]
    async fn test_purge_expired_is_noop() {
        let cache = unreachable_cache();
        assert_eq!(cache.purge_expired().await.unwrap(), 0);
    }
}
