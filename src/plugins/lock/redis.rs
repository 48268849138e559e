//! Redis lock backend
//!
//! Claims use `SET key token NX PX lease`; release is a compare-and-delete
//! script so a holder whose lease already expired cannot drop someone else's.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use tracing::debug;

use super::traits::LockBackend;
use crate::error::LockError;
use crate::plugins::connector::RedisConnector;

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

pub struct RedisLockBackend {
    connector: Arc<RedisConnector>,
    key_prefix: String,
    op_timeout: Duration,
    release_script: Script,
}

impl RedisLockBackend {
    pub fn new(connector: Arc<RedisConnector>, key_prefix: &str, op_timeout: Duration) -> Self {
        Self {
            connector,
            key_prefix: key_prefix.to_string(),
            op_timeout,
            release_script: Script::new(RELEASE_SCRIPT),
        }
    }

    fn make_key(&self, resource: &str) -> String {
        format!("{}{}", self.key_prefix, resource)
    }

    async fn with_conn<T, F, Fut>(&self, op: F) -> Result<T, LockError>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: Future<Output = Result<T, LockError>>,
    {
        let work = async {
            let conn = self.connector.connection().await?;
            op(conn).await
        };

        match tokio::time::timeout(self.op_timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(LockError::Unavailable(format!(
                "redis lock operation timed out after {}ms",
                self.op_timeout.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl LockBackend for RedisLockBackend {
    fn name(&self) -> &str {
        "redis"
    }

    async fn try_claim(&self, resource: &str, token: &str, lease: Duration) -> Result<bool, LockError> {
        let key = self.make_key(resource);
        let lease_ms = lease.as_millis().max(1) as u64;

        self.with_conn(|mut conn| async move {
            let reply: Option<String> = redis::cmd("SET")
                .arg(&key)
                .arg(token)
                .arg("NX")
                .arg("PX")
                .arg(lease_ms)
                .query_async(&mut conn)
                .await?;
            debug!(key = %key, claimed = reply.is_some(), "Lock claim attempt");
            Ok(reply.is_some())
        })
        .await
    }

    async fn release(&self, resource: &str, token: &str) -> Result<bool, LockError> {
        let key = self.make_key(resource);
        let script = &self.release_script;

        self.with_conn(|mut conn| async move {
            let removed: i64 = script
                .key(&key)
                .arg(token)
                .invoke_async(&mut conn)
                .await?;
            Ok(removed == 1)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable() -> RedisLockBackend {
        let connector =
            RedisConnector::new("redis://127.0.0.1:1/", Duration::from_millis(200)).unwrap();
        RedisLockBackend::new(Arc::new(connector), "test:lock:", Duration::from_millis(500))
    }

    // Test 1: Keys are namespaced
    #[test]
    fn test_key_prefix() {
        let backend = unreachable();
        assert_eq!(backend.name(), "redis");
        assert_eq!(backend.make_key("sync:teams"), "test:lock:sync:teams");
    }

    // Test 2: An unreachable server is reported, not treated as "held"
    #[tokio::test]
    async fn test_unreachable_is_error() {
        let backend = unreachable();
        let result = backend.try_claim("r", "t", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(LockError::Unavailable(_))));
    }
}
