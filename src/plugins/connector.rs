//! Shared Redis connection handling
//!
//! The connection is established lazily on first use so the process starts
//! even when Redis is down. After a failed attempt further attempts are
//! suppressed for a short back-off window, which keeps a dead Redis from
//! adding the connect timeout to every cache read.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::Client;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::{CacheError, LockError};

/// Minimum gap between reconnect attempts after a failure
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("invalid redis url: {0}")]
    InvalidUrl(String),

    #[error("connect timed out after {0}ms")]
    Timeout(u64),

    #[error("reconnect suppressed after recent failure")]
    BackingOff,

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl From<ConnectorError> for CacheError {
    fn from(err: ConnectorError) -> Self {
        CacheError::Unavailable(err.to_string())
    }
}

impl From<ConnectorError> for LockError {
    fn from(err: ConnectorError) -> Self {
        LockError::Unavailable(err.to_string())
    }
}

#[derive(Default)]
struct Slot {
    manager: Option<ConnectionManager>,
    last_failure: Option<Instant>,
}

pub struct RedisConnector {
    client: Client,
    connect_timeout: Duration,
    slot: Mutex<Slot>,
}

impl RedisConnector {
    /// Parses the URL; no connection is made yet
    pub fn new(url: &str, connect_timeout: Duration) -> Result<Self, ConnectorError> {
        let client = Client::open(url).map_err(|e| ConnectorError::InvalidUrl(e.to_string()))?;
        Ok(Self {
            client,
            connect_timeout,
            slot: Mutex::new(Slot::default()),
        })
    }

    /// A cloned handle to the shared connection manager
    pub async fn connection(&self) -> Result<ConnectionManager, ConnectorError> {
        let mut slot = self.slot.lock().await;

        if let Some(manager) = &slot.manager {
            return Ok(manager.clone());
        }

        if let Some(failed_at) = slot.last_failure {
            if failed_at.elapsed() < RECONNECT_BACKOFF {
                return Err(ConnectorError::BackingOff);
            }
        }

        let attempt = ConnectionManager::new(self.client.clone());
        let result = match tokio::time::timeout(self.connect_timeout, attempt).await {
            Ok(Ok(manager)) => Ok(manager),
            Ok(Err(e)) => Err(ConnectorError::Redis(e)),
            Err(_) => Err(ConnectorError::Timeout(self.connect_timeout.as_millis() as u64)),
        };

        match result {
            Ok(manager) => {
                info!("Connected to redis");
                slot.last_failure = None;
                slot.manager = Some(manager.clone());
                Ok(manager)
            }
            Err(e) => {
                warn!(error = %e, "Redis connection failed");
                slot.last_failure = Some(Instant::now());
                Err(e)
            }
        }
    }
}

/// Escape glob metacharacters for use in a SCAN MATCH pattern
pub fn escape_glob(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test 1: Invalid URLs are rejected up front
    #[test]
    fn test_invalid_url() {
        let result = RedisConnector::new("not a url", Duration::from_millis(100));
        assert!(matches!(result, Err(ConnectorError::InvalidUrl(_))));
    }

    // Test 2: Unreachable redis fails, then backs off without reconnecting
    #[tokio::test]
    async fn test_unreachable_backs_off() {
        let connector =
            RedisConnector::new("redis://127.0.0.1:1/", Duration::from_millis(500)).unwrap();

        assert!(connector.connection().await.is_err());
        assert!(matches!(
            connector.connection().await,
            Err(ConnectorError::BackingOff)
        ));
    }

    // Test 3: Glob escaping
    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("games:date:"), "games:date:");
        assert_eq!(escape_glob("a*b?[c]\\"), "a\\*b\\?\\[c\\]\\\\");
    }

    // Test 4: Connector errors degrade into backend-unavailable errors
    #[test]
    fn test_error_conversion() {
        let cache: CacheError = ConnectorError::Timeout(200).into();
        assert!(matches!(cache, CacheError::Unavailable(_)));
        let lock: LockError = ConnectorError::BackingOff.into();
        assert!(matches!(lock, LockError::Unavailable(_)));
    }
}
