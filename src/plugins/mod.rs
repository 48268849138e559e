//! Pluggable backends for caching and lock coordination

pub mod cache;
pub mod connector;
pub mod lock;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::{LockBackendKind, LockConfig};
use crate::database::SqliteStore;
use crate::error::LockError;
use connector::RedisConnector;
use lock::{LocalLockBackend, LockCoordinator, RedisLockBackend, SqliteLockBackend};

/// Build the lock coordinator for the configured backend
///
/// The SQLite backend shares the store's database file.
pub async fn build_lock_coordinator(
    config: &LockConfig,
    store: &SqliteStore,
) -> Result<LockCoordinator, LockError> {
    let coordinator = match config.backend {
        LockBackendKind::None => LockCoordinator::uncoordinated(config),
        LockBackendKind::Local => LockCoordinator::new(Arc::new(LocalLockBackend::new()), config),
        LockBackendKind::Sqlite => {
            let backend = SqliteLockBackend::new(store.connection()).await?;
            LockCoordinator::new(Arc::new(backend), config)
        }
        LockBackendKind::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .ok_or_else(|| LockError::Unavailable("lock.redis_url is not set".to_string()))?;
            let connector = RedisConnector::new(url, Duration::from_millis(config.op_timeout_ms))?;
            let backend = RedisLockBackend::new(
                Arc::new(connector),
                &config.key_prefix,
                Duration::from_millis(config.op_timeout_ms),
            );
            LockCoordinator::new(Arc::new(backend), config)
        }
    };

    info!(backend = coordinator.backend_name(), "Lock coordinator ready");
    Ok(coordinator)
}
