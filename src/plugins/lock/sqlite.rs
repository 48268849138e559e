//! SQLite lock backend
//!
//! Leases live in the `sync_locks` table of the shared database file, so
//! every process pointed at the same file is coordinated. Expiry is compared
//! against wall-clock milliseconds.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::params;
use tokio_rusqlite::Connection;

use super::traits::LockBackend;
use crate::database::migrations::CREATE_LOCK_SCHEMA;
use crate::error::{DbError, LockError};

pub struct SqliteLockBackend {
    conn: Connection,
}

impl SqliteLockBackend {
    /// Wrap a connection, creating the lease table if needed
    pub async fn new(conn: Connection) -> Result<Self, LockError> {
        conn.call(|conn| {
            conn.execute_batch(CREATE_LOCK_SCHEMA)?;
            Ok(())
        })
        .await
        .map_err(DbError::from)?;

        Ok(Self { conn })
    }
}

#[async_trait]
impl LockBackend for SqliteLockBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn try_claim(&self, resource: &str, token: &str, lease: Duration) -> Result<bool, LockError> {
        let resource = resource.to_string();
        let token = token.to_string();
        let now_ms = Utc::now().timestamp_millis();
        let expires_at_ms = now_ms + lease.as_millis() as i64;

        let claimed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "INSERT INTO sync_locks (resource, token, expires_at_ms) VALUES (?1, ?2, ?3)
                     ON CONFLICT(resource) DO UPDATE
                        SET token = excluded.token, expires_at_ms = excluded.expires_at_ms
                        WHERE sync_locks.expires_at_ms <= ?4",
                    params![resource, token, expires_at_ms, now_ms],
                )?;
                Ok(changed == 1)
            })
            .await
            .map_err(DbError::from)?;

        Ok(claimed)
    }

    async fn release(&self, resource: &str, token: &str) -> Result<bool, LockError> {
        let resource = resource.to_string();
        let token = token.to_string();

        let released = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "DELETE FROM sync_locks WHERE resource = ?1 AND token = ?2",
                    params![resource, token],
                )?;
                Ok(changed == 1)
            })
            .await
            .map_err(DbError::from)?;

        Ok(released)
    }
}
