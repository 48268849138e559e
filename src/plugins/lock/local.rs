//! In-process lock backend
//!
//! Coordinates tasks within one process only.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::traits::LockBackend;
use crate::error::LockError;

struct Lease {
    token: String,
    expires_at: Instant,
}

#[derive(Default)]
pub struct LocalLockBackend {
    leases: Mutex<HashMap<String, Lease>>,
}

impl LocalLockBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockBackend for LocalLockBackend {
    fn name(&self) -> &str {
        "local"
    }

    async fn try_claim(&self, resource: &str, token: &str, lease: Duration) -> Result<bool, LockError> {
        let now = Instant::now();
        let mut leases = self.leases.lock().await;

        if let Some(existing) = leases.get(resource) {
            if existing.expires_at > now {
                return Ok(false);
            }
        }

        leases.insert(
            resource.to_string(),
            Lease {
                token: token.to_string(),
                expires_at: now + lease,
            },
        );
        Ok(true)
    }

    async fn release(&self, resource: &str, token: &str) -> Result<bool, LockError> {
        let mut leases = self.leases.lock().await;
        match leases.get(resource) {
            Some(existing) if existing.token == token => {
                leases.remove(resource);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
