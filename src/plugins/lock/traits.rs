//! Lock backend trait
//!
//! A backend stores at most one live lease per resource. Claims carry a random
//! token so only the holder can release; leases expire on their own so a
//! crashed holder never blocks others for longer than the lease.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::LockError;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LockBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Claim `resource` for `lease` if it is free or its lease has expired
    async fn try_claim(&self, resource: &str, token: &str, lease: Duration) -> Result<bool, LockError>;

    /// Release `resource` if it is still held under `token`
    async fn release(&self, resource: &str, token: &str) -> Result<bool, LockError>;
}
