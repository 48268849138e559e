//! Lease-based lock coordinator
//!
//! Wraps a `LockBackend` with polling, per-holder tokens and a fallback:
//! when the backend itself fails the caller proceeds uncoordinated rather
//! than stalling the sync.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::traits::LockBackend;
use crate::config::LockConfig;

/// Result of an acquisition attempt
#[derive(Debug)]
pub enum LockAcquisition {
    Acquired(LockHandle),
    /// Someone else held the resource for the whole wait window
    NotAcquired,
}

impl LockAcquisition {
    pub fn is_acquired(&self) -> bool {
        matches!(self, LockAcquisition::Acquired(_))
    }
}

/// A held lease
///
/// Release explicitly with [`LockHandle::release`]. A handle dropped without
/// release frees the lease from a background task when a runtime is
/// available; otherwise the lease simply expires.
pub struct LockHandle {
    resource: String,
    token: String,
    expires_at: Instant,
    backend: Option<Arc<dyn LockBackend>>,
}

impl std::fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockHandle")
            .field("resource", &self.resource)
            .field("coordinated", &self.is_coordinated())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl LockHandle {
    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// False when the handle was issued without backend coordination
    pub fn is_coordinated(&self) -> bool {
        self.backend.is_some()
    }

    /// Returns whether the backend confirmed the release
    pub async fn release(mut self) -> bool {
        let Some(backend) = self.backend.take() else {
            return false;
        };

        match backend.release(&self.resource, &self.token).await {
            Ok(released) => {
                debug!(resource = %self.resource, released, "Lock released");
                released
            }
            Err(e) => {
                warn!(resource = %self.resource, error = %e, "Lock release failed, lease will expire");
                false
            }
        }
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        let Some(backend) = self.backend.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let resource = std::mem::take(&mut self.resource);
        let token = std::mem::take(&mut self.token);
        runtime.spawn(async move {
            if let Err(e) = backend.release(&resource, &token).await {
                debug!(resource = %resource, error = %e, "Background lock release failed");
            }
        });
    }
}

pub struct LockCoordinator {
    backend: Option<Arc<dyn LockBackend>>,
    lease: Duration,
    max_wait: Duration,
    retry_interval: Duration,
}

impl LockCoordinator {
    pub fn new(backend: Arc<dyn LockBackend>, config: &LockConfig) -> Self {
        Self {
            backend: Some(backend),
            lease: config.lease(),
            max_wait: config.max_wait(),
            retry_interval: config.retry_interval(),
        }
    }

    /// A coordinator that grants every request without coordination
    pub fn uncoordinated(config: &LockConfig) -> Self {
        Self {
            backend: None,
            lease: config.lease(),
            max_wait: config.max_wait(),
            retry_interval: config.retry_interval(),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.as_ref().map(|b| b.name()).unwrap_or("none")
    }

    /// Acquire with the configured lease and wait
    pub async fn acquire_default(&self, resource: &str) -> LockAcquisition {
        self.acquire(resource, self.lease, self.max_wait).await
    }

    pub async fn acquire(&self, resource: &str, lease: Duration, max_wait: Duration) -> LockAcquisition {
        let token = new_token();

        let Some(backend) = &self.backend else {
            return LockAcquisition::Acquired(self.handle(resource, token, lease, None));
        };

        let deadline = Instant::now() + max_wait;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match backend.try_claim(resource, &token, lease).await {
                Ok(true) => {
                    debug!(resource, attempts, backend = backend.name(), "Lock acquired");
                    return LockAcquisition::Acquired(self.handle(
                        resource,
                        token,
                        lease,
                        Some(backend.clone()),
                    ));
                }
                Ok(false) => {
                    let now = Instant::now();
                    if now >= deadline {
                        info!(resource, attempts, "Lock held elsewhere, giving up");
                        return LockAcquisition::NotAcquired;
                    }
                    tokio::time::sleep(self.retry_interval.min(deadline - now)).await;
                }
                Err(e) => {
                    warn!(
                        resource,
                        backend = backend.name(),
                        error = %e,
                        "Lock backend unavailable, proceeding without coordination"
                    );
                    return LockAcquisition::Acquired(self.handle(resource, token, lease, None));
                }
            }
        }
    }

    fn handle(
        &self,
        resource: &str,
        token: String,
        lease: Duration,
        backend: Option<Arc<dyn LockBackend>>,
    ) -> LockHandle {
        LockHandle {
            resource: resource.to_string(),
            token,
            expires_at: Instant::now() + lease,
            backend,
        }
    }
}

fn new_token() -> String {
    format!("{:032x}", rand::random::<u128>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LockError;
    use crate::plugins::lock::traits::MockLockBackend;
    use crate::plugins::lock::LocalLockBackend;

    fn config() -> LockConfig {
        LockConfig {
            lease_secs: 30,
            max_wait_secs: 2,
            retry_interval_ms: 500,
            ..LockConfig::default()
        }
    }

    fn local() -> LockCoordinator {
        LockCoordinator::new(Arc::new(LocalLockBackend::new()), &config())
    }

    // Test 1: Second caller does not acquire while the first holds the lease
    #[tokio::test(start_paused = true)]
    async fn test_mutual_exclusion() {
        let coordinator = local();

        let first = coordinator.acquire_default("sync:teams").await;
        assert!(first.is_acquired());

        let second = coordinator.acquire_default("sync:teams").await;
        assert!(!second.is_acquired());
    }

    // Test 2: Release lets the next caller in
    #[tokio::test(start_paused = true)]
    async fn test_release_then_acquire() {
        let coordinator = local();

        let LockAcquisition::Acquired(handle) = coordinator.acquire_default("r").await else {
            panic!("expected acquisition");
        };
        assert!(handle.is_coordinated());
        assert!(handle.release().await);

        assert!(coordinator.acquire_default("r").await.is_acquired());
    }

    // Test 3: Waiters get the lock once the lease expires
    #[tokio::test(start_paused = true)]
    async fn test_waits_for_expiry() {
        let coordinator = local();
        let _held = coordinator
            .acquire("r", Duration::from_secs(1), Duration::ZERO)
            .await;

        let waited = coordinator
            .acquire("r", Duration::from_secs(30), Duration::from_secs(3))
            .await;
        assert!(waited.is_acquired());
    }

    // Test 4: Dropped handles release in the background
    #[tokio::test]
    async fn test_drop_releases() {
        let coordinator = local();
        {
            let acquired = coordinator.acquire_default("r").await;
            assert!(acquired.is_acquired());
        }
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        let again = coordinator
            .acquire("r", Duration::from_secs(30), Duration::from_millis(200))
            .await;
        assert!(again.is_acquired());
    }

    // Test 5: Backend errors fall back to an uncoordinated handle
    #[tokio::test]
    async fn test_backend_failure_falls_back() {
        let mut backend = MockLockBackend::new();
        backend.expect_name().return_const("broken".to_string());
        backend
            .expect_try_claim()
            .returning(|_, _, _| Err(LockError::Unavailable("down".to_string())));
        backend.expect_release().never();

        let coordinator = LockCoordinator::new(Arc::new(backend), &config());
        let LockAcquisition::Acquired(handle) = coordinator.acquire_default("r").await else {
            panic!("expected fallback handle");
        };
        assert!(!handle.is_coordinated());
        assert!(!handle.release().await);
    }

    // Test 6: The none backend grants everything
    #[tokio::test]
    async fn test_uncoordinated() {
        let coordinator = LockCoordinator::uncoordinated(&config());
        assert_eq!(coordinator.backend_name(), "none");
        assert!(coordinator.acquire_default("r").await.is_acquired());
        assert!(coordinator.acquire_default("r").await.is_acquired());
    }

    // Test 7: Tokens are unique per attempt
    #[test]
    fn test_tokens_unique() {
        let a = new_token();
        let b = new_token();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
