//! Distributed lock integration tests
//!
//! Two engines pointed at the same SQLite file stand in for two processes.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{no_wait_locks, reference_now, sync_config, Engine};
use league_sync::config::{LockBackendKind, LockConfig};
use league_sync::database::SqliteStore;
use league_sync::models::{SkipReason, UnitOutcome};
use league_sync::plugins::build_lock_coordinator;
use league_sync::plugins::lock::{LocalLockBackend, LockAcquisition, LockCoordinator, SqliteLockBackend};
use league_sync::sync::TickState;
use tempfile::TempDir;

async fn shared_file_coordinators(dir: &TempDir) -> (LockCoordinator, LockCoordinator) {
    let path = dir.path().join("shared.db");
    let path = path.to_str().unwrap();

    let first = SqliteStore::new(path).await.unwrap();
    let second = SqliteStore::new(path).await.unwrap();

    let a = SqliteLockBackend::new(first.connection()).await.unwrap();
    let b = SqliteLockBackend::new(second.connection()).await.unwrap();

    (
        LockCoordinator::new(Arc::new(a), &no_wait_locks()),
        LockCoordinator::new(Arc::new(b), &no_wait_locks()),
    )
}

/// Test 1: Separate connections to one file exclude each other
#[tokio::test]
async fn test_sqlite_exclusion_across_connections() {
    let dir = TempDir::new().unwrap();
    let (a, b) = shared_file_coordinators(&dir).await;

    let LockAcquisition::Acquired(held) = a.acquire_default("sync:teams").await else {
        panic!("first holder should acquire");
    };
    assert!(held.is_coordinated());
    assert!(!b.acquire_default("sync:teams").await.is_acquired());

    // Other resources are independent
    assert!(b.acquire_default("sync:games:today").await.is_acquired());

    assert!(held.release().await);
    assert!(b.acquire_default("sync:teams").await.is_acquired());
}

/// Test 2: An expired lease is reclaimed by the other holder
#[tokio::test]
async fn test_sqlite_expired_lease_reclaimed() {
    let dir = TempDir::new().unwrap();
    let (a, b) = shared_file_coordinators(&dir).await;

    let LockAcquisition::Acquired(stale) = a
        .acquire("sync:teams", Duration::from_millis(100), Duration::ZERO)
        .await
    else {
        panic!("first holder should acquire");
    };

    tokio::time::sleep(Duration::from_millis(150)).await;

    let LockAcquisition::Acquired(fresh) = b
        .acquire("sync:teams", Duration::from_secs(30), Duration::ZERO)
        .await
    else {
        panic!("expired lease should be reclaimed");
    };

    // The old token no longer owns the row
    assert!(!stale.release().await);
    assert!(!a.acquire_default("sync:teams").await.is_acquired());
    assert!(fresh.release().await);
}

/// Test 3: Waiting acquirers succeed once the holder releases
#[tokio::test]
async fn test_waiter_acquires_after_release() {
    let dir = TempDir::new().unwrap();
    let (a, b) = shared_file_coordinators(&dir).await;

    let LockAcquisition::Acquired(held) = a.acquire_default("sync:player-stats").await else {
        panic!("first holder should acquire");
    };

    let waiter = tokio::spawn(async move {
        b.acquire("sync:player-stats", Duration::from_secs(30), Duration::from_secs(5))
            .await
            .is_acquired()
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(held.release().await);
    assert!(waiter.await.unwrap());
}

/// Test 4: Of many concurrent claimants exactly one wins
#[tokio::test]
async fn test_concurrent_claims_single_winner() {
    let coordinator = Arc::new(LockCoordinator::new(
        Arc::new(LocalLockBackend::new()),
        &no_wait_locks(),
    ));

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.acquire_default("sync:teams").await })
        })
        .collect();

    let mut held = Vec::new();
    for task in tasks {
        if let LockAcquisition::Acquired(handle) = task.await.unwrap() {
            held.push(handle);
        }
    }
    assert_eq!(held.len(), 1);
}

/// Test 5: Two engines sharing a lock table never run the same unit together
#[tokio::test]
async fn test_second_instance_skips_held_unit() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("locks.db");
    let locks_db = SqliteStore::new(path.to_str().unwrap()).await.unwrap();
    let backend = Arc::new(SqliteLockBackend::new(locks_db.connection()).await.unwrap());

    let first = Engine::with_lock_backend(30, sync_config(), backend.clone()).await;
    let second = Engine::with_lock_backend(30, sync_config(), backend).await;

    // Instance one is mid-sync on today's games
    let held = first.locks.acquire_default("sync:games:today").await;
    assert!(held.is_acquired());

    let mut state = TickState::new();
    let report = second.orchestrator.run_tick_at(&mut state, reference_now()).await;

    let today = report.units.iter().find(|u| u.unit == "games:today").unwrap();
    assert_eq!(
        today.outcome,
        UnitOutcome::Skipped {
            reason: SkipReason::LockHeld
        }
    );
    assert_eq!(report.failed(), 0);
    assert!(report.units.iter().any(|u| u.unit == "games:yesterday" && u.outcome.is_success()));
}

/// Test 6: `backend: none` hands out uncoordinated leases to everyone
#[tokio::test]
async fn test_none_backend_is_uncoordinated() {
    let store = SqliteStore::in_memory().await.unwrap();
    let config = LockConfig {
        backend: LockBackendKind::None,
        ..LockConfig::default()
    };
    let coordinator = build_lock_coordinator(&config, &store).await.unwrap();
    assert_eq!(coordinator.backend_name(), "none");

    let LockAcquisition::Acquired(first) = coordinator.acquire_default("sync:teams").await else {
        panic!("uncoordinated acquire always succeeds");
    };
    assert!(!first.is_coordinated());
    assert!(coordinator.acquire_default("sync:teams").await.is_acquired());
}
