//! Lock plugins for league-sync
//!
//! `LockCoordinator` hands out leases from one of the `LockBackend`
//! implementations chosen at startup.

pub mod coordinator;
pub mod traits;

mod local;
mod redis;
mod sqlite;

pub use coordinator::{LockAcquisition, LockCoordinator, LockHandle};
pub use traits::LockBackend;

#[cfg(test)]
pub use traits::MockLockBackend;

pub use local::LocalLockBackend;
pub use redis::RedisLockBackend;
pub use sqlite::SqliteLockBackend;
