//! league-sync - schedule and stats synchronization engine
//!
//! Pulls teams, games and box scores from a rate-limited sports data
//! provider, reconciles them into a local store and keeps cached read paths
//! consistent. Sync runs are coordinated across instances with leases and
//! paced by an adaptive scheduler that speeds up while games are live.

pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod models;
pub mod otel;
pub mod plugins;
pub mod provider;
pub mod reads;
pub mod sync;
