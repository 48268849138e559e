//! Upstream sports data providers
//!
//! `SportsProvider` is the seam between the orchestrator and the outside
//! world. `HttpSportsProvider` talks to a JSON API; `ResilientProvider` wraps
//! any provider with retries, a circuit breaker and per-call timeouts.

pub mod http;
pub mod resilient;

pub use http::HttpSportsProvider;
pub use resilient::ResilientProvider;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::SyncError;
use crate::models::{Game, StatLine, Team};

/// Source of teams, games and box scores
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SportsProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &str;

    /// All teams in the league
    async fn fetch_teams(&self) -> Result<Vec<Team>, SyncError>;

    /// Games played or scheduled on any of `dates`
    async fn fetch_games(&self, dates: &[NaiveDate]) -> Result<Vec<Game>, SyncError>;

    /// Box-score lines for the given provider game ids
    async fn fetch_player_game_stats(&self, game_ids: &[i64]) -> Result<Vec<StatLine>, SyncError>;
}
