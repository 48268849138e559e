//! Database layer for league-sync
//!
//! This module defines the store trait the sync engine persists through and
//! its SQLite implementation. Every write is an idempotent upsert keyed on the
//! provider's external id.

pub mod migrations;
pub mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::DbError;
use crate::models::{EntityKind, Game, Player, PlayerGameStats, Team};

/// Persistence operations needed by the orchestrator and the read paths
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    // =========================================================================
    // Writes
    // =========================================================================

    /// Insert or update a team; returns the local id
    async fn upsert_team(&self, team: &Team) -> Result<i64, DbError>;

    /// Insert or update a game; both teams must already be stored
    async fn upsert_game(&self, game: &Game) -> Result<i64, DbError>;

    /// Insert or update a player; returns the local id
    async fn upsert_player(&self, player: &Player) -> Result<i64, DbError>;

    /// Insert or update a box-score line; player and game must already be stored
    async fn upsert_player_stats(&self, stats: &PlayerGameStats) -> Result<i64, DbError>;

    // =========================================================================
    // Reads
    // =========================================================================

    /// Number of stored rows of one entity type
    async fn count_all(&self, kind: EntityKind) -> Result<u64, DbError>;

    /// All teams ordered by name
    async fn list_teams(&self) -> Result<Vec<Team>, DbError>;

    /// Stored games with the given external ids
    async fn find_games(&self, external_ids: &[i64]) -> Result<Vec<Game>, DbError>;

    /// Stored players with the given external ids
    async fn find_players(&self, external_ids: &[i64]) -> Result<Vec<Player>, DbError>;

    /// Games whose date falls in `[from, to]`
    async fn games_by_date_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Game>, DbError>;

    /// Games of one team whose date falls in `[from, to]`
    async fn games_for_team(
        &self,
        team_external_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Game>, DbError>;

    /// Box-score lines of one game
    async fn player_stats_for_game(
        &self,
        game_external_id: i64,
    ) -> Result<Vec<PlayerGameStats>, DbError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test 1: MockStore can be created and used
    #[tokio::test]
    async fn test_mock_store_counts() {
        let mut mock = MockStore::new();
        mock.expect_count_all()
            .withf(|kind| *kind == EntityKind::Teams)
            .returning(|_| Ok(30));

        assert_eq!(mock.count_all(EntityKind::Teams).await.unwrap(), 30);
    }

    // Test 2: MockStore surfaces missing references
    #[tokio::test]
    async fn test_mock_store_missing_reference() {
        let mut mock = MockStore::new();
        mock.expect_upsert_game()
            .returning(|g| Err(DbError::MissingReference(format!("team {}", g.home_team_external_id))));

        let game = Game {
            id: None,
            external_id: 1,
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            season: 2023,
            status: Default::default(),
            status_detail: String::new(),
            period: 0,
            time: None,
            home_team_external_id: 5,
            visitor_team_external_id: 6,
            home_score: 0,
            visitor_score: 0,
            postseason: false,
        };

        match mock.upsert_game(&game).await {
            Err(DbError::MissingReference(what)) => assert_eq!(what, "team 5"),
            other => panic!("Expected MissingReference, got {other:?}"),
        }
    }
}
