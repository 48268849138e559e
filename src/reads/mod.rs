//! Cached read paths
//!
//! Cache-aside over the store: look in the cache, fall back to the store on
//! a miss and repopulate. Keys come from `plugins::cache::keys` so that the
//! orchestrator's invalidations hit exactly what these reads wrote. A cache
//! that is down only costs a store query.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::CacheTtlConfig;
use crate::database::Store;
use crate::error::DbError;
use crate::models::{Game, PlayerGameStats, Team};
use crate::plugins::cache::{keys, CacheLayer, Expiration};

pub struct CachedReads {
    store: Arc<dyn Store>,
    cache: Arc<CacheLayer>,
    ttl: CacheTtlConfig,
}

impl CachedReads {
    pub fn new(store: Arc<dyn Store>, cache: Arc<CacheLayer>, ttl: CacheTtlConfig) -> Self {
        Self { store, cache, ttl }
    }

    fn expiration(&self, secs: u64) -> Expiration {
        Expiration::for_ttl(Duration::from_secs(secs), self.ttl.sliding)
    }

    /// Shorter lifetime while any of the games is in progress
    fn games_expiration(&self, games: &[Game]) -> Expiration {
        if games.iter().any(|g| g.status.is_live()) {
            self.expiration(self.ttl.live_games_secs)
        } else {
            self.expiration(self.ttl.games_secs)
        }
    }

    async fn cached<T>(&self, key: &str) -> Option<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let hit = self.cache.get_json::<Vec<T>>(key).await;
        if hit.is_some() {
            debug!(key = key, "Served from cache");
        }
        hit
    }

    async fn populate<T: Serialize>(&self, key: &str, value: &[T], expiration: Expiration) {
        if !self.cache.set_json(key, value, expiration).await {
            debug!(key = key, "Read result not cached");
        }
    }

    pub async fn teams(&self) -> Result<Vec<Team>, DbError> {
        let key = keys::teams_all();
        if let Some(teams) = self.cached(&key).await {
            return Ok(teams);
        }

        let teams = self.store.list_teams().await?;
        self.populate(&key, &teams, self.expiration(self.ttl.teams_secs))
            .await;
        Ok(teams)
    }

    pub async fn games_on(&self, date: NaiveDate) -> Result<Vec<Game>, DbError> {
        let key = keys::games_on(date);
        if let Some(games) = self.cached(&key).await {
            return Ok(games);
        }

        let games = self.store.games_by_date_range(date, date).await?;
        self.populate(&key, &games, self.games_expiration(&games)).await;
        Ok(games)
    }

    pub async fn games_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Game>, DbError> {
        let key = keys::games_between(from, to);
        if let Some(games) = self.cached(&key).await {
            return Ok(games);
        }

        let games = self.store.games_by_date_range(from, to).await?;
        self.populate(&key, &games, self.games_expiration(&games)).await;
        Ok(games)
    }

    pub async fn team_games(
        &self,
        team_external_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Game>, DbError> {
        let key = keys::team_games(team_external_id, from, to);
        if let Some(games) = self.cached(&key).await {
            return Ok(games);
        }

        let games = self.store.games_for_team(team_external_id, from, to).await?;
        self.populate(&key, &games, self.games_expiration(&games)).await;
        Ok(games)
    }

    pub async fn game_stats(&self, game_external_id: i64) -> Result<Vec<PlayerGameStats>, DbError> {
        let key = keys::game_stats(game_external_id);
        if let Some(stats) = self.cached(&key).await {
            return Ok(stats);
        }

        let stats = self.store.player_stats_for_game(game_external_id).await?;
        self.populate(&key, &stats, self.expiration(self.ttl.stats_secs))
            .await;
        Ok(stats)
    }
}
