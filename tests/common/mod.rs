//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use league_sync::config::{LockConfig, SyncConfig};
use league_sync::database::{SqliteStore, Store};
use league_sync::error::SyncError;
use league_sync::models::{Game, GameStatus, Player, PlayerGameStats, StatLine, Team};
use league_sync::plugins::cache::{CacheLayer, MemoryCache};
use league_sync::plugins::lock::{LocalLockBackend, LockBackend, LockCoordinator};
use league_sync::provider::SportsProvider;
use league_sync::sync::{Orchestrator, SyncMetricsRecorder};

/// 20:00 UTC, which is 15:00 on 2024-01-15 at UTC-5
pub fn reference_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 20, 0, 0).unwrap()
}

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

pub fn team(ext: i64) -> Team {
    Team::new(ext, format!("Team {ext}"), format!("T{ext}"))
}

pub fn teams(range: std::ops::RangeInclusive<i64>) -> Vec<Team> {
    range.map(team).collect()
}

pub fn game(ext: i64, date: NaiveDate, status: GameStatus, home: i64, visitor: i64) -> Game {
    Game {
        id: None,
        external_id: ext,
        date,
        season: 2023,
        status,
        status_detail: status.as_str().to_string(),
        period: 0,
        time: None,
        home_team_external_id: home,
        visitor_team_external_id: visitor,
        home_score: 0,
        visitor_score: 0,
        postseason: false,
    }
}

pub fn stat_line(player_ext: i64, game_ext: i64, team_ext: i64, points: i32) -> StatLine {
    StatLine {
        player: Player {
            id: None,
            external_id: player_ext,
            first_name: format!("First{player_ext}"),
            last_name: format!("Last{player_ext}"),
            position: Some("G".to_string()),
            team_external_id: Some(team_ext),
        },
        stats: PlayerGameStats {
            id: None,
            player_external_id: player_ext,
            game_external_id: game_ext,
            team_external_id: team_ext,
            minutes: Some("30".to_string()),
            points,
            rebounds: 0,
            assists: 0,
            steals: 0,
            blocks: 0,
            turnovers: 0,
        },
    }
}

/// Provider whose data and failures are scripted by the test
#[derive(Default)]
pub struct ScriptedProvider {
    teams: Mutex<Vec<Team>>,
    games: Mutex<Vec<Game>>,
    stats: Mutex<Vec<StatLine>>,
    failing: Mutex<HashSet<&'static str>>,
    pub team_calls: AtomicU32,
    pub game_calls: AtomicU32,
    pub stat_calls: AtomicU32,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_teams(&self, teams: Vec<Team>) {
        *self.teams.lock().unwrap() = teams;
    }

    pub fn set_games(&self, games: Vec<Game>) {
        *self.games.lock().unwrap() = games;
    }

    /// Replace one game by external id, or add it
    pub fn put_game(&self, game: Game) {
        let mut games = self.games.lock().unwrap();
        games.retain(|g| g.external_id != game.external_id);
        games.push(game);
    }

    pub fn set_stats(&self, stats: Vec<StatLine>) {
        *self.stats.lock().unwrap() = stats;
    }

    /// Make `op` ("teams", "games" or "stats") fail until `heal` is called
    pub fn fail(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }

    pub fn heal(&self, op: &'static str) {
        self.failing.lock().unwrap().remove(op);
    }

    fn check(&self, op: &'static str) -> Result<(), SyncError> {
        if self.failing.lock().unwrap().contains(op) {
            Err(SyncError::ServerError(503))
        } else {
            Ok(())
        }
    }

    pub fn calls(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SportsProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch_teams(&self) -> Result<Vec<Team>, SyncError> {
        self.team_calls.fetch_add(1, Ordering::SeqCst);
        self.check("teams")?;
        Ok(self.teams.lock().unwrap().clone())
    }

    async fn fetch_games(&self, dates: &[NaiveDate]) -> Result<Vec<Game>, SyncError> {
        self.game_calls.fetch_add(1, Ordering::SeqCst);
        self.check("games")?;
        Ok(self
            .games
            .lock()
            .unwrap()
            .iter()
            .filter(|g| dates.contains(&g.date))
            .cloned()
            .collect())
    }

    async fn fetch_player_game_stats(&self, game_ids: &[i64]) -> Result<Vec<StatLine>, SyncError> {
        self.stat_calls.fetch_add(1, Ordering::SeqCst);
        self.check("stats")?;
        Ok(self
            .stats
            .lock()
            .unwrap()
            .iter()
            .filter(|l| game_ids.contains(&l.stats.game_external_id))
            .cloned()
            .collect())
    }
}

pub fn sync_config() -> SyncConfig {
    SyncConfig {
        utc_offset_hours: -5,
        future_days: 2,
        ..SyncConfig::default()
    }
}

/// Lock config that never waits for a held lock
pub fn no_wait_locks() -> LockConfig {
    LockConfig {
        max_wait_secs: 0,
        ..LockConfig::default()
    }
}

/// Fully wired engine over in-memory backends
pub struct Engine {
    pub store: Arc<SqliteStore>,
    pub cache: Arc<CacheLayer>,
    pub locks: Arc<LockCoordinator>,
    pub metrics: Arc<SyncMetricsRecorder>,
    pub provider: Arc<ScriptedProvider>,
    pub orchestrator: Arc<Orchestrator>,
}

impl Engine {
    pub async fn new(stored_teams: u64, config: SyncConfig) -> Self {
        Self::with_lock_backend(stored_teams, config, Arc::new(LocalLockBackend::new())).await
    }

    pub async fn with_lock_backend(
        stored_teams: u64,
        config: SyncConfig,
        lock_backend: Arc<dyn LockBackend>,
    ) -> Self {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        for ext in 1..=stored_teams as i64 {
            store.upsert_team(&team(ext)).await.unwrap();
        }

        let cache = Arc::new(CacheLayer::new(Arc::new(MemoryCache::new(4 * 1024 * 1024))));
        let locks = Arc::new(LockCoordinator::new(lock_backend, &no_wait_locks()));
        let metrics = Arc::new(SyncMetricsRecorder::default());

        let provider = Arc::new(ScriptedProvider::new());
        provider.set_teams(teams(1..=30));

        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            provider.clone(),
            cache.clone(),
            locks.clone(),
            metrics.clone(),
            config,
        ));

        Self {
            store,
            cache,
            locks,
            metrics,
            provider,
            orchestrator,
        }
    }
}
