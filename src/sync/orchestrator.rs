//! Sync orchestrator
//!
//! Runs the sync units of a tick in fixed order: teams, yesterday's games,
//! today's games, future games, player stats. Each unit runs under its own
//! lock and time budget; a failing unit never stops the ones after it.
//! Fetched entities are compared with the stored copies and only new or
//! changed ones are written, after which the affected cache keys are dropped.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Days, FixedOffset, NaiveDate, Offset, Utc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::metrics::SyncMetricsRecorder;
use crate::config::{CadenceMode, SyncConfig};
use crate::database::Store;
use crate::error::{DbError, UnitError};
use crate::models::{
    EntityKind, Game, GameStatus, Player, PlayerGameStats, SkipReason, SyncUnit, Team,
    TickReport, UnitKind, UnitOutcome, UnitPhase, UnitReport,
};
use crate::plugins::cache::{keys, CacheLayer};
use crate::plugins::lock::{LockAcquisition, LockCoordinator};
use crate::provider::SportsProvider;

/// Scheduler-owned state carried from one tick to the next
#[derive(Debug, Clone, Default)]
pub struct TickState {
    units: Vec<SyncUnit>,
    /// In-progress games today, as last known
    pub live_games: Option<u64>,
    /// Scheduled games in the future window, as last known
    pub upcoming_games: Option<u64>,
}

impl TickState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unit(&self, name: &str) -> Option<&SyncUnit> {
        self.units.iter().find(|u| u.name == name)
    }

    pub fn units(&self) -> &[SyncUnit] {
        &self.units
    }

    fn unit_mut(&mut self, name: &str) -> &mut SyncUnit {
        let index = match self.units.iter().position(|u| u.name == name) {
            Some(index) => index,
            None => {
                self.units.push(SyncUnit::new(name));
                self.units.len() - 1
            }
        };
        &mut self.units[index]
    }

    fn begin_tick(&mut self) {
        for unit in &mut self.units {
            unit.ticks_since_success = unit.ticks_since_success.saturating_add(1);
        }
    }

    fn absorb(&mut self, ctx: &TickContext) {
        if ctx.live_games.is_some() {
            self.live_games = ctx.live_games;
        }
        if ctx.upcoming_games.is_some() {
            self.upcoming_games = ctx.upcoming_games;
        }
    }
}

/// Facts gathered by the units of one tick
#[derive(Debug, Clone)]
pub struct TickContext {
    /// League-local calendar date
    pub today: NaiveDate,
    pub live_games: Option<u64>,
    pub upcoming_games: Option<u64>,
    /// Games seen this tick that can have box scores
    pub stat_games: BTreeSet<i64>,
}

impl TickContext {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today,
            live_games: None,
            upcoming_games: None,
            stat_games: BTreeSet::new(),
        }
    }
}

/// What the scheduler drives
#[async_trait]
pub trait TickRunner: Send + Sync {
    /// Run every unit that is due
    async fn run_tick(&self, state: &mut TickState) -> TickReport;

    /// Run one unit by name, regardless of cadence
    async fn run_named(&self, name: &str, state: &mut TickState) -> Result<UnitReport, UnitError>;
}

#[derive(Debug, Default)]
struct GameChanges {
    records: u64,
    dates: BTreeSet<NaiveDate>,
    teams: BTreeSet<i64>,
}

impl GameChanges {
    fn touch(&mut self, game: &Game) {
        self.dates.insert(game.date);
        self.teams.extend(game.team_external_ids());
    }
}

pub struct Orchestrator {
    store: Arc<dyn Store>,
    provider: Arc<dyn SportsProvider>,
    cache: Arc<CacheLayer>,
    locks: Arc<LockCoordinator>,
    metrics: Arc<SyncMetricsRecorder>,
    config: SyncConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn SportsProvider>,
        cache: Arc<CacheLayer>,
        locks: Arc<LockCoordinator>,
        metrics: Arc<SyncMetricsRecorder>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            provider,
            cache,
            locks,
            metrics,
            config,
        }
    }

    pub fn metrics(&self) -> &Arc<SyncMetricsRecorder> {
        &self.metrics
    }

    /// Calendar date in the league's time zone
    pub fn league_today(&self, now: DateTime<Utc>) -> NaiveDate {
        let offset = FixedOffset::east_opt(self.config.utc_offset_hours * 3600).unwrap_or(Utc.fix());
        now.with_timezone(&offset).date_naive()
    }

    /// Units to run this tick, in execution order
    pub fn due_units(&self, state: &TickState, now: DateTime<Utc>) -> Vec<UnitKind> {
        let cadence = &self.config.cadence;
        let mut units = vec![UnitKind::Teams];

        if self.is_due(
            state.unit(&UnitKind::YesterdayGames.name()),
            cadence.yesterday_interval_secs,
            cadence.yesterday_every_n_ticks,
            now,
        ) {
            units.push(UnitKind::YesterdayGames);
        }

        units.push(UnitKind::TodayGames);

        if self.config.future_days > 0 {
            let future = UnitKind::FutureGames {
                days: self.config.future_days,
            };
            if self.is_due(
                state.unit(&future.name()),
                cadence.future_interval_secs,
                cadence.future_every_n_ticks,
                now,
            ) {
                units.push(future);
            }
        }

        if self.config.player_stats {
            units.push(UnitKind::PlayerStats);
        }

        units
    }

    fn is_due(&self, unit: Option<&SyncUnit>, interval_secs: u64, every_n_ticks: u32, now: DateTime<Utc>) -> bool {
        let Some(last_success) = unit.and_then(|u| u.last_success_at) else {
            return true;
        };

        match self.config.cadence.mode {
            CadenceMode::WallClock => {
                let elapsed = now.signed_duration_since(last_success);
                elapsed.num_seconds() >= interval_secs as i64
            }
            CadenceMode::TickCount => unit
                .map(|u| u.ticks_since_success >= every_n_ticks.max(1))
                .unwrap_or(true),
        }
    }

    pub async fn run_tick_at(&self, state: &mut TickState, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::new(now);
        let mut ctx = TickContext::new(self.league_today(now));

        state.begin_tick();
        let units = self.due_units(state, now);
        let names: Vec<String> = units.iter().map(|k| k.name()).collect();
        info!(today = %ctx.today, units = ?names, "Tick started");

        for kind in units {
            let unit_report = self.run_unit(kind, &mut ctx, now).await;
            state.unit_mut(&unit_report.unit).record(&unit_report.outcome, now);
            report.units.push(unit_report);
        }

        state.absorb(&ctx);
        report.live_games = state.live_games;
        report.upcoming_games = state.upcoming_games;

        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped(),
            live_games = ?report.live_games,
            "Tick finished"
        );
        report
    }

    /// Run one unit outside the regular cadence
    pub async fn run_unit_by_name(
        &self,
        name: &str,
        state: &mut TickState,
        now: DateTime<Utc>,
    ) -> Result<UnitReport, UnitError> {
        let kind = UnitKind::parse(name).ok_or_else(|| UnitError::UnknownUnit(name.to_string()))?;
        let mut ctx = TickContext::new(self.league_today(now));

        if kind == UnitKind::PlayerStats {
            let from = ctx.today.checked_sub_days(Days::new(1)).unwrap_or(ctx.today);
            let recent = self.store.games_by_date_range(from, ctx.today).await?;
            ctx.stat_games
                .extend(recent.iter().filter(|g| g.status.has_stats()).map(|g| g.external_id));
        }

        info!(unit = name, "Manual unit run");
        let report = self.run_unit(kind, &mut ctx, now).await;
        state.unit_mut(&report.unit).record(&report.outcome, now);
        state.absorb(&ctx);
        Ok(report)
    }

    /// Run one unit under its lock and time budget
    pub async fn run_unit(&self, kind: UnitKind, ctx: &mut TickContext, now: DateTime<Utc>) -> UnitReport {
        let name = kind.name();
        let started = Instant::now();
        let resource = format!("sync:{name}");

        let outcome = match self.locks.acquire_default(&resource).await {
            LockAcquisition::NotAcquired => {
                info!(unit = %name, "Unit skipped, lock held elsewhere");
                UnitOutcome::Skipped {
                    reason: SkipReason::LockHeld,
                }
            }
            LockAcquisition::Acquired(handle) => {
                let mut phase = UnitPhase::Pending;
                let budget = Duration::from_secs(self.config.unit_timeout_secs);

                let result = match tokio::time::timeout(budget, self.execute(kind, ctx, &mut phase)).await {
                    Ok(result) => result,
                    Err(_) => Err(UnitError::Timeout(self.config.unit_timeout_secs)),
                };
                handle.release().await;

                match result {
                    Ok(Some(records)) => {
                        info!(unit = %name, records, "Unit succeeded");
                        UnitOutcome::Succeeded { records }
                    }
                    Ok(None) => {
                        debug!(unit = %name, "Unit up to date, provider not called");
                        UnitOutcome::Skipped {
                            reason: SkipReason::UpToDate,
                        }
                    }
                    Err(e) => {
                        warn!(unit = %name, phase = ?phase, error = %e, "Unit failed");
                        UnitOutcome::Failed {
                            phase,
                            error: e.to_string(),
                        }
                    }
                }
            }
        };

        self.metrics.record(&outcome, now);

        UnitReport {
            unit: name,
            outcome,
            started_at: now,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Records written, or `None` when there was nothing to fetch
    async fn execute(
        &self,
        kind: UnitKind,
        ctx: &mut TickContext,
        phase: &mut UnitPhase,
    ) -> Result<Option<u64>, UnitError> {
        match kind {
            UnitKind::Teams => self.sync_teams(phase).await,
            UnitKind::YesterdayGames => {
                let yesterday = ctx.today.checked_sub_days(Days::new(1)).unwrap_or(ctx.today);
                self.sync_games(kind, &[yesterday], ctx, phase).await.map(Some)
            }
            UnitKind::TodayGames => {
                let today = ctx.today;
                self.sync_games(kind, &[today], ctx, phase).await.map(Some)
            }
            UnitKind::FutureGames { days } => {
                let dates: Vec<NaiveDate> = (1..=u64::from(days))
                    .filter_map(|n| ctx.today.checked_add_days(Days::new(n)))
                    .collect();
                self.sync_games(kind, &dates, ctx, phase).await.map(Some)
            }
            UnitKind::PlayerStats => self.sync_player_stats(ctx, phase).await,
        }
    }

    async fn sync_teams(&self, phase: &mut UnitPhase) -> Result<Option<u64>, UnitError> {
        *phase = UnitPhase::Fetching;
        let stored = self.store.count_all(EntityKind::Teams).await?;
        if stored >= self.config.expected_team_count {
            debug!(stored, expected = self.config.expected_team_count, "Team roster complete");
            return Ok(None);
        }

        let fetched = self.provider.fetch_teams().await?;

        *phase = UnitPhase::Reconciling;
        let existing: HashMap<i64, Team> = self
            .store
            .list_teams()
            .await?
            .into_iter()
            .map(|t| (t.external_id, t))
            .collect();

        let mut changed = 0;
        let mut persisted = Ok(());
        for team in &fetched {
            if existing.get(&team.external_id).is_some_and(|s| !team.differs_from(s)) {
                continue;
            }
            if let Err(e) = self.store.upsert_team(team).await {
                persisted = Err(e);
                break;
            }
            changed += 1;
        }

        // Rows written before a failure are visible to readers too
        if changed > 0 {
            self.cache.invalidate_pattern(keys::TEAMS_PREFIX).await;
        }
        persisted?;

        info!(stored, fetched = fetched.len(), changed, "Teams reconciled");
        Ok(Some(changed))
    }

    async fn sync_games(
        &self,
        kind: UnitKind,
        dates: &[NaiveDate],
        ctx: &mut TickContext,
        phase: &mut UnitPhase,
    ) -> Result<u64, UnitError> {
        *phase = UnitPhase::Fetching;
        let fetched = self.provider.fetch_games(dates).await?;

        *phase = UnitPhase::Reconciling;
        let mut changes = GameChanges::default();
        let persisted = self.reconcile_games(&fetched, &mut changes).await;
        self.invalidate_games(&changes).await;
        persisted?;

        match kind {
            UnitKind::TodayGames => {
                let live = fetched.iter().filter(|g| g.status.is_live()).count() as u64;
                ctx.live_games = Some(live);
            }
            UnitKind::FutureGames { .. } => {
                let upcoming = fetched
                    .iter()
                    .filter(|g| g.status == GameStatus::Scheduled)
                    .count() as u64;
                ctx.upcoming_games = Some(upcoming);
            }
            _ => {}
        }

        if matches!(kind, UnitKind::YesterdayGames | UnitKind::TodayGames) {
            ctx.stat_games
                .extend(fetched.iter().filter(|g| g.status.has_stats()).map(|g| g.external_id));
        }

        debug!(
            unit = %kind.name(),
            fetched = fetched.len(),
            changed = changes.records,
            "Games reconciled"
        );
        Ok(changes.records)
    }

    /// Upsert new or changed games, recording each write in `changes`
    ///
    /// On error, `changes` still covers the games written before it.
    async fn reconcile_games(&self, fetched: &[Game], changes: &mut GameChanges) -> Result<(), DbError> {
        let latest: BTreeMap<i64, &Game> = fetched.iter().map(|g| (g.external_id, g)).collect();
        if latest.is_empty() {
            return Ok(());
        }

        let ids: Vec<i64> = latest.keys().copied().collect();
        let stored: HashMap<i64, Game> = self
            .store
            .find_games(&ids)
            .await?
            .into_iter()
            .map(|g| (g.external_id, g))
            .collect();

        for game in latest.values() {
            match stored.get(&game.external_id) {
                Some(previous) if !game.differs_from(previous) => continue,
                // The stored copy's date and teams are stale cache scope too
                Some(previous) => changes.touch(previous),
                None => {}
            }
            self.store.upsert_game(game).await?;
            changes.touch(game);
            changes.records += 1;
        }

        Ok(())
    }

    async fn invalidate_games(&self, changes: &GameChanges) {
        if changes.records == 0 {
            return;
        }

        if changes.dates.is_empty() {
            self.cache.invalidate_pattern(keys::GAMES_PREFIX).await;
            return;
        }

        for date in &changes.dates {
            self.cache.invalidate(&keys::games_on(*date)).await;
        }
        for team in &changes.teams {
            self.cache.invalidate_pattern(&keys::team_games_prefix(*team)).await;
        }
        self.cache.invalidate_pattern(keys::GAMES_RANGE_PREFIX).await;
    }

    async fn sync_player_stats(&self, ctx: &TickContext, phase: &mut UnitPhase) -> Result<Option<u64>, UnitError> {
        if ctx.stat_games.is_empty() {
            debug!("No games with box scores this tick");
            return Ok(None);
        }

        *phase = UnitPhase::Fetching;
        let game_ids: Vec<i64> = ctx.stat_games.iter().copied().collect();
        let lines = self.provider.fetch_player_game_stats(&game_ids).await?;

        *phase = UnitPhase::Reconciling;
        let mut records = self.reconcile_players(lines.iter().map(|l| &l.player)).await?;

        let mut by_game: BTreeMap<i64, BTreeMap<i64, &PlayerGameStats>> = BTreeMap::new();
        for line in &lines {
            by_game
                .entry(line.stats.game_external_id)
                .or_default()
                .insert(line.stats.player_external_id, &line.stats);
        }

        for (game_id, fetched) in by_game {
            let stored: HashMap<i64, PlayerGameStats> = self
                .store
                .player_stats_for_game(game_id)
                .await?
                .into_iter()
                .map(|s| (s.player_external_id, s))
                .collect();

            let mut game_changed = false;
            let mut persisted = Ok(());
            for (player_id, stats) in fetched {
                if stored.get(&player_id).is_some_and(|s| !stats.differs_from(s)) {
                    continue;
                }
                if let Err(e) = self.store.upsert_player_stats(stats).await {
                    persisted = Err(e);
                    break;
                }
                records += 1;
                game_changed = true;
            }

            if game_changed {
                self.cache.invalidate(&keys::game_stats(game_id)).await;
            }
            persisted?;
        }

        debug!(games = game_ids.len(), lines = lines.len(), records, "Player stats reconciled");
        Ok(Some(records))
    }

    async fn reconcile_players<'a>(
        &self,
        fetched: impl Iterator<Item = &'a Player>,
    ) -> Result<u64, DbError> {
        let latest: BTreeMap<i64, &Player> = fetched.map(|p| (p.external_id, p)).collect();
        if latest.is_empty() {
            return Ok(0);
        }

        let ids: Vec<i64> = latest.keys().copied().collect();
        let stored: HashMap<i64, Player> = self
            .store
            .find_players(&ids)
            .await?
            .into_iter()
            .map(|p| (p.external_id, p))
            .collect();

        let mut changed = 0;
        for player in latest.values() {
            if stored.get(&player.external_id).is_some_and(|s| !player.differs_from(s)) {
                continue;
            }
            self.store.upsert_player(player).await?;
            changed += 1;
        }
        Ok(changed)
    }
}

#[async_trait]
impl TickRunner for Orchestrator {
    async fn run_tick(&self, state: &mut TickState) -> TickReport {
        self.run_tick_at(state, Utc::now()).await
    }

    async fn run_named(&self, name: &str, state: &mut TickState) -> Result<UnitReport, UnitError> {
        self.run_unit_by_name(name, state, Utc::now()).await
    }
}
