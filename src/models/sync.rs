//! Sync unit bookkeeping and outcome models
//!
//! A sync unit is a named piece of work the orchestrator runs on a tick.
//! These types carry its identity, its last outcome and the aggregate
//! counters used for health evaluation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kinds of work a tick can contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum UnitKind {
    Teams,
    YesterdayGames,
    TodayGames,
    FutureGames { days: u32 },
    PlayerStats,
}

impl UnitKind {
    /// Stable unit name, also used as the lock resource
    pub fn name(&self) -> String {
        match self {
            UnitKind::Teams => "teams".to_string(),
            UnitKind::YesterdayGames => "games:yesterday".to_string(),
            UnitKind::TodayGames => "games:today".to_string(),
            UnitKind::FutureGames { days } => format!("games:future:{days}d"),
            UnitKind::PlayerStats => "player-stats".to_string(),
        }
    }

    /// Inverse of `name`
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "teams" => Some(UnitKind::Teams),
            "games:yesterday" => Some(UnitKind::YesterdayGames),
            "games:today" => Some(UnitKind::TodayGames),
            "player-stats" => Some(UnitKind::PlayerStats),
            other => other
                .strip_prefix("games:future:")
                .and_then(|rest| rest.strip_suffix('d'))
                .and_then(|days| days.parse().ok())
                .filter(|days: &u32| *days > 0)
                .map(|days| UnitKind::FutureGames { days }),
        }
    }
}

/// Where a unit was when it stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitPhase {
    Pending,
    Fetching,
    Reconciling,
    Persisted,
    Failed,
    Skipped,
}

/// Why a unit did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Another instance holds the unit's lock
    LockHeld,
    /// Local data was already complete; the provider was not called
    UpToDate,
}

/// Result of one unit attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum UnitOutcome {
    /// Persisted; `records` counts new or changed entities
    Succeeded { records: u64 },
    /// Stopped in `phase` with `error`
    Failed { phase: UnitPhase, error: String },
    Skipped { reason: SkipReason },
}

impl UnitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UnitOutcome::Succeeded { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, UnitOutcome::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, UnitOutcome::Skipped { .. })
    }

    /// Terminal phase of the unit state machine for this outcome
    pub fn phase(&self) -> UnitPhase {
        match self {
            UnitOutcome::Succeeded { .. } => UnitPhase::Persisted,
            UnitOutcome::Failed { .. } => UnitPhase::Failed,
            UnitOutcome::Skipped { .. } => UnitPhase::Skipped,
        }
    }
}

/// Report for one unit attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitReport {
    pub unit: String,
    pub outcome: UnitOutcome,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Per-unit state kept across ticks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncUnit {
    pub name: String,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub ticks_since_success: u32,
    pub last_outcome: Option<UnitOutcome>,
}

impl SyncUnit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            last_run_at: None,
            last_success_at: None,
            ticks_since_success: 0,
            last_outcome: None,
        }
    }

    /// Fold an attempt's outcome into the unit state
    pub fn record(&mut self, outcome: &UnitOutcome, at: DateTime<Utc>) {
        self.last_run_at = Some(at);
        if outcome.is_success() {
            self.last_success_at = Some(at);
            self.ticks_since_success = 0;
        }
        self.last_outcome = Some(outcome.clone());
    }

    pub fn has_succeeded(&self) -> bool {
        self.last_success_at.is_some()
    }
}

/// Everything a tick did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub started_at: DateTime<Utc>,
    pub units: Vec<UnitReport>,

    /// Number of games in progress today, as last known
    pub live_games: Option<u64>,

    /// Number of scheduled games in the future window, as last known
    pub upcoming_games: Option<u64>,
}

impl TickReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            units: Vec::new(),
            live_games: None,
            upcoming_games: None,
        }
    }

    pub fn has_live_games(&self) -> bool {
        self.live_games.unwrap_or(0) > 0
    }

    /// At least one unit ran and every unit that ran failed
    pub fn all_failed(&self) -> bool {
        let mut executed = self.units.iter().filter(|u| !u.outcome.is_skipped()).peekable();
        executed.peek().is_some() && executed.all(|u| u.outcome.is_failure())
    }

    pub fn succeeded(&self) -> usize {
        self.units.iter().filter(|u| u.outcome.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.units.iter().filter(|u| u.outcome.is_failure()).count()
    }

    pub fn skipped(&self) -> usize {
        self.units.iter().filter(|u| u.outcome.is_skipped()).count()
    }
}

/// Snapshot of the sync counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMetrics {
    pub total_syncs: u64,
    pub successful_syncs: u64,
    pub failed_syncs: u64,
    pub consecutive_failures: u64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub tracking_since: DateTime<Utc>,
}

impl SyncMetrics {
    /// Success rate as a percentage; 0 with no syncs
    pub fn success_rate(&self) -> f64 {
        if self.total_syncs == 0 {
            0.0
        } else {
            (self.successful_syncs as f64 / self.total_syncs as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcome: UnitOutcome) -> UnitReport {
        UnitReport {
            unit: "games:today".to_string(),
            outcome,
            started_at: Utc::now(),
            duration_ms: 1,
        }
    }

    // Test 1: Unit names roundtrip through parse
    #[test]
    fn test_unit_names() {
        let kinds = [
            UnitKind::Teams,
            UnitKind::YesterdayGames,
            UnitKind::TodayGames,
            UnitKind::FutureGames { days: 7 },
            UnitKind::PlayerStats,
        ];
        let names: Vec<String> = kinds.iter().map(|k| k.name()).collect();
        assert_eq!(
            names,
            vec![
                "teams",
                "games:yesterday",
                "games:today",
                "games:future:7d",
                "player-stats"
            ]
        );
        for kind in kinds {
            assert_eq!(UnitKind::parse(&kind.name()), Some(kind));
        }
        assert_eq!(UnitKind::parse("games:future:0d"), None);
        assert_eq!(UnitKind::parse("games:future:xd"), None);
        assert_eq!(UnitKind::parse("players"), None);
    }

    // Test 2: Recording a success resets the tick counter
    #[test]
    fn test_sync_unit_record() {
        let mut unit = SyncUnit::new("teams");
        let now = Utc::now();
        unit.ticks_since_success = 4;

        unit.record(
            &UnitOutcome::Failed {
                phase: UnitPhase::Fetching,
                error: "timeout".into(),
            },
            now,
        );
        assert_eq!(unit.last_run_at, Some(now));
        assert!(!unit.has_succeeded());
        assert_eq!(unit.ticks_since_success, 4);

        unit.record(&UnitOutcome::Succeeded { records: 3 }, now);
        assert_eq!(unit.last_success_at, Some(now));
        assert_eq!(unit.ticks_since_success, 0);
    }

    // Test 3: all_failed ignores skipped units and needs at least one run
    #[test]
    fn test_tick_report_all_failed() {
        let failed = UnitOutcome::Failed {
            phase: UnitPhase::Fetching,
            error: "x".into(),
        };
        let skipped = UnitOutcome::Skipped {
            reason: SkipReason::LockHeld,
        };

        let mut tick = TickReport::new(Utc::now());
        assert!(!tick.all_failed());

        tick.units.push(report(skipped.clone()));
        assert!(!tick.all_failed());

        tick.units.push(report(failed.clone()));
        assert!(tick.all_failed());

        tick.units.push(report(UnitOutcome::Succeeded { records: 0 }));
        assert!(!tick.all_failed());
        assert_eq!((tick.succeeded(), tick.failed(), tick.skipped()), (1, 1, 1));
    }

    // Test 4: Success rate is a percentage
    #[test]
    fn test_success_rate() {
        let mut metrics = SyncMetrics {
            total_syncs: 0,
            successful_syncs: 0,
            failed_syncs: 0,
            consecutive_failures: 0,
            last_success_at: None,
            last_attempt_at: None,
            tracking_since: Utc::now(),
        };
        assert_eq!(metrics.success_rate(), 0.0);

        metrics.total_syncs = 4;
        metrics.successful_syncs = 3;
        assert!((metrics.success_rate() - 75.0).abs() < f64::EPSILON);
    }

    // Test 5: Outcomes serialize with a status tag
    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(UnitOutcome::Skipped {
            reason: SkipReason::LockHeld,
        })
        .unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["reason"], "lock_held");
    }
}
