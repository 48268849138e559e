//! Domain models for league-sync
//!
//! Entities synced from the provider, plus the bookkeeping types of the
//! sync engine itself.

pub mod game;
pub mod player;
pub mod sync;
pub mod team;

pub use game::{Game, GameStatus};
pub use player::{Player, PlayerGameStats, StatLine};
pub use sync::{
    SkipReason, SyncMetrics, SyncUnit, TickReport, UnitKind, UnitOutcome, UnitPhase, UnitReport,
};
pub use team::Team;

/// Entity tables that can be counted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Teams,
    Games,
    Players,
    PlayerStats,
}
