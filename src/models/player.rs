//! Player and box-score models

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: Option<i64>,
    pub external_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub position: Option<String>,
    pub team_external_id: Option<i64>,
}

impl Player {
    pub fn differs_from(&self, stored: &Player) -> bool {
        self.first_name != stored.first_name
            || self.last_name != stored.last_name
            || self.position != stored.position
            || self.team_external_id != stored.team_external_id
    }
}

/// One player's line for one game, keyed on (player, game) external ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerGameStats {
    pub id: Option<i64>,
    pub player_external_id: i64,
    pub game_external_id: i64,
    pub team_external_id: i64,
    pub minutes: Option<String>,
    pub points: i32,
    pub rebounds: i32,
    pub assists: i32,
    pub steals: i32,
    pub blocks: i32,
    pub turnovers: i32,
}

impl PlayerGameStats {
    pub fn differs_from(&self, stored: &PlayerGameStats) -> bool {
        self.team_external_id != stored.team_external_id
            || self.minutes != stored.minutes
            || self.points != stored.points
            || self.rebounds != stored.rebounds
            || self.assists != stored.assists
            || self.steals != stored.steals
            || self.blocks != stored.blocks
            || self.turnovers != stored.turnovers
    }
}

/// A box-score line as returned by the provider: the player plus their stats
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatLine {
    pub player: Player,
    pub stats: PlayerGameStats,
}
