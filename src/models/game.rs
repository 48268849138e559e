//! Game domain model and status mapping

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

/// Normalized game state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    #[default]
    Scheduled,
    InProgress,
    Final,
    Postponed,
}

impl GameStatus {
    /// Map a provider status string onto a normalized status
    ///
    /// Providers report "Final" for finished games, a tip-off time for
    /// scheduled ones and a period description ("2nd Qtr", "Halftime")
    /// while the game is being played.
    pub fn from_provider(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return GameStatus::Scheduled;
        }
        if trimmed.eq_ignore_ascii_case("final") || trimmed.to_ascii_lowercase().starts_with("final/") {
            return GameStatus::Final;
        }
        if DateTime::parse_from_rfc3339(trimmed).is_ok() {
            return GameStatus::Scheduled;
        }

        let lower = trimmed.to_ascii_lowercase();
        if ["postponed", "canceled", "cancelled", "suspended"]
            .iter()
            .any(|w| lower.contains(w))
        {
            return GameStatus::Postponed;
        }
        if lower.ends_with(" et") || lower.ends_with(" pm") || lower.ends_with(" am") {
            return GameStatus::Scheduled;
        }

        GameStatus::InProgress
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GameStatus::Scheduled => "scheduled",
            GameStatus::InProgress => "in_progress",
            GameStatus::Final => "final",
            GameStatus::Postponed => "postponed",
        }
    }

    /// Parse the value written by `as_str`
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "scheduled" => Some(GameStatus::Scheduled),
            "in_progress" => Some(GameStatus::InProgress),
            "final" => Some(GameStatus::Final),
            "postponed" => Some(GameStatus::Postponed),
            _ => None,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, GameStatus::InProgress)
    }

    /// Whether box-score lines can exist for this game
    pub fn has_stats(&self) -> bool {
        matches!(self, GameStatus::InProgress | GameStatus::Final)
    }
}

/// A single game, correlated to the provider by `external_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: Option<i64>,
    pub external_id: i64,

    /// League-local calendar date
    pub date: NaiveDate,
    pub season: i32,
    pub status: GameStatus,

    /// Raw provider status text ("3rd Qtr", "Final", tip-off time)
    pub status_detail: String,
    pub period: i32,
    pub time: Option<String>,

    pub home_team_external_id: i64,
    pub visitor_team_external_id: i64,
    pub home_score: i32,
    pub visitor_score: i32,
    pub postseason: bool,
}

impl Game {
    /// True when the provider copy carries different content than the stored row
    pub fn differs_from(&self, stored: &Game) -> bool {
        self.external_id != stored.external_id
            || self.date != stored.date
            || self.season != stored.season
            || self.status != stored.status
            || self.status_detail != stored.status_detail
            || self.period != stored.period
            || self.time != stored.time
            || self.home_team_external_id != stored.home_team_external_id
            || self.visitor_team_external_id != stored.visitor_team_external_id
            || self.home_score != stored.home_score
            || self.visitor_score != stored.visitor_score
            || self.postseason != stored.postseason
    }

    pub fn team_external_ids(&self) -> [i64; 2] {
        [self.home_team_external_id, self.visitor_team_external_id]
    }
}
