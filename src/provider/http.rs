//! HTTP JSON provider client
//!
//! Talks to a balldontlie-style API: `GET /teams`, `GET /games?dates[]=`,
//! `GET /stats?game_ids[]=`, with cursor pagination through `meta.next_cursor`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::SportsProvider;
use crate::config::ProviderConfig;
use crate::error::SyncError;
use crate::models::{Game, GameStatus, Player, PlayerGameStats, StatLine, Team};
use crate::sync::http_client::HttpClientWithRateLimit;

/// Upper bound on pages followed for one request
const MAX_PAGES: usize = 50;

/// Ids per request for list filters
const ID_CHUNK: usize = 50;

pub struct HttpSportsProvider {
    client: HttpClientWithRateLimit,
    base_url: String,
    page_size: u32,
}

impl HttpSportsProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, SyncError> {
        let client = HttpClientWithRateLimit::new(
            config.rate_limit.clone(),
            Duration::from_secs(config.request_timeout_secs),
            config.api_key.as_deref(),
        )?;
        Ok(Self::with_client(client, &config.base_url, config.page_size))
    }

    pub fn with_client(client: HttpClientWithRateLimit, base_url: &str, page_size: u32) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            page_size: page_size.max(1),
        }
    }

    /// Follow `meta.next_cursor` until exhausted
    async fn fetch_paginated<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<Vec<T>, SyncError> {
        let url = format!("{}{}", self.base_url, path);
        let mut items = Vec::new();
        let mut cursor: Option<i64> = None;

        for page_no in 1..=MAX_PAGES {
            let mut query = params.to_vec();
            query.push(("per_page".to_string(), self.page_size.to_string()));
            if let Some(c) = cursor {
                query.push(("cursor".to_string(), c.to_string()));
            }

            let page: Page<T> = self.client.get_json(&url, &query).await?;
            let fetched = page.data.len();
            items.extend(page.data);

            let next = page.meta.and_then(|m| m.next_cursor);
            debug!(path, page = page_no, fetched, next_cursor = ?next, "Fetched page");

            match next {
                Some(n) if fetched > 0 && Some(n) != cursor => cursor = Some(n),
                _ => break,
            }
        }

        Ok(items)
    }
}

#[async_trait]
impl SportsProvider for HttpSportsProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch_teams(&self) -> Result<Vec<Team>, SyncError> {
        let teams: Vec<ApiTeam> = self.fetch_paginated("/teams", &[]).await?;
        Ok(teams.into_iter().map(Team::from).collect())
    }

    async fn fetch_games(&self, dates: &[NaiveDate]) -> Result<Vec<Game>, SyncError> {
        if dates.is_empty() {
            return Ok(Vec::new());
        }

        let params: Vec<(String, String)> = dates
            .iter()
            .map(|d| ("dates[]".to_string(), d.format("%Y-%m-%d").to_string()))
            .collect();

        let games: Vec<ApiGame> = self.fetch_paginated("/games", &params).await?;
        games.into_iter().map(Game::try_from).collect()
    }

    async fn fetch_player_game_stats(&self, game_ids: &[i64]) -> Result<Vec<StatLine>, SyncError> {
        let mut lines = Vec::new();

        for chunk in game_ids.chunks(ID_CHUNK) {
            let params: Vec<(String, String)> = chunk
                .iter()
                .map(|id| ("game_ids[]".to_string(), id.to_string()))
                .collect();
            let stats: Vec<ApiStat> = self.fetch_paginated("/stats", &params).await?;
            lines.extend(stats.into_iter().map(StatLine::from));
        }

        Ok(lines)
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct Page<T> {
    data: Vec<T>,
    #[serde(default)]
    meta: Option<Meta>,
}

#[derive(Debug, Deserialize)]
struct Meta {
    #[serde(default)]
    next_cursor: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ApiTeam {
    id: i64,
    name: String,
    full_name: String,
    abbreviation: String,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    conference: Option<String>,
    #[serde(default)]
    division: Option<String>,
}

impl From<ApiTeam> for Team {
    fn from(t: ApiTeam) -> Self {
        Team {
            id: None,
            external_id: t.id,
            name: t.name,
            full_name: t.full_name,
            abbreviation: t.abbreviation,
            city: t.city.unwrap_or_default(),
            conference: t.conference.unwrap_or_default(),
            division: t.division.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdRef {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct ApiGame {
    id: i64,
    date: String,
    season: i32,
    #[serde(default)]
    status: String,
    #[serde(default)]
    period: Option<i32>,
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    postseason: bool,
    #[serde(default)]
    home_team_score: Option<i32>,
    #[serde(default)]
    visitor_team_score: Option<i32>,
    home_team: IdRef,
    visitor_team: IdRef,
}

impl TryFrom<ApiGame> for Game {
    type Error = SyncError;

    fn try_from(g: ApiGame) -> Result<Self, Self::Error> {
        let day = g.date.get(..10).unwrap_or(&g.date);
        let date = NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|e| {
            SyncError::InvalidData(format!("game {} has bad date {:?}: {e}", g.id, g.date))
        })?;

        Ok(Game {
            id: None,
            external_id: g.id,
            date,
            season: g.season,
            status: GameStatus::from_provider(&g.status),
            status_detail: g.status,
            period: g.period.unwrap_or(0),
            time: g.time.filter(|t| !t.trim().is_empty()),
            home_team_external_id: g.home_team.id,
            visitor_team_external_id: g.visitor_team.id,
            home_score: g.home_team_score.unwrap_or(0),
            visitor_score: g.visitor_team_score.unwrap_or(0),
            postseason: g.postseason,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiPlayer {
    id: i64,
    first_name: String,
    last_name: String,
    #[serde(default)]
    position: Option<String>,
    #[serde(default)]
    team_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ApiStat {
    #[serde(default)]
    min: Option<String>,
    #[serde(default)]
    pts: Option<i32>,
    #[serde(default)]
    reb: Option<i32>,
    #[serde(default)]
    ast: Option<i32>,
    #[serde(default)]
    stl: Option<i32>,
    #[serde(default)]
    blk: Option<i32>,
    #[serde(default)]
    turnover: Option<i32>,
    player: ApiPlayer,
    team: IdRef,
    game: IdRef,
}

impl From<ApiStat> for StatLine {
    fn from(s: ApiStat) -> Self {
        let player = Player {
            id: None,
            external_id: s.player.id,
            first_name: s.player.first_name,
            last_name: s.player.last_name,
            position: s.player.position.filter(|p| !p.is_empty()),
            team_external_id: s.player.team_id.or(Some(s.team.id)),
        };
        let stats = PlayerGameStats {
            id: None,
            player_external_id: player.external_id,
            game_external_id: s.game.id,
            team_external_id: s.team.id,
            minutes: s.min.filter(|m| !m.is_empty()),
            points: s.pts.unwrap_or(0),
            rebounds: s.reb.unwrap_or(0),
            assists: s.ast.unwrap_or(0),
            steals: s.stl.unwrap_or(0),
            blocks: s.blk.unwrap_or(0),
            turnovers: s.turnover.unwrap_or(0),
        };
        StatLine { player, stats }
    }
}
