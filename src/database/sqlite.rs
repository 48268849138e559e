//! SQLite implementation of the Store trait
//!
//! This module provides a SQLite-based implementation of the Store trait
//! using rusqlite and tokio-rusqlite for async operations.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row};
use tokio_rusqlite::Connection;
use tracing::debug;

use super::migrations::CREATE_SCHEMA;
use super::Store;
use crate::error::DbError;
use crate::models::{EntityKind, Game, GameStatus, Player, PlayerGameStats, Team};

const DATE_FORMAT: &str = "%Y-%m-%d";

const GAME_COLUMNS: &str = "id, external_id, game_date, season, status, status_detail, period, \
     time, home_team_external_id, visitor_team_external_id, home_score, visitor_score, postseason";

/// SQLite-backed store
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (and migrate) a SQLite database
    ///
    /// Use `:memory:` for in-memory database or a file path for persistent storage.
    pub async fn new(path: &str) -> Result<Self, DbError> {
        Self::open(path, Duration::from_secs(5)).await
    }

    /// Open with an explicit busy timeout for shared database files
    pub async fn open(path: &str, busy_timeout: Duration) -> Result<Self, DbError> {
        let conn = Connection::open(path).await?;
        let file_backed = path != ":memory:";

        conn.call(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            if file_backed {
                conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
            }
            conn.execute_batch(CREATE_SCHEMA)?;
            Ok(())
        })
        .await?;

        debug!(path, "Store opened");
        Ok(Self { conn })
    }

    /// Create a new in-memory database (useful for testing)
    pub async fn in_memory() -> Result<Self, DbError> {
        Self::new(":memory:").await
    }

    /// Handle to the underlying connection, shared with the SQLite lock backend
    pub fn connection(&self) -> Connection {
        self.conn.clone()
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_team(&self, team: &Team) -> Result<i64, DbError> {
        let team = team.clone();

        self.conn
            .call(move |conn| {
                let id = conn.query_row(
                    r#"
                    INSERT INTO teams (external_id, name, full_name, abbreviation, city, conference, division)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    ON CONFLICT(external_id) DO UPDATE SET
                        name = excluded.name,
                        full_name = excluded.full_name,
                        abbreviation = excluded.abbreviation,
                        city = excluded.city,
                        conference = excluded.conference,
                        division = excluded.division,
                        updated_at = CURRENT_TIMESTAMP
                    RETURNING id
                    "#,
                    rusqlite::params![
                        team.external_id,
                        team.name,
                        team.full_name,
                        team.abbreviation,
                        team.city,
                        team.conference,
                        team.division
                    ],
                    |row| row.get(0),
                )?;
                Ok(id)
            })
            .await
            .map_err(Into::into)
    }

    async fn upsert_game(&self, game: &Game) -> Result<i64, DbError> {
        let game = game.clone();

        self.conn
            .call(move |conn| {
                let home_id = team_local_id(conn, game.home_team_external_id)?;
                let visitor_id = team_local_id(conn, game.visitor_team_external_id)?;

                let id = conn.query_row(
                    r#"
                    INSERT INTO games (
                        external_id, game_date, season, status, status_detail, period, time,
                        home_team_id, visitor_team_id, home_team_external_id, visitor_team_external_id,
                        home_score, visitor_score, postseason
                    )
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                    ON CONFLICT(external_id) DO UPDATE SET
                        game_date = excluded.game_date,
                        season = excluded.season,
                        status = excluded.status,
                        status_detail = excluded.status_detail,
                        period = excluded.period,
                        time = excluded.time,
                        home_team_id = excluded.home_team_id,
                        visitor_team_id = excluded.visitor_team_id,
                        home_team_external_id = excluded.home_team_external_id,
                        visitor_team_external_id = excluded.visitor_team_external_id,
                        home_score = excluded.home_score,
                        visitor_score = excluded.visitor_score,
                        postseason = excluded.postseason,
                        updated_at = CURRENT_TIMESTAMP
                    RETURNING id
                    "#,
                    rusqlite::params![
                        game.external_id,
                        game.date.format(DATE_FORMAT).to_string(),
                        game.season,
                        game.status.as_str(),
                        game.status_detail,
                        game.period,
                        game.time,
                        home_id,
                        visitor_id,
                        game.home_team_external_id,
                        game.visitor_team_external_id,
                        game.home_score,
                        game.visitor_score,
                        game.postseason
                    ],
                    |row| row.get(0),
                )?;
                Ok(id)
            })
            .await
            .map_err(Into::into)
    }

    async fn upsert_player(&self, player: &Player) -> Result<i64, DbError> {
        let player = player.clone();

        self.conn
            .call(move |conn| {
                let id = conn.query_row(
                    r#"
                    INSERT INTO players (external_id, first_name, last_name, position, team_external_id)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    ON CONFLICT(external_id) DO UPDATE SET
                        first_name = excluded.first_name,
                        last_name = excluded.last_name,
                        position = excluded.position,
                        team_external_id = excluded.team_external_id,
                        updated_at = CURRENT_TIMESTAMP
                    RETURNING id
                    "#,
                    rusqlite::params![
                        player.external_id,
                        player.first_name,
                        player.last_name,
                        player.position,
                        player.team_external_id
                    ],
                    |row| row.get(0),
                )?;
                Ok(id)
            })
            .await
            .map_err(Into::into)
    }

    async fn upsert_player_stats(&self, stats: &PlayerGameStats) -> Result<i64, DbError> {
        let stats = stats.clone();

        self.conn
            .call(move |conn| {
                let player_id = local_id(conn, "players", "player", stats.player_external_id)?;
                let game_id = local_id(conn, "games", "game", stats.game_external_id)?;

                let id = conn.query_row(
                    r#"
                    INSERT INTO player_game_stats (
                        player_id, game_id, player_external_id, game_external_id, team_external_id,
                        minutes, points, rebounds, assists, steals, blocks, turnovers
                    )
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                    ON CONFLICT(player_external_id, game_external_id) DO UPDATE SET
                        team_external_id = excluded.team_external_id,
                        minutes = excluded.minutes,
                        points = excluded.points,
                        rebounds = excluded.rebounds,
                        assists = excluded.assists,
                        steals = excluded.steals,
                        blocks = excluded.blocks,
                        turnovers = excluded.turnovers,
                        updated_at = CURRENT_TIMESTAMP
                    RETURNING id
                    "#,
                    rusqlite::params![
                        player_id,
                        game_id,
                        stats.player_external_id,
                        stats.game_external_id,
                        stats.team_external_id,
                        stats.minutes,
                        stats.points,
                        stats.rebounds,
                        stats.assists,
                        stats.steals,
                        stats.blocks,
                        stats.turnovers
                    ],
                    |row| row.get(0),
                )?;
                Ok(id)
            })
            .await
            .map_err(Into::into)
    }

    async fn count_all(&self, kind: EntityKind) -> Result<u64, DbError> {
        let table = match kind {
            EntityKind::Teams => "teams",
            EntityKind::Games => "games",
            EntityKind::Players => "players",
            EntityKind::PlayerStats => "player_game_stats",
        };

        self.conn
            .call(move |conn| {
                let count: i64 =
                    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Into::into)
    }

    async fn list_teams(&self) -> Result<Vec<Team>, DbError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT id, external_id, name, full_name, abbreviation, city, conference, division
                    FROM teams
                    ORDER BY full_name
                    "#,
                )?;

                let teams = stmt
                    .query_map([], |row| {
                        Ok(Team {
                            id: Some(row.get(0)?),
                            external_id: row.get(1)?,
                            name: row.get(2)?,
                            full_name: row.get(3)?,
                            abbreviation: row.get(4)?,
                            city: row.get(5)?,
                            conference: row.get(6)?,
                            division: row.get(7)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(teams)
            })
            .await
            .map_err(Into::into)
    }

    async fn find_games(&self, external_ids: &[i64]) -> Result<Vec<Game>, DbError> {
        if external_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = external_ids.to_vec();

        self.conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT {GAME_COLUMNS} FROM games WHERE external_id IN ({}) ORDER BY game_date, external_id",
                    placeholders(ids.len())
                );
                let mut stmt = conn.prepare(&sql)?;
                let games = stmt
                    .query_map(rusqlite::params_from_iter(ids.iter()), game_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(games)
            })
            .await
            .map_err(Into::into)
    }

    async fn find_players(&self, external_ids: &[i64]) -> Result<Vec<Player>, DbError> {
        if external_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = external_ids.to_vec();

        self.conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT id, external_id, first_name, last_name, position, team_external_id \
                     FROM players WHERE external_id IN ({})",
                    placeholders(ids.len())
                );
                let mut stmt = conn.prepare(&sql)?;
                let players = stmt
                    .query_map(rusqlite::params_from_iter(ids.iter()), |row| {
                        Ok(Player {
                            id: Some(row.get(0)?),
                            external_id: row.get(1)?,
                            first_name: row.get(2)?,
                            last_name: row.get(3)?,
                            position: row.get(4)?,
                            team_external_id: row.get(5)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(players)
            })
            .await
            .map_err(Into::into)
    }

    async fn games_by_date_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Game>, DbError> {
        let from = from.format(DATE_FORMAT).to_string();
        let to = to.format(DATE_FORMAT).to_string();

        self.conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT {GAME_COLUMNS} FROM games WHERE game_date BETWEEN ?1 AND ?2 \
                     ORDER BY game_date, external_id"
                );
                let mut stmt = conn.prepare(&sql)?;
                let games = stmt
                    .query_map(rusqlite::params![from, to], game_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(games)
            })
            .await
            .map_err(Into::into)
    }

    async fn games_for_team(
        &self,
        team_external_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Game>, DbError> {
        let from = from.format(DATE_FORMAT).to_string();
        let to = to.format(DATE_FORMAT).to_string();

        self.conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT {GAME_COLUMNS} FROM games \
                     WHERE (home_team_external_id = ?1 OR visitor_team_external_id = ?1) \
                     AND game_date BETWEEN ?2 AND ?3 \
                     ORDER BY game_date, external_id"
                );
                let mut stmt = conn.prepare(&sql)?;
                let games = stmt
                    .query_map(rusqlite::params![team_external_id, from, to], game_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(games)
            })
            .await
            .map_err(Into::into)
    }

    async fn player_stats_for_game(
        &self,
        game_external_id: i64,
    ) -> Result<Vec<PlayerGameStats>, DbError> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT id, player_external_id, game_external_id, team_external_id, minutes,
                           points, rebounds, assists, steals, blocks, turnovers
                    FROM player_game_stats
                    WHERE game_external_id = ?1
                    ORDER BY points DESC, player_external_id
                    "#,
                )?;

                let stats = stmt
                    .query_map([game_external_id], |row| {
                        Ok(PlayerGameStats {
                            id: Some(row.get(0)?),
                            player_external_id: row.get(1)?,
                            game_external_id: row.get(2)?,
                            team_external_id: row.get(3)?,
                            minutes: row.get(4)?,
                            points: row.get(5)?,
                            rebounds: row.get(6)?,
                            assists: row.get(7)?,
                            steals: row.get(8)?,
                            blocks: row.get(9)?,
                            turnovers: row.get(10)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(stats)
            })
            .await
            .map_err(Into::into)
    }
}

fn team_local_id(conn: &rusqlite::Connection, external_id: i64) -> tokio_rusqlite::Result<i64> {
    local_id(conn, "teams", "team", external_id)
}

/// Resolve an external id to a local row id, failing with `MissingReference`
fn local_id(
    conn: &rusqlite::Connection,
    table: &str,
    what: &str,
    external_id: i64,
) -> tokio_rusqlite::Result<i64> {
    let id: Option<i64> = conn
        .query_row(
            &format!("SELECT id FROM {table} WHERE external_id = ?1"),
            [external_id],
            |row| row.get(0),
        )
        .optional()?;

    id.ok_or_else(|| {
        tokio_rusqlite::Error::Other(Box::new(DbError::MissingReference(format!(
            "{what} {external_id}"
        ))))
    })
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn game_from_row(row: &Row<'_>) -> rusqlite::Result<Game> {
    let date: String = row.get(2)?;
    let date = NaiveDate::parse_from_str(&date, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
    let status: String = row.get(4)?;

    Ok(Game {
        id: Some(row.get(0)?),
        external_id: row.get(1)?,
        date,
        season: row.get(3)?,
        status: GameStatus::parse(&status).unwrap_or_default(),
        status_detail: row.get(5)?,
        period: row.get(6)?,
        time: row.get(7)?,
        home_team_external_id: row.get(8)?,
        visitor_team_external_id: row.get(9)?,
        home_score: row.get(10)?,
        visitor_score: row.get(11)?,
        postseason: row.get(12)?,
    })
}
