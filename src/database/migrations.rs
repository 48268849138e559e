//! Database migrations for league-sync
//!
//! This module contains SQL migrations for the SQLite database schema.

/// SQL statement to create the entity schema
pub const CREATE_SCHEMA: &str = r#"
-- Teams
CREATE TABLE IF NOT EXISTS teams (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id INTEGER NOT NULL UNIQUE,
    name TEXT NOT NULL,
    full_name TEXT NOT NULL,
    abbreviation TEXT NOT NULL,
    city TEXT NOT NULL DEFAULT '',
    conference TEXT NOT NULL DEFAULT '',
    division TEXT NOT NULL DEFAULT '',
    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

-- Games
CREATE TABLE IF NOT EXISTS games (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id INTEGER NOT NULL UNIQUE,
    game_date TEXT NOT NULL,
    season INTEGER NOT NULL,
    status TEXT NOT NULL,
    status_detail TEXT NOT NULL DEFAULT '',
    period INTEGER NOT NULL DEFAULT 0,
    time TEXT,
    home_team_id INTEGER NOT NULL REFERENCES teams(id),
    visitor_team_id INTEGER NOT NULL REFERENCES teams(id),
    home_team_external_id INTEGER NOT NULL,
    visitor_team_external_id INTEGER NOT NULL,
    home_score INTEGER NOT NULL DEFAULT 0,
    visitor_score INTEGER NOT NULL DEFAULT 0,
    postseason INTEGER NOT NULL DEFAULT 0,
    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_games_date ON games(game_date);
CREATE INDEX IF NOT EXISTS idx_games_home ON games(home_team_external_id, game_date);
CREATE INDEX IF NOT EXISTS idx_games_visitor ON games(visitor_team_external_id, game_date);

-- Players
CREATE TABLE IF NOT EXISTS players (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id INTEGER NOT NULL UNIQUE,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    position TEXT,
    team_external_id INTEGER,
    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

-- Box-score lines
CREATE TABLE IF NOT EXISTS player_game_stats (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    player_id INTEGER NOT NULL REFERENCES players(id),
    game_id INTEGER NOT NULL REFERENCES games(id),
    player_external_id INTEGER NOT NULL,
    game_external_id INTEGER NOT NULL,
    team_external_id INTEGER NOT NULL,
    minutes TEXT,
    points INTEGER NOT NULL DEFAULT 0,
    rebounds INTEGER NOT NULL DEFAULT 0,
    assists INTEGER NOT NULL DEFAULT 0,
    steals INTEGER NOT NULL DEFAULT 0,
    blocks INTEGER NOT NULL DEFAULT 0,
    turnovers INTEGER NOT NULL DEFAULT 0,
    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(player_external_id, game_external_id)
);

CREATE INDEX IF NOT EXISTS idx_stats_game ON player_game_stats(game_external_id);
"#;

/// Lease table used by the SQLite lock backend
pub const CREATE_LOCK_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sync_locks (
    resource TEXT PRIMARY KEY,
    token TEXT NOT NULL,
    expires_at_ms INTEGER NOT NULL
);
"#;
