//! Provider client integration tests
//!
//! Runs the HTTP provider and its resilience wrapper against a mock API.

mod common;

use common::day;
use league_sync::config::{CircuitBreakerConfig, ProviderConfig, RateLimitConfig, RetryConfig};
use league_sync::error::SyncError;
use league_sync::models::GameStatus;
use league_sync::provider::{HttpSportsProvider, ResilientProvider, SportsProvider};
use league_sync::sync::CircuitState;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider_config(server: &MockServer, max_retries: u32, failure_threshold: u32) -> ProviderConfig {
    ProviderConfig {
        base_url: server.uri(),
        page_size: 2,
        rate_limit: RateLimitConfig {
            min_interval_ms: 0,
            max_concurrent: 4,
            rate_limit_wait_secs: 1,
        },
        retry: RetryConfig {
            max_retries,
            initial_backoff_ms: 10,
            max_backoff_ms: 20,
            backoff_multiplier: 2.0,
            jitter: false,
        },
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold,
            failure_window_secs: 60,
            open_duration_secs: 60,
        },
        ..ProviderConfig::default()
    }
}

fn resilient(config: &ProviderConfig) -> ResilientProvider<HttpSportsProvider> {
    ResilientProvider::new(HttpSportsProvider::new(config).unwrap(), config)
}

fn team_json(id: i64, name: &str, abbr: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "full_name": format!("City {name}"),
        "abbreviation": abbr,
        "city": "City",
        "conference": "East",
        "division": "Atlantic"
    })
}

/// Test 1: Teams are collected across cursor pages
#[tokio::test]
async fn test_teams_follow_pagination() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/teams"))
        .and(query_param("cursor", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [team_json(3, "Nets", "BKN")],
            "meta": {"next_cursor": null}
        })))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/teams"))
        .and(query_param("per_page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [team_json(1, "Hawks", "ATL"), team_json(2, "Celtics", "BOS")],
            "meta": {"next_cursor": 2}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = provider_config(&server, 0, 5);
    let teams = HttpSportsProvider::new(&config).unwrap().fetch_teams().await.unwrap();

    let ids: Vec<i64> = teams.iter().map(|t| t.external_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(teams[1].full_name, "City Celtics");
    assert_eq!(teams[2].abbreviation, "BKN");
}

/// Test 2: Games are requested by date and mapped to domain values
#[tokio::test]
async fn test_games_by_date() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/games"))
        .and(query_param("dates[]", "2024-01-15"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {
                    "id": 501, "date": "2024-01-15", "season": 2023,
                    "status": "Final", "period": 4, "time": "Final",
                    "home_team_score": 110, "visitor_team_score": 104,
                    "home_team": {"id": 1}, "visitor_team": {"id": 2}
                },
                {
                    "id": 502, "date": "2024-01-15T00:00:00.000Z", "season": 2023,
                    "status": "7:30 pm ET", "period": 0, "time": " ",
                    "home_team": {"id": 3}, "visitor_team": {"id": 4}
                }
            ],
            "meta": {}
        })))
        .mount(&server)
        .await;

    let config = provider_config(&server, 0, 5);
    let games = HttpSportsProvider::new(&config)
        .unwrap()
        .fetch_games(&[day(15)])
        .await
        .unwrap();

    assert_eq!(games.len(), 2);
    assert_eq!(games[0].status, GameStatus::Final);
    assert_eq!(games[0].home_score, 110);
    assert_eq!(games[1].date, day(15));
    assert_eq!(games[1].status, GameStatus::Scheduled);
    assert_eq!(games[1].time, None);
    assert_eq!(games[1].visitor_score, 0);
}

/// Test 3: Box scores come back as player and stat pairs
#[tokio::test]
async fn test_player_stats_for_games() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/stats"))
        .and(query_param("game_ids[]", "501"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{
                "min": "34", "pts": 27, "reb": 8, "ast": 5, "stl": 1, "blk": 0, "turnover": 3,
                "player": {"id": 77, "first_name": "Jay", "last_name": "Doe", "position": "F", "team_id": 1},
                "team": {"id": 1},
                "game": {"id": 501}
            }]
        })))
        .mount(&server)
        .await;

    let config = provider_config(&server, 0, 5);
    let lines = HttpSportsProvider::new(&config)
        .unwrap()
        .fetch_player_game_stats(&[501])
        .await
        .unwrap();

    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].player.last_name, "Doe");
    assert_eq!(lines[0].stats.points, 27);
    assert_eq!(lines[0].stats.turnovers, 3);
    assert_eq!(lines[0].stats.game_external_id, 501);
}

/// Test 4: Transient 503s are retried until the API answers
#[tokio::test]
async fn test_retries_server_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/teams"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/teams"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [team_json(1, "Hawks", "ATL")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = resilient(&provider_config(&server, 3, 5));
    let teams = provider.fetch_teams().await.unwrap();

    assert_eq!(teams.len(), 1);
    assert_eq!(provider.circuit_state(), CircuitState::Closed);
}

/// Test 5: Permanent errors are returned after a single request
#[tokio::test]
async fn test_not_found_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/teams"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let provider = resilient(&provider_config(&server, 3, 1));
    let result = provider.fetch_teams().await;

    assert!(matches!(result, Err(SyncError::NotFound)));
    assert_eq!(provider.circuit_state(), CircuitState::Closed);
}

/// Test 6: Once the circuit opens, calls fail without reaching the API
#[tokio::test]
async fn test_open_circuit_fails_fast() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/games"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let provider = resilient(&provider_config(&server, 0, 2));

    for _ in 0..2 {
        assert!(matches!(
            provider.fetch_games(&[day(15)]).await,
            Err(SyncError::ServerError(500))
        ));
    }
    assert_eq!(provider.circuit_state(), CircuitState::Open);

    let result = provider.fetch_games(&[day(15)]).await;
    assert!(matches!(result, Err(SyncError::CircuitOpen { .. })));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

/// Test 7: Asking for no dates never touches the network
#[tokio::test]
async fn test_empty_dates_skip_request() {
    let server = MockServer::start().await;
    let config = provider_config(&server, 0, 5);

    let games = resilient(&config).fetch_games(&[]).await.unwrap();

    assert!(games.is_empty());
    assert!(server.received_requests().await.unwrap().is_empty());
}
