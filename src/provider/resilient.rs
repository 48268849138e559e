//! Resilience decorator for providers
//!
//! Each attempt runs under a per-call timeout inside the circuit breaker;
//! the retry manager wraps the whole thing. An open circuit is not
//! retryable, so a tripped breaker stops the retry loop immediately.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use super::SportsProvider;
use crate::config::ProviderConfig;
use crate::error::SyncError;
use crate::models::{Game, StatLine, Team};
use crate::sync::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::sync::retry::RetryManager;

pub struct ResilientProvider<P> {
    inner: P,
    retry: RetryManager,
    breaker: CircuitBreaker,
    call_timeout: Duration,
}

impl<P: SportsProvider> ResilientProvider<P> {
    pub fn new(inner: P, config: &ProviderConfig) -> Self {
        let breaker = CircuitBreaker::new(inner.name().to_string(), &config.circuit_breaker);
        Self {
            inner,
            retry: RetryManager::new(config.retry.clone()),
            breaker,
            call_timeout: Duration::from_secs(config.call_timeout_secs),
        }
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    async fn call<T, F, Fut>(&self, operation: &str, op: F) -> Result<T, SyncError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        debug!(provider = %self.inner.name(), operation, "Calling provider");
        let op = &op;
        let timeout = self.call_timeout;

        self.retry
            .execute(|| async move {
                self.breaker
                    .execute(|| async move {
                        match tokio::time::timeout(timeout, op()).await {
                            Ok(result) => result,
                            Err(_) => Err(SyncError::NetworkTimeout),
                        }
                    })
                    .await
            })
            .await
    }
}

#[async_trait]
impl<P: SportsProvider> SportsProvider for ResilientProvider<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn fetch_teams(&self) -> Result<Vec<Team>, SyncError> {
        self.call("fetch_teams", || self.inner.fetch_teams()).await
    }

    async fn fetch_games(&self, dates: &[NaiveDate]) -> Result<Vec<Game>, SyncError> {
        self.call("fetch_games", || self.inner.fetch_games(dates))
            .await
    }

    async fn fetch_player_game_stats(&self, game_ids: &[i64]) -> Result<Vec<StatLine>, SyncError> {
        self.call("fetch_player_game_stats", || {
            self.inner.fetch_player_game_stats(game_ids)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CircuitBreakerConfig, RetryConfig};
    use crate::provider::MockSportsProvider;

    fn config(max_retries: u32, threshold: u32) -> ProviderConfig {
        ProviderConfig {
            call_timeout_secs: 5,
            retry: RetryConfig {
                max_retries,
                initial_backoff_ms: 10,
                max_backoff_ms: 10,
                backoff_multiplier: 2.0,
                jitter: false,
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: threshold,
                failure_window_secs: 60,
                open_duration_secs: 30,
            },
            ..ProviderConfig::default()
        }
    }

    fn mock() -> MockSportsProvider {
        let mut mock = MockSportsProvider::new();
        mock.expect_name().return_const("mock".to_string());
        mock
    }

    // Test 1: Transient failures are retried transparently
    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_failures() {
        let mut inner = mock();
        let mut seq = mockall::Sequence::new();
        inner
            .expect_fetch_teams()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|| Err(SyncError::ServerError(502)));
        inner
            .expect_fetch_teams()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(vec![Team::new(1, "Hawks", "ATL")]));

        let provider = ResilientProvider::new(inner, &config(3, 10));
        let teams = provider.fetch_teams().await.unwrap();
        assert_eq!(teams.len(), 1);
        assert_eq!(provider.circuit_state(), CircuitState::Closed);
    }

    // Test 2: Permanent errors are not retried
    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_not_retried() {
        let mut inner = mock();
        inner
            .expect_fetch_games()
            .times(1)
            .returning(|_| Err(SyncError::Unauthorized));

        let provider = ResilientProvider::new(inner, &config(3, 10));
        let result = provider
            .fetch_games(&[NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()])
            .await;
        assert_eq!(result.unwrap_err(), SyncError::Unauthorized);
    }

    // Test 3: Breaker opens during retries and later calls fail fast
    #[tokio::test(start_paused = true)]
    async fn test_breaker_short_circuits() {
        let mut inner = mock();
        inner
            .expect_fetch_teams()
            .times(2)
            .returning(|| Err(SyncError::NetworkTimeout));

        let provider = ResilientProvider::new(inner, &config(5, 2));

        let first = provider.fetch_teams().await;
        assert!(matches!(first, Err(SyncError::CircuitOpen { .. })));
        assert_eq!(provider.circuit_state(), CircuitState::Open);

        let second = provider.fetch_teams().await;
        assert!(matches!(second, Err(SyncError::CircuitOpen { .. })));
    }

    // Test 4: Slow calls time out as a transient error
    #[tokio::test(start_paused = true)]
    async fn test_call_timeout() {
        struct Slow;

        #[async_trait]
        impl SportsProvider for Slow {
            fn name(&self) -> &str {
                "slow"
            }
            async fn fetch_teams(&self) -> Result<Vec<Team>, SyncError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(vec![])
            }
            async fn fetch_games(&self, _: &[NaiveDate]) -> Result<Vec<Game>, SyncError> {
                Ok(vec![])
            }
            async fn fetch_player_game_stats(&self, _: &[i64]) -> Result<Vec<StatLine>, SyncError> {
                Ok(vec![])
            }
        }

        let provider = ResilientProvider::new(Slow, &config(0, 10));
        assert_eq!(
            provider.fetch_teams().await.unwrap_err(),
            SyncError::NetworkTimeout
        );
    }
}
