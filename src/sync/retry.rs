//! Retry manager for handling transient provider failures
//!
//! Exponential backoff with a cap, optional jitter and support for upstream
//! rate-limit hints.

use crate::config::RetryConfig;
use crate::error::RetryableError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry manager with exponential backoff support
#[derive(Debug, Clone)]
pub struct RetryManager {
    config: RetryConfig,
}

impl RetryManager {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Execute an async operation with retry logic
    ///
    /// The operation is retried up to `max_retries` times while it returns a
    /// retryable error. A `retry_after` hint from the error raises the wait,
    /// but never beyond `max_backoff_ms`.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryableError + std::fmt::Display,
    {
        let mut attempt = 0u32;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    if attempt >= self.config.max_retries {
                        warn!(
                            attempts = attempt + 1,
                            max_retries = self.config.max_retries,
                            error = %err,
                            "Max retries exhausted"
                        );
                        return Err(err);
                    }

                    let backoff = self.delay_for(attempt, err.retry_after());
                    debug!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Retrying after transient error"
                    );

                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Calculate backoff duration for a given attempt number
    ///
    /// Uses exponential backoff: initial_backoff * multiplier^attempt,
    /// capped at max_backoff_ms with optional 50-100% jitter
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let base = self.config.initial_backoff_ms as f64
            * self.config.backoff_multiplier.powi(attempt as i32);
        let capped = base.min(self.config.max_backoff_ms as f64);

        let delay = if self.config.jitter {
            let jitter = rand::thread_rng().gen_range(0.5..1.0);
            capped * jitter
        } else {
            capped
        };

        Duration::from_micros((delay * 1000.0).round() as u64)
    }

    fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let backoff = self.calculate_backoff(attempt);
        let cap = Duration::from_millis(self.config.max_backoff_ms);
        match hint {
            Some(hint) => backoff.max(hint).min(cap),
            None => backoff,
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}
