//! Circuit breaker guarding provider calls
//!
//! Closed: calls pass; consecutive transient failures inside the failure
//! window are counted. Reaching the threshold opens the circuit.
//! Open: calls fail fast with `SyncError::CircuitOpen` until the open
//! duration has elapsed.
//! Half-open: exactly one trial call is admitted; concurrent callers still
//! fail fast. The trial's result closes or re-opens the circuit.

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::CircuitBreakerConfig;
use crate::error::{RetryableError, SyncError};

/// Externally visible breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum State {
    Closed,
    Open { until: Instant },
    /// A trial call is in flight
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: State,
    consecutive_failures: u32,
    window_start: Option<Instant>,
}

pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    failure_window: Duration,
    open_duration: Duration,
    inner: Mutex<Inner>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            failure_threshold: config.failure_threshold.max(1),
            failure_window: Duration::from_secs(config.failure_window_secs),
            open_duration: Duration::from_secs(config.open_duration_secs),
            inner: Mutex::new(Inner {
                state: State::Closed,
                consecutive_failures: 0,
                window_start: None,
            }),
        }
    }

    /// Run `operation` under breaker protection
    ///
    /// Only transient errors count as failures; a permanent error means the
    /// upstream answered, which counts as success for the breaker.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let trial = self.admit()?;
        let mut guard = TrialGuard {
            breaker: self,
            armed: trial,
        };

        let result = operation().await;
        guard.armed = false;

        match &result {
            Err(err) if err.is_retryable() => self.record_failure(),
            _ => self.record_success(),
        }
        result
    }

    pub fn state(&self) -> CircuitState {
        match self.lock().state {
            State::Closed => CircuitState::Closed,
            State::Open { .. } => CircuitState::Open,
            State::HalfOpen => CircuitState::HalfOpen,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Decide whether a call may proceed; `Ok(true)` marks the half-open trial
    fn admit(&self) -> Result<bool, SyncError> {
        let now = Instant::now();
        let mut inner = self.lock();

        match inner.state {
            State::Closed => Ok(false),
            State::Open { until } if now >= until => {
                inner.state = State::HalfOpen;
                info!(breaker = %self.name, "Circuit half-open, admitting trial call");
                Ok(true)
            }
            State::Open { until } => Err(SyncError::CircuitOpen {
                retry_after_secs: (until - now).as_secs_f64().ceil() as u64,
            }),
            State::HalfOpen => Err(SyncError::CircuitOpen {
                retry_after_secs: 1,
            }),
        }
    }

    fn record_success(&self) {
        let mut inner = self.lock();
        if matches!(inner.state, State::HalfOpen) {
            info!(breaker = %self.name, "Circuit closed after successful trial");
        }
        inner.state = State::Closed;
        inner.consecutive_failures = 0;
        inner.window_start = None;
    }

    fn record_failure(&self) {
        let now = Instant::now();
        let mut inner = self.lock();

        match inner.state {
            State::HalfOpen => {
                inner.state = State::Open {
                    until: now + self.open_duration,
                };
                warn!(
                    breaker = %self.name,
                    open_secs = self.open_duration.as_secs(),
                    "Circuit re-opened after failed trial"
                );
            }
            State::Closed => {
                let window_expired = inner
                    .window_start
                    .map(|start| now.duration_since(start) > self.failure_window)
                    .unwrap_or(true);
                if window_expired {
                    inner.window_start = Some(now);
                    inner.consecutive_failures = 1;
                } else {
                    inner.consecutive_failures += 1;
                }

                if inner.consecutive_failures >= self.failure_threshold {
                    inner.state = State::Open {
                        until: now + self.open_duration,
                    };
                    warn!(
                        breaker = %self.name,
                        failures = inner.consecutive_failures,
                        open_secs = self.open_duration.as_secs(),
                        "Circuit opened"
                    );
                }
            }
            State::Open { .. } => {}
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(breaker = %self.name, "Circuit breaker lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

/// Re-opens the circuit if a trial call is dropped before completing
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.record_failure();
        }
    }
}
