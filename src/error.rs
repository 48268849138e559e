//! Application error types for league-sync
//!
//! Each concern gets its own `thiserror` enum. Provider errors carry enough
//! information for the retry manager and circuit breaker to classify them.

use std::time::Duration;

use thiserror::Error;

/// Provider (upstream) errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SyncError {
    /// Network timeout
    #[error("Network timeout")]
    NetworkTimeout,

    /// Connection refused
    #[error("Connection refused")]
    ConnectionRefused,

    /// Rate limited by upstream
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Server error
    #[error("Server error: HTTP {0}")]
    ServerError(u16),

    /// Invalid data received
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Resource not found
    #[error("Resource not found")]
    NotFound,

    /// Unauthorized
    #[error("Unauthorized")]
    Unauthorized,

    /// Generic network error
    #[error("Network error: {0}")]
    Network(String),

    /// Circuit breaker is open; the provider was not called
    #[error("Circuit open, retry after {retry_after_secs} seconds")]
    CircuitOpen { retry_after_secs: u64 },
}

/// Cache backend errors
///
/// These never escape the cache layer; they degrade to misses.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Backend command failed
    #[error("Cache backend error: {0}")]
    Backend(String),

    /// Backend could not be reached in time
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() || err.is_connection_refusal() {
            CacheError::Unavailable(err.to_string())
        } else {
            CacheError::Backend(err.to_string())
        }
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DbError {
    /// Connection / worker thread error
    #[error("Database connection error: {0}")]
    Connection(String),

    /// SQLite error
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A referenced entity has not been stored locally yet
    #[error("Missing reference: {0}")]
    MissingReference(String),
}

impl From<tokio_rusqlite::Error> for DbError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        match err {
            tokio_rusqlite::Error::Rusqlite(e) => DbError::Sqlite(e),
            tokio_rusqlite::Error::Other(e) => match e.downcast::<DbError>() {
                Ok(db) => *db,
                Err(other) => DbError::Connection(other.to_string()),
            },
            other => DbError::Connection(other.to_string()),
        }
    }
}

/// Lock backend errors
#[derive(Debug, Error)]
pub enum LockError {
    /// Backend unreachable or a command failed
    #[error("Lock backend unavailable: {0}")]
    Unavailable(String),
}

impl From<redis::RedisError> for LockError {
    fn from(err: redis::RedisError) -> Self {
        LockError::Unavailable(err.to_string())
    }
}

impl From<DbError> for LockError {
    fn from(err: DbError) -> Self {
        LockError::Unavailable(err.to_string())
    }
}

/// Failure of a single sync unit
#[derive(Debug, Error)]
pub enum UnitError {
    /// Fetching from the provider failed
    #[error("Provider error: {0}")]
    Provider(#[from] SyncError),

    /// Persisting reconciled entities failed
    #[error("Persistence error: {0}")]
    Persistence(#[from] DbError),

    /// The unit exceeded its time budget
    #[error("Unit timed out after {0} seconds")]
    Timeout(u64),

    /// No unit is known by this name
    #[error("Unknown sync unit: {0}")]
    UnknownUnit(String),
}

/// Errors returned to callers of the manual sync handle
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The scheduler loop is not running
    #[error("Scheduler not running")]
    NotRunning,

    /// The requested unit could not be run
    #[error(transparent)]
    Unit(#[from] UnitError),

    /// The run panicked or exceeded its time budget
    #[error("Sync run aborted: {0}")]
    Aborted(String),
}

/// OpenTelemetry-related errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OtelError {
    /// Failed to initialize tracer
    #[error("Failed to initialize tracer: {0}")]
    TracerInit(String),

    /// Failed to shutdown
    #[error("Failed to shutdown: {0}")]
    Shutdown(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Trait for determining if an error is retryable
pub trait RetryableError {
    /// Returns true if the error is retryable
    fn is_retryable(&self) -> bool;

    /// Minimum delay the upstream asked for, if any
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl RetryableError for SyncError {
    fn is_retryable(&self) -> bool {
        match self {
            SyncError::NetworkTimeout => true,
            SyncError::ConnectionRefused => true,
            SyncError::RateLimited(_) => true,
            SyncError::ServerError(code) if *code >= 500 => true,
            SyncError::Network(_) => true,

            SyncError::InvalidData(_) => false,
            SyncError::NotFound => false,
            SyncError::Unauthorized => false,
            SyncError::ServerError(_) => false, // 4xx
            SyncError::CircuitOpen { .. } => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            SyncError::RateLimited(secs) => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}
