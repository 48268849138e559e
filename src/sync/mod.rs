//! Data synchronization
//!
//! # Components
//!
//! - [`retry`]: exponential backoff for transient upstream failures
//! - [`circuit_breaker`]: fail-fast guard around the upstream provider
//! - [`http_client`]: rate-limited HTTP client
//! - [`orchestrator`]: runs the sync units of a tick
//! - [`scheduler`]: adaptive loop that decides when the next tick runs
//! - [`metrics`]: sync counters used for health reporting

pub mod circuit_breaker;
pub mod http_client;
pub mod metrics;
pub mod orchestrator;
pub mod retry;
pub mod scheduler;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use http_client::HttpClientWithRateLimit;
pub use metrics::SyncMetricsRecorder;
pub use orchestrator::{Orchestrator, TickContext, TickRunner, TickState};
pub use retry::RetryManager;
pub use scheduler::{
    next_interval, AdaptiveScheduler, ManualSyncHandle, SchedulerStatus, TickOutcome,
};
