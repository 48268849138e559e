//! Health evaluation
//!
//! Folds cache and sync counters into a single status. Unhealthy wins over
//! degraded; every tripped threshold adds a reason.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::HealthConfig;
use crate::models::SyncMetrics;
use crate::plugins::cache::CacheStatistics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub reasons: Vec<String>,
    pub cache_hit_rate: f64,
    pub sync_success_rate: f64,
    pub cache: CacheStatistics,
    pub sync: SyncMetrics,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    /// Emit the report as one structured log event
    pub fn log(&self) {
        let reasons = self.reasons.join("; ");
        match self.status {
            HealthStatus::Healthy => info!(
                status = self.status.as_str(),
                cache_hit_rate = self.cache_hit_rate,
                sync_success_rate = self.sync_success_rate,
                cache_entries = self.cache.entries,
                total_syncs = self.sync.total_syncs,
                "Health check"
            ),
            _ => warn!(
                status = self.status.as_str(),
                reasons = %reasons,
                cache_hit_rate = self.cache_hit_rate,
                sync_success_rate = self.sync_success_rate,
                consecutive_failures = self.sync.consecutive_failures,
                "Health check"
            ),
        }
    }
}

pub fn evaluate(
    cache: &CacheStatistics,
    sync: &SyncMetrics,
    thresholds: &HealthConfig,
    now: DateTime<Utc>,
) -> HealthReport {
    let mut status = HealthStatus::Healthy;
    let mut reasons = Vec::new();

    let hit_rate = cache.hit_rate();
    if cache.total_requests > thresholds.min_requests_for_hit_rate
        && hit_rate < thresholds.min_hit_rate_percent
    {
        status = status.max(HealthStatus::Degraded);
        reasons.push(format!(
            "cache hit rate {hit_rate:.1}% below {:.1}%",
            thresholds.min_hit_rate_percent
        ));
    }

    if sync.consecutive_failures > thresholds.max_consecutive_failures {
        status = status.max(HealthStatus::Unhealthy);
        reasons.push(format!(
            "{} consecutive sync failures",
            sync.consecutive_failures
        ));
    }

    // Never succeeded: measure from when tracking started
    let since = sync.last_success_at.unwrap_or(sync.tracking_since);
    let stale_secs = (now - since).num_seconds();
    if stale_secs > 0 && stale_secs as u64 > thresholds.max_sync_staleness_secs {
        status = status.max(HealthStatus::Degraded);
        reasons.push(match sync.last_success_at {
            Some(_) => format!("no successful sync for {stale_secs}s"),
            None => format!("no successful sync since start ({stale_secs}s)"),
        });
    }

    HealthReport {
        status,
        reasons,
        cache_hit_rate: hit_rate,
        sync_success_rate: sync.success_rate(),
        cache: cache.clone(),
        sync: sync.clone(),
        checked_at: now,
    }
}
