//! Sync counters
//!
//! Lock-free recorder shared as `Arc` between the orchestrator (writer) and
//! health reporting (reader).

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, TimeZone, Utc};

use crate::models::{SyncMetrics, UnitOutcome};

/// Sentinel for "never" in the timestamp slots
const NEVER: i64 = i64::MIN;

pub struct SyncMetricsRecorder {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    consecutive_failures: AtomicU64,
    last_success_ms: AtomicI64,
    last_attempt_ms: AtomicI64,
    tracking_since: DateTime<Utc>,
}

impl Default for SyncMetricsRecorder {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl SyncMetricsRecorder {
    pub fn new(tracking_since: DateTime<Utc>) -> Self {
        Self {
            total: AtomicU64::new(0),
            successful: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            consecutive_failures: AtomicU64::new(0),
            last_success_ms: AtomicI64::new(NEVER),
            last_attempt_ms: AtomicI64::new(NEVER),
            tracking_since,
        }
    }

    /// Count an executed unit; skipped units are not attempts
    pub fn record(&self, outcome: &UnitOutcome, at: DateTime<Utc>) {
        let at_ms = at.timestamp_millis();
        match outcome {
            UnitOutcome::Skipped { .. } => return,
            UnitOutcome::Succeeded { .. } => {
                self.successful.fetch_add(1, Ordering::Relaxed);
                self.consecutive_failures.store(0, Ordering::Relaxed);
                self.last_success_ms.fetch_max(at_ms, Ordering::Relaxed);
            }
            UnitOutcome::Failed { .. } => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.total.fetch_add(1, Ordering::Relaxed);
        self.last_attempt_ms.fetch_max(at_ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SyncMetrics {
        SyncMetrics {
            total_syncs: self.total.load(Ordering::Relaxed),
            successful_syncs: self.successful.load(Ordering::Relaxed),
            failed_syncs: self.failed.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            last_success_at: from_ms(self.last_success_ms.load(Ordering::Relaxed)),
            last_attempt_at: from_ms(self.last_attempt_ms.load(Ordering::Relaxed)),
            tracking_since: self.tracking_since,
        }
    }
}

fn from_ms(ms: i64) -> Option<DateTime<Utc>> {
    if ms == NEVER {
        None
    } else {
        Utc.timestamp_millis_opt(ms).single()
    }
}
