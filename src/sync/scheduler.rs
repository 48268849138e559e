//! Adaptive tick scheduler
//!
//! Drives a `TickRunner` in a single loop. The sleep after each tick depends
//! on what the tick saw: short while games are live, long in the off-season,
//! and a cooldown after a tick that failed as a whole. A tick is bounded by a
//! timeout and a panic inside it is contained, so the loop always goes on.
//! Shutdown interrupts both an in-flight tick and the sleep.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, error, info, warn};

use super::orchestrator::{TickRunner, TickState};
use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::models::{SyncUnit, TickReport, UnitReport};

/// How a tick ended
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Completed(TickReport),
    TimedOut,
    Panicked(String),
}

impl TickOutcome {
    /// The tick as a whole went wrong
    pub fn is_failure(&self) -> bool {
        match self {
            TickOutcome::Completed(report) => report.all_failed(),
            TickOutcome::TimedOut | TickOutcome::Panicked(_) => true,
        }
    }
}

/// Snapshot published after every tick
#[derive(Debug, Clone, Default)]
pub struct SchedulerStatus {
    pub ticks: u64,
    pub units: Vec<SyncUnit>,
    pub live_games: Option<u64>,
    pub upcoming_games: Option<u64>,
    pub last_report: Option<TickReport>,
    pub next_interval: Option<Duration>,
}

/// Pick the sleep before the next tick
pub fn next_interval(config: &SchedulerConfig, outcome: &TickOutcome, state: &TickState) -> Duration {
    if outcome.is_failure() {
        return Duration::from_secs(config.error_cooldown_secs);
    }
    if state.live_games.unwrap_or(0) > 0 {
        return Duration::from_secs(config.live_interval_secs);
    }
    match (state.upcoming_games, config.off_season_interval_secs) {
        (Some(0), Some(off_season)) => Duration::from_secs(off_season),
        _ => Duration::from_secs(config.baseline_interval_secs),
    }
}

enum ManualRequest {
    Tick {
        response: mpsc::Sender<Result<TickReport, SchedulerError>>,
    },
    Unit {
        name: String,
        response: mpsc::Sender<Result<UnitReport, SchedulerError>>,
    },
}

pub struct AdaptiveScheduler {
    config: SchedulerConfig,
    runner: Arc<dyn TickRunner>,
    state: TickState,
    status: Arc<RwLock<SchedulerStatus>>,
    shutdown_rx: broadcast::Receiver<()>,
    manual_rx: mpsc::Receiver<ManualRequest>,
    manual_tx: mpsc::Sender<ManualRequest>,
}

impl AdaptiveScheduler {
    pub fn new(
        config: SchedulerConfig,
        runner: Arc<dyn TickRunner>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        let (manual_tx, manual_rx) = mpsc::channel(8);
        Self {
            config,
            runner,
            state: TickState::new(),
            status: Arc::new(RwLock::new(SchedulerStatus::default())),
            shutdown_rx,
            manual_rx,
            manual_tx,
        }
    }

    /// Get a handle for triggering runs outside the schedule
    pub fn manual_sync_handle(&self) -> ManualSyncHandle {
        ManualSyncHandle {
            tx: self.manual_tx.clone(),
        }
    }

    /// Shared view of the published status
    pub fn status_handle(&self) -> Arc<RwLock<SchedulerStatus>> {
        self.status.clone()
    }

    pub async fn get_status(&self) -> SchedulerStatus {
        self.status.read().await.clone()
    }

    fn tick_budget(&self) -> Duration {
        Duration::from_secs(self.config.tick_timeout_secs)
    }

    /// Run until the shutdown signal
    pub async fn run(mut self) {
        info!(
            live_interval_secs = self.config.live_interval_secs,
            baseline_interval_secs = self.config.baseline_interval_secs,
            "Starting adaptive scheduler"
        );

        if self.config.initial_delay_secs > 0 {
            debug!(
                delay_secs = self.config.initial_delay_secs,
                "Waiting for initial delay"
            );
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping scheduler");
                    return;
                }
                _ = tokio::time::sleep(Duration::from_secs(self.config.initial_delay_secs)) => {}
            }
        }

        'ticks: loop {
            let budget = self.tick_budget();
            let outcome = tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown signal received during tick, stopping scheduler");
                    break 'ticks;
                }
                outcome = guarded_tick(self.runner.as_ref(), &mut self.state, budget) => outcome,
            };

            let interval = next_interval(&self.config, &outcome, &self.state);
            log_outcome(&outcome, interval, budget);
            self.publish(Some(outcome), Some(interval)).await;

            let sleep = tokio::time::sleep(interval);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    _ = self.shutdown_rx.recv() => {
                        info!("Shutdown signal received, stopping scheduler");
                        break 'ticks;
                    }
                    _ = &mut sleep => break,
                    Some(request) = self.manual_rx.recv() => {
                        self.handle_manual(request).await;
                    }
                }
            }
        }

        info!("Scheduler stopped");
    }

    async fn publish(&self, outcome: Option<TickOutcome>, interval: Option<Duration>) {
        let mut status = self.status.write().await;
        status.units = self.state.units().to_vec();
        status.live_games = self.state.live_games;
        status.upcoming_games = self.state.upcoming_games;
        if let Some(outcome) = outcome {
            status.ticks += 1;
            if let TickOutcome::Completed(report) = outcome {
                status.last_report = Some(report);
            }
        }
        if interval.is_some() {
            status.next_interval = interval;
        }
    }

    async fn handle_manual(&mut self, request: ManualRequest) {
        let budget = self.tick_budget();
        match request {
            ManualRequest::Tick { response } => {
                info!("Manual tick triggered");
                let outcome = guarded_tick(self.runner.as_ref(), &mut self.state, budget).await;
                let result = match &outcome {
                    TickOutcome::Completed(report) => Ok(report.clone()),
                    TickOutcome::TimedOut => Err(SchedulerError::Aborted("tick timed out".to_string())),
                    TickOutcome::Panicked(message) => Err(SchedulerError::Aborted(message.clone())),
                };
                self.publish(Some(outcome), None).await;
                let _ = response.send(result).await;
            }
            ManualRequest::Unit { name, response } => {
                info!(unit = %name, "Manual unit run triggered");
                let work = AssertUnwindSafe(self.runner.run_named(&name, &mut self.state)).catch_unwind();
                let result = match tokio::time::timeout(budget, work).await {
                    Ok(Ok(result)) => result.map_err(SchedulerError::from),
                    Ok(Err(payload)) => Err(SchedulerError::Aborted(panic_message(&*payload))),
                    Err(_) => Err(SchedulerError::Aborted(format!("unit {name} timed out"))),
                };
                if let Err(err) = &result {
                    warn!(unit = %name, error = %err, "Manual unit run failed");
                }
                self.publish(None, None).await;
                let _ = response.send(result).await;
            }
        }
    }
}

async fn guarded_tick(runner: &dyn TickRunner, state: &mut TickState, budget: Duration) -> TickOutcome {
    let work = AssertUnwindSafe(runner.run_tick(state)).catch_unwind();
    match tokio::time::timeout(budget, work).await {
        Ok(Ok(report)) => TickOutcome::Completed(report),
        Ok(Err(payload)) => TickOutcome::Panicked(panic_message(&*payload)),
        Err(_) => TickOutcome::TimedOut,
    }
}

fn log_outcome(outcome: &TickOutcome, interval: Duration, budget: Duration) {
    match outcome {
        TickOutcome::Completed(report) if report.all_failed() => {
            warn!(
                failed = report.failed(),
                next_tick_secs = interval.as_secs(),
                "Every unit in the tick failed, cooling down"
            );
        }
        TickOutcome::Completed(report) => {
            info!(
                succeeded = report.succeeded(),
                failed = report.failed(),
                skipped = report.skipped(),
                live_games = report.live_games,
                next_tick_secs = interval.as_secs(),
                "Tick complete"
            );
        }
        TickOutcome::TimedOut => {
            error!(
                timeout_secs = budget.as_secs(),
                next_tick_secs = interval.as_secs(),
                "Tick timed out"
            );
        }
        TickOutcome::Panicked(message) => {
            error!(
                panic = %message,
                next_tick_secs = interval.as_secs(),
                "Tick panicked"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Handle for triggering runs outside the schedule
#[derive(Clone)]
pub struct ManualSyncHandle {
    tx: mpsc::Sender<ManualRequest>,
}

impl ManualSyncHandle {
    /// Run a full tick now
    pub async fn trigger_tick(&self) -> Result<TickReport, SchedulerError> {
        let (response_tx, mut response_rx) = mpsc::channel(1);
        self.tx
            .send(ManualRequest::Tick {
                response: response_tx,
            })
            .await
            .map_err(|_| SchedulerError::NotRunning)?;

        response_rx.recv().await.ok_or(SchedulerError::NotRunning)?
    }

    /// Run one unit by name now
    pub async fn trigger_unit(&self, name: &str) -> Result<UnitReport, SchedulerError> {
        let (response_tx, mut response_rx) = mpsc::channel(1);
        self.tx
            .send(ManualRequest::Unit {
                name: name.to_string(),
                response: response_tx,
            })
            .await
            .map_err(|_| SchedulerError::NotRunning)?;

        response_rx.recv().await.ok_or(SchedulerError::NotRunning)?
    }
}
