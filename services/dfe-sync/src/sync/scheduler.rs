//! Periodic driver of [`SyncOrchestrator::run_tick`].

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use super::orchestrator::{SyncOrchestrator, TickReport};
use crate::error::SyncError;

/// Default time between ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(60);

/// Scheduler lifecycle errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// `start` was called twice
    #[error("Scheduler is already running")]
    AlreadyRunning,

    /// `stop` was called without a running loop
    #[error("Scheduler is not running")]
    NotRunning,

    /// The in-flight tick did not finish in time and was aborted
    #[error("Scheduler did not stop within {0:?}")]
    ShutdownTimeout(Duration),

    /// The loop task panicked
    #[error("Scheduler task failed: {0}")]
    TaskFailed(String),
}

struct Running {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owns the tick loop. Ticks never overlap, including with [`Scheduler::tick_once`].
pub struct Scheduler {
    orchestrator: Arc<SyncOrchestrator>,
    interval: Duration,
    tick_guard: Arc<Mutex<()>>,
    running: Mutex<Option<Running>>,
}

impl Scheduler {
    /// Create a stopped scheduler ticking every `interval`.
    #[must_use]
    pub fn new(orchestrator: Arc<SyncOrchestrator>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
            tick_guard: Arc::new(Mutex::new(())),
            running: Mutex::new(None),
        }
    }

    /// Spawn the tick loop. The first tick runs immediately.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::AlreadyRunning`] if the loop is active.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return Err(SchedulerError::AlreadyRunning);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.orchestrator),
            self.interval,
            Arc::clone(&self.tick_guard),
            shutdown_rx,
        ));
        *running = Some(Running { shutdown_tx, handle });

        info!(interval_secs = self.interval.as_secs(), "Sync scheduler started");
        Ok(())
    }

    /// Signal the loop to stop and wait for the in-flight tick to finish.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::NotRunning`] if the loop was never started
    /// - [`SchedulerError::ShutdownTimeout`] if it had to be aborted
    pub async fn stop(&self, timeout: Duration) -> Result<(), SchedulerError> {
        let Some(Running { shutdown_tx, mut handle }) = self.running.lock().await.take() else {
            return Err(SchedulerError::NotRunning);
        };

        let _ = shutdown_tx.send(true);
        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(())) => {
                info!("Sync scheduler stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(SchedulerError::TaskFailed(e.to_string())),
            Err(_) => {
                warn!(
                    timeout_secs = timeout.as_secs(),
                    "Sync scheduler stop timed out, aborting tick"
                );
                handle.abort();
                Err(SchedulerError::ShutdownTimeout(timeout))
            }
        }
    }

    /// Whether the loop is active.
    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Run one tick now, waiting for any in-flight tick first.
    ///
    /// # Errors
    ///
    /// Propagates [`SyncOrchestrator::run_tick`] errors.
    pub async fn tick_once(&self) -> Result<TickReport, SyncError> {
        let _guard = self.tick_guard.lock().await;
        self.orchestrator.run_tick().await
    }
}

async fn run_loop(
    orchestrator: Arc<SyncOrchestrator>,
    interval: Duration,
    tick_guard: Arc<Mutex<()>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        let _guard = tick_guard.lock().await;
        if let Err(e) = orchestrator.run_tick().await {
            error!(error = %e, code = %e.code(), "Sync tick failed");
        }
    }
}
