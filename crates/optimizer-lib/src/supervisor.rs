//! Periodic task supervision
//!
//! Every control loop is a `PeriodicJob` driven by its own ticker. A tick
//! that fires while the previous iteration is still running is skipped.
//! Stopping the supervisor signals all loops at once and waits for each
//! current iteration to finish.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// One iteration of a periodic control loop
#[async_trait]
pub trait PeriodicJob: Send + Sync + 'static {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Run a single iteration. Errors are handled inside the job.
    async fn run_once(&self);

    /// Called once after the loop has stopped
    async fn on_shutdown(&self) {}
}

/// Drive a job until shutdown is signalled
pub async fn drive(
    job: Arc<dyn PeriodicJob>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    info!(
        job = job.name(),
        interval_secs = period.as_secs(),
        "Starting periodic job"
    );

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut iterations = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                job.run_once().await;
                iterations += 1;
                debug!(job = job.name(), iterations, "Periodic job iteration complete");
            }
            _ = shutdown.recv() => {
                info!(job = job.name(), iterations, "Shutting down periodic job");
                break;
            }
        }
    }

    job.on_shutdown().await;
}

/// Owns the spawned control loops
pub struct Supervisor {
    shutdown_tx: broadcast::Sender<()>,
    handles: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn a job on its own ticker
    pub async fn spawn(&self, job: Arc<dyn PeriodicJob>, period: Duration) {
        let name = job.name();
        let shutdown = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(drive(job, period, shutdown));
        self.handles.lock().await.push((name, handle));
    }

    /// Number of jobs still owned by the supervisor
    pub async fn running(&self) -> usize {
        self.handles.lock().await.len()
    }

    /// Signal every job to stop and wait for them to finish
    pub async fn stop(&self) {
        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
        if handles.is_empty() {
            return;
        }

        let _ = self.shutdown_tx.send(());

        for (name, handle) in handles {
            if let Err(e) = handle.await {
                warn!(job = name, error = %e, "Periodic job terminated abnormally");
            }
        }
        info!("All periodic jobs stopped");
    }
}
