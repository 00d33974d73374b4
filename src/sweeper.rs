//! Background expiry sweep.
//!
//! A dedicated tokio task ticks on a fixed cadence and asks the service to
//! evict expired transactions and rebuild statistics. It talks to the service
//! only through [`TransactionService::sweep`].

use std::{sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::service::TransactionService;

pub use crate::service::{SweepReport, SweepState};

pub struct Sweeper {
    service: Arc<TransactionService>,
    interval: Duration,
}

/// Handle to a running sweeper. Dropping it leaves the task running until
/// process exit; call [`SweeperHandle::stop`] for an orderly shutdown.
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Sweeper {
    pub fn new(service: Arc<TransactionService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    /// Start the periodic sweep on the current runtime.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        SweeperHandle { shutdown_tx, task }
    }

    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            window_secs = self.service.policy().window().num_seconds(),
            "🧹 Starting expiry sweeper"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.service.sweep() {
                        Some(report) => debug!(
                            evicted = report.evicted,
                            retained = report.retained,
                            "Sweep complete"
                        ),
                        None => warn!("Previous sweep still running, skipping tick"),
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Expiry sweeper stopped");
    }
}

impl SweeperHandle {
    /// Signal the sweeper to stop and wait for it to finish its current tick.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!("Sweeper task ended abnormally: {}", e);
        }
    }
}
