//! Background pruning of expired burst windows.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use super::burst::BurstGuard;

/// Periodically sweeps a [`BurstGuard`].
pub struct BurstSweeper;

impl BurstSweeper {
    /// Start sweeping `guard` every `every`.
    ///
    /// The task runs until [`SweeperHandle::shutdown`] is called or the
    /// handle is dropped.
    pub fn spawn(guard: Arc<BurstGuard>, every: Duration) -> SweeperHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = guard.sweep();
                        debug!(removed = removed, "Burst sweep complete");
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            debug!("Burst sweeper stopped");
        });

        info!(interval_secs = every.as_secs(), "Burst sweeper started");

        SweeperHandle { stop_tx, task }
    }
}

/// Owner of a running sweeper task.
pub struct SweeperHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to finish.
    pub async fn shutdown(self) -> Result<(), tokio::task::JoinError> {
        // The receiver is gone only if the task already ended
        let _ = self.stop_tx.send(true);
        self.task.await
    }

    /// Whether the task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
