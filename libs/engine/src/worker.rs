//! Periodic background worker.
//!
//! One spawned task per configured pool, driving a reconciliation pass
//! on every interval tick. The pass future is awaited inside the select
//! branch, so a shutdown signal never cancels a pass midway; it takes
//! effect on the next loop iteration.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use crate::manager::PoolManager;

/// Handle used to stop a spawned worker.
pub(crate) struct WorkerHandle {
    shutdown: watch::Sender<bool>,
}

impl WorkerHandle {
    /// Signals the worker to stop after any in-flight pass.
    pub(crate) fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Spawns the periodic worker for `manager`.
pub(crate) fn spawn(manager: PoolManager, period: Duration) -> WorkerHandle {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        info!(
            period_secs = period.as_secs(),
            "starting pool update worker"
        );

        let mut interval = tokio::time::interval(period);
        // Don't immediately tick on startup - wait for first interval
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = manager.run_tick().await {
                        error!(error = %e, "reconciliation pass failed");
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("pool update worker shutting down");
                        break;
                    }
                }
            }
        }
    });

    WorkerHandle {
        shutdown: shutdown_tx,
    }
}
