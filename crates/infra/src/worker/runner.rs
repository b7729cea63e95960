//! Polling loop around [`WorkerService::run_worker`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::service::{WorkerOptions, WorkerRunReport, WorkerService};

/// Handle to stop and join a background worker loop.
#[derive(Debug)]
pub struct WorkerLoopHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<WorkerRunReport>,
}

impl WorkerLoopHandle {
    /// Request graceful shutdown and wait for the current run to finish.
    ///
    /// Returns the totals over all runs of the loop.
    pub async fn shutdown(self) -> WorkerRunReport {
        let _ = self.shutdown.send(true);
        match self.join.await {
            Ok(report) => report,
            Err(err) => {
                warn!(error = %err, "worker loop task failed");
                WorkerRunReport::default()
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Runs a queue repeatedly until shut down.
#[derive(Debug)]
pub struct WorkerLoop;

impl WorkerLoop {
    /// Spawn on the current tokio runtime.
    ///
    /// Runs are separated by `poll_interval`; shutdown interrupts the pause.
    pub fn spawn(
        service: Arc<WorkerService>,
        options: WorkerOptions,
        poll_interval: Duration,
    ) -> WorkerLoopHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(worker_loop(service, options, poll_interval, shutdown_rx));

        WorkerLoopHandle {
            shutdown: shutdown_tx,
            join,
        }
    }
}

async fn worker_loop(
    service: Arc<WorkerService>,
    options: WorkerOptions,
    poll_interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> WorkerRunReport {
    let mut totals = WorkerRunReport::default();
    info!(queue = %options.queue_name, "worker loop started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        match service.run_worker(&options).await {
            Ok(report) => {
                totals.processed += report.processed;
                totals.succeeded += report.succeeded;
                totals.retried += report.retried;
                totals.dead_lettered += report.dead_lettered;
                totals.errored += report.errored;
            }
            Err(err) => {
                warn!(queue = %options.queue_name, error = %err, "worker run failed");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            changed = shutdown_rx.changed() => {
                // sender dropped counts as shutdown
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    info!(queue = %options.queue_name, processed = totals.processed, "worker loop stopped");
    totals
}
