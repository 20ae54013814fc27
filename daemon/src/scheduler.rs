//! Periodic rate updates on a background task.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use ratekeeper_fx::RatesUpdater;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// How often `stop` checks whether the loop has exited.
const STOP_POLL: Duration = Duration::from_millis(10);

#[derive(Debug)]
struct Worker {
    handle: JoinHandle<()>,
    shutdown_tx: mpsc::Sender<()>,
}

/// Runs [`RatesUpdater::run_update`] immediately on start and then once per
/// interval until stopped.
///
/// Stopping interrupts only the wait between runs. An update already in
/// flight is allowed to finish.
#[derive(Debug)]
pub struct RatesScheduler {
    updater: Arc<RatesUpdater>,
    interval: Duration,
    stop_grace: Duration,
    worker: Mutex<Option<Worker>>,
}

impl RatesScheduler {
    pub fn new(updater: Arc<RatesUpdater>, interval: Duration, stop_grace: Duration) -> Self {
        Self {
            updater,
            interval,
            stop_grace,
            worker: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawn the update loop. Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            warn!("Scheduler already running");
            return;
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let handle = tokio::spawn(run_loop(self.updater.clone(), self.interval, shutdown_rx));
        *worker = Some(Worker {
            handle,
            shutdown_tx,
        });

        info!(interval_secs = self.interval.as_secs(), "Scheduler started");
    }

    /// Signal the loop to exit and wait for it, at most `stop_grace`.
    ///
    /// A loop still finishing an update after the grace period keeps its slot,
    /// so `start` will not spawn a second one until it has exited.
    pub async fn stop(&self) {
        let signalled = self
            .worker
            .lock()
            .as_ref()
            // Capacity 1: a second pending signal is redundant.
            .map(|w| w.shutdown_tx.try_send(()));
        if signalled.is_none() {
            info!("Scheduler not running");
            return;
        }

        let exited = tokio::time::timeout(self.stop_grace, async {
            while self.is_running() {
                tokio::time::sleep(STOP_POLL).await;
            }
        })
        .await
        .is_ok();

        if !exited {
            warn!(
                grace_secs = self.stop_grace.as_secs(),
                "Scheduler still finishing an update"
            );
            return;
        }

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            match worker.handle.await {
                Ok(()) => info!("Scheduler stopped"),
                Err(e) => error!(error = %e, "Scheduler task ended abnormally"),
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }
}

async fn run_loop(updater: Arc<RatesUpdater>, interval: Duration, mut shutdown_rx: mpsc::Receiver<()>) {
    loop {
        match updater.run_update(None).await {
            Ok(report) if report.success => {}
            Ok(report) => warn!(errors = ?report.errors, "Scheduled update fetched no rates"),
            Err(e) => error!(error = %e, "Scheduled update failed"),
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            // A dropped sender also ends the loop.
            _ = shutdown_rx.recv() => break,
        }
    }
}
