use crate::domain::ports::{Clock, RecordStoreRef};
use crate::error::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Rows changed by one reconciliation sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired_payments: u64,
    pub expired_baskets: u64,
    pub completed_baskets: u64,
}

impl SweepReport {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Periodic bulk state correction against the record store.
///
/// Each step is a conditional set-based update, so a sweep with nothing
/// stale changes nothing. Payments are expired before baskets so an overdue
/// order settles in a single pass.
pub struct ReconciliationScheduler {
    store: RecordStoreRef,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl ReconciliationScheduler {
    pub fn new(store: RecordStoreRef, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            store,
            clock,
            interval,
        }
    }

    /// Runs all steps once. A failing step is logged and the remaining
    /// steps still run; the first failure is returned afterwards.
    pub async fn run_sweep_once(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let mut report = SweepReport::default();
        let mut first_error = None;

        match self.store.expire_pending_payments(now).await {
            Ok(n) => report.expired_payments = n,
            Err(e) => {
                error!(error = %e, "Failed to expire stale payments");
                first_error.get_or_insert(e);
            }
        }
        match self.store.expire_waiting_details(now).await {
            Ok(n) => report.expired_baskets = n,
            Err(e) => {
                error!(error = %e, "Failed to expire unpaid baskets");
                first_error.get_or_insert(e);
            }
        }
        match self.store.complete_processing_details(now).await {
            Ok(n) => report.completed_baskets = n,
            Err(e) => {
                error!(error = %e, "Failed to complete finished baskets");
                first_error.get_or_insert(e);
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        if report.is_noop() {
            debug!("Sweep found nothing stale");
        } else {
            info!(
                expired_payments = report.expired_payments,
                expired_baskets = report.expired_baskets,
                completed_baskets = report.completed_baskets,
                "Sweep reconciled records"
            );
        }
        Ok(report)
    }

    /// Starts sweeping on a background task until the handle is stopped.
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_ms = self.interval.as_millis() as u64, "Reconciliation scheduler started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // Failures are already logged per step.
                        let _ = self.run_sweep_once().await;
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
            info!("Reconciliation scheduler stopped");
        });
        SchedulerHandle { shutdown_tx, task }
    }
}

pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signals the sweep loop and waits for it to finish its current pass.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Reconciliation scheduler task failed");
        }
    }
}
