//! Periodic repair pass over markets whose job went missing.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::oracle::OracleClient;
use crate::application::scheduler::JobQueue;
use crate::domain::{JobStatus, JobType, MarketId, MarketStatus};
use crate::error::Result;
use crate::port::{Clock, Store};

/// Jobs created by one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub resolve_scheduled: usize,
    pub finalize_scheduled: usize,
}

/// Schedules RESOLVE for overdue `ACTIVE` markets and FINALIZE for
/// `COMMITTED` markets that have no job of that type.
///
/// A market whose job is open or `FAILED` is skipped; failed jobs come
/// back only through a manual requeue.
pub struct Reconciler {
    store: Arc<dyn Store>,
    jobs: JobQueue,
    oracle: Arc<OracleClient>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn Store>,
        jobs: JobQueue,
        oracle: Arc<OracleClient>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            jobs,
            oracle,
            clock,
            interval,
        }
    }

    /// The market has no job of this type that is open or failed.
    async fn is_orphaned(&self, market: &MarketId, job_type: JobType) -> Result<bool> {
        let jobs = self.store.jobs_for_market(market, job_type).await?;
        let blocked = jobs.iter().find(|j| j.status.is_open() || j.status == JobStatus::Failed);
        if let Some(job) = blocked {
            if job.status == JobStatus::Failed {
                debug!(market = %market, job = %job.id, "Skipping market with a failed job");
            }
            return Ok(false);
        }
        Ok(true)
    }

    pub async fn run_once(&self) -> Result<ReconcileReport> {
        let now = self.clock.now();
        let mut report = ReconcileReport::default();

        for market in self.store.markets_by_status(MarketStatus::Active).await? {
            if !market.is_due(now) {
                continue;
            }
            if !self.is_orphaned(&market.id, JobType::ResolveMarket).await? {
                continue;
            }
            let scheduled = self
                .jobs
                .schedule_unless_open(
                    JobType::ResolveMarket,
                    market.id,
                    json!({ "market": market.id }),
                    now,
                )
                .await?;
            if scheduled.is_some() {
                report.resolve_scheduled += 1;
            }
        }

        let committed = self.store.markets_by_status(MarketStatus::Committed).await?;
        if !committed.is_empty() {
            let window = match self.oracle.get_dispute_window().await {
                Ok(window) => chrono::Duration::from_std(window).ok(),
                Err(e) => {
                    warn!(error = %e, "Dispute window unavailable; finalizing on next claim");
                    None
                }
            };
            for market in committed {
                if !self.is_orphaned(&market.id, JobType::FinalizeMarket).await? {
                    continue;
                }
                let committed_at = self
                    .store
                    .get_resolution(&market.id)
                    .await?
                    .and_then(|r| r.committed_at);
                let run_at = match (committed_at, window) {
                    (Some(at), Some(window)) => at + window,
                    _ => now,
                };
                let scheduled = self
                    .jobs
                    .schedule_unless_open(
                        JobType::FinalizeMarket,
                        market.id,
                        json!({ "market": market.id }),
                        run_at,
                    )
                    .await?;
                if scheduled.is_some() {
                    report.finalize_scheduled += 1;
                }
            }
        }

        if report != ReconcileReport::default() {
            info!(
                resolve = report.resolve_scheduled,
                finalize = report.finalize_scheduled,
                "Reconciliation scheduled missing jobs"
            );
        } else {
            debug!("Reconciliation found nothing to repair");
        }
        Ok(report)
    }

    pub fn start(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if let Err(e) = self.run_once().await {
                    warn!(error = %e, "Reconciliation failed");
                }
                tokio::select! {
                    _ = shutdown.changed() => break,
                    () = tokio::time::sleep(self.interval) => {}
                }
            }
            debug!("Reconciler stopped");
        })
    }
}
