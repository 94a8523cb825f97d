//! Periodic health snapshots of every runtime component.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::alerts::AlertManager;
use crate::application::metric::MetricFetcherRegistry;
use crate::application::monitor::TransactionMonitor;
use crate::application::oracle::OracleClient;
use crate::application::scheduler::JobScheduler;
use crate::domain::{ComponentHealth, HealthReport, JobStatus};
use crate::port::{ChainReader, Clock, Store};

/// Health check thresholds.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Seconds between snapshots.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// In-flight transactions above this degrade the tx monitor.
    #[serde(default = "default_max_pending_transactions")]
    pub max_pending_transactions: usize,
    /// `FAILED` jobs at or above this degrade the job queue.
    #[serde(default = "default_failed_job_threshold")]
    pub failed_job_threshold: u64,
}

fn default_interval_secs() -> u64 {
    60
}

fn default_max_pending_transactions() -> usize {
    20
}

fn default_failed_job_threshold() -> u64 {
    5
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_pending_transactions: default_max_pending_transactions(),
            failed_job_threshold: default_failed_job_threshold(),
        }
    }
}

/// Builds [`HealthReport`]s and feeds them to the alert manager.
pub struct HealthMonitor {
    store: Arc<dyn Store>,
    chain: Arc<dyn ChainReader>,
    oracle: Arc<OracleClient>,
    transactions: Arc<TransactionMonitor>,
    registry: Arc<MetricFetcherRegistry>,
    scheduler: Arc<JobScheduler>,
    clock: Arc<dyn Clock>,
    config: HealthConfig,
    latest: RwLock<Option<HealthReport>>,
}

impl HealthMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        chain: Arc<dyn ChainReader>,
        oracle: Arc<OracleClient>,
        transactions: Arc<TransactionMonitor>,
        registry: Arc<MetricFetcherRegistry>,
        scheduler: Arc<JobScheduler>,
        clock: Arc<dyn Clock>,
        config: HealthConfig,
    ) -> Self {
        Self {
            store,
            chain,
            oracle,
            transactions,
            registry,
            scheduler,
            clock,
            config,
            latest: RwLock::new(None),
        }
    }

    /// Last snapshot taken by the background loop.
    pub fn latest(&self) -> Option<HealthReport> {
        self.latest.read().clone()
    }

    /// Take a fresh snapshot.
    pub async fn check(&self) -> HealthReport {
        let (store, oracle, fetchers, jobs) = tokio::join!(
            self.check_store(),
            self.check_oracle(),
            self.check_fetchers(),
            self.check_jobs(),
        );
        let components = vec![store, oracle, self.check_transactions(), fetchers, jobs];
        let report = HealthReport::new(components, self.clock.now());
        *self.latest.write() = Some(report.clone());
        report
    }

    async fn check_store(&self) -> ComponentHealth {
        match self.store.ping().await {
            Ok(()) => ComponentHealth::healthy("store", true),
            Err(e) => ComponentHealth::unhealthy("store", true, e.to_string()),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    async fn check_oracle(&self) -> ComponentHealth {
        let block = match self.chain.block_number().await {
            Ok(block) => block,
            Err(e) => return ComponentHealth::unhealthy("oracle", true, e.to_string()),
        };
        match self.oracle.get_dispute_window().await {
            Ok(_) => ComponentHealth::healthy("oracle", true).with_detail(block as f64),
            Err(e) => ComponentHealth::unhealthy("oracle", true, e.to_string()),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn check_transactions(&self) -> ComponentHealth {
        let pending = self.transactions.pending_count();
        let health = if pending > self.config.max_pending_transactions {
            ComponentHealth::degraded(
                "tx_monitor",
                false,
                format!("{pending} transactions in flight"),
            )
        } else {
            ComponentHealth::healthy("tx_monitor", false)
        };
        health.with_detail(pending as f64)
    }

    #[allow(clippy::cast_precision_loss)]
    async fn check_fetchers(&self) -> ComponentHealth {
        let health = self.registry.health().await;
        if health.is_empty() {
            return ComponentHealth::unhealthy("fetchers", true, "no fetchers registered");
        }
        let down: Vec<&str> = health
            .iter()
            .filter(|(_, healthy)| !healthy)
            .map(|(id, _)| id.as_str())
            .collect();
        let up = health.len() - down.len();
        let component = if down.is_empty() {
            ComponentHealth::healthy("fetchers", true)
        } else if up == 0 {
            ComponentHealth::unhealthy("fetchers", true, "every fetcher is unhealthy")
        } else {
            ComponentHealth::degraded("fetchers", true, format!("unhealthy: {}", down.join(", ")))
        };
        component.with_detail(up as f64)
    }

    #[allow(clippy::cast_precision_loss)]
    async fn check_jobs(&self) -> ComponentHealth {
        let counts = match self.scheduler.counts().await {
            Ok(counts) => counts,
            Err(e) => return ComponentHealth::unhealthy("jobs", true, e.to_string()),
        };
        let failed = counts
            .iter()
            .find(|(status, _)| *status == JobStatus::Failed)
            .map_or(0, |(_, n)| *n);
        let stale = match self.scheduler.stale_jobs().await {
            Ok(stale) => stale.len(),
            Err(e) => return ComponentHealth::unhealthy("jobs", true, e.to_string()),
        };

        let component = if stale > 0 {
            ComponentHealth::degraded("jobs", true, format!("{stale} jobs stuck in PROCESSING"))
        } else if failed >= self.config.failed_job_threshold {
            ComponentHealth::degraded("jobs", true, format!("{failed} failed jobs"))
        } else {
            ComponentHealth::healthy("jobs", true)
        };
        component.with_detail(failed as f64)
    }

    /// Snapshot on the configured interval and evaluate alert rules.
    pub fn start(
        self: Arc<Self>,
        alerts: Arc<AlertManager>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let period = Duration::from_secs(self.config.interval_secs.max(1));
        tokio::spawn(async move {
            info!(interval_secs = period.as_secs(), "Health monitor started");
            loop {
                let report = self.check().await;
                if report.is_healthy() {
                    debug!("Health check passed");
                } else {
                    warn!(status = %report.status(), "Health check degraded");
                }
                alerts.evaluate(&report);

                tokio::select! {
                    _ = shutdown.changed() => break,
                    () = tokio::time::sleep(period) => {}
                }
            }
            debug!("Health monitor stopped");
        })
    }
}
