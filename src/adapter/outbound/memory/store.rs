//! In-memory store implementation for tests and dry runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::domain::{
    Job, JobId, JobStatus, JobType, Market, MarketId, MarketStatus, MetricRecord, Resolution,
};
use crate::error::{Error, Result};
use crate::port::{JobStore, MarketStore, MetricAuditStore, ResolutionStore, Store};

/// In-memory store for testing purposes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    markets: RwLock<HashMap<MarketId, Market>>,
    jobs: RwLock<HashMap<JobId, Job>>,
    resolutions: RwLock<HashMap<MarketId, Resolution>>,
    metrics: RwLock<Vec<MetricRecord>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every job, for assertions.
    pub fn all_jobs(&self) -> Vec<Job> {
        self.jobs.read().values().cloned().collect()
    }
}

#[async_trait]
impl MarketStore for MemoryStore {
    async fn insert_market(&self, market: &Market) -> Result<bool> {
        let mut markets = self.markets.write();
        if markets.contains_key(&market.id) {
            return Ok(false);
        }
        markets.insert(market.id, market.clone());
        Ok(true)
    }

    async fn get_market(&self, id: &MarketId) -> Result<Option<Market>> {
        Ok(self.markets.read().get(id).cloned())
    }

    async fn update_market_status(
        &self,
        id: &MarketId,
        status: MarketStatus,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut markets = self.markets.write();
        let market = markets.get_mut(id).ok_or(Error::MarketNotFound(*id))?;
        market.status = status;
        market.updated_at = now;
        Ok(())
    }

    async fn markets_by_status(&self, status: MarketStatus) -> Result<Vec<Market>> {
        let mut markets: Vec<Market> = self
            .markets
            .read()
            .values()
            .filter(|m| m.status == status)
            .cloned()
            .collect();
        markets.sort_by_key(|m| m.created_at);
        Ok(markets)
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert_job(&self, job: &Job) -> Result<()> {
        self.jobs.write().insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, id: &JobId) -> Result<Option<Job>> {
        Ok(self.jobs.read().get(id).cloned())
    }

    async fn update_job(&self, job: &Job) -> Result<()> {
        let mut jobs = self.jobs.write();
        let slot = jobs
            .get_mut(&job.id)
            .ok_or_else(|| Error::JobNotFound(job.id.to_string()))?;
        *slot = job.clone();
        Ok(())
    }

    async fn claim_next_job(&self, now: DateTime<Utc>) -> Result<Option<Job>> {
        let mut jobs = self.jobs.write();
        let next = jobs
            .values()
            .filter(|j| j.is_due(now))
            .min_by_key(|j| (j.scheduled_for, j.created_at))
            .map(|j| j.id);
        let Some(id) = next else {
            return Ok(None);
        };
        let Some(job) = jobs.get_mut(&id) else {
            return Ok(None);
        };
        job.status = JobStatus::Processing;
        job.started_at = Some(now);
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn find_stale_jobs(&self, started_before: DateTime<Utc>) -> Result<Vec<Job>> {
        Ok(self
            .jobs
            .read()
            .values()
            .filter(|j| {
                j.status == JobStatus::Processing
                    && j.started_at.is_some_and(|t| t < started_before)
            })
            .cloned()
            .collect())
    }

    async fn list_jobs(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .values()
            .filter(|j| status.map_or(true, |s| j.status == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn has_open_job(&self, market: &MarketId, job_type: JobType) -> Result<bool> {
        Ok(self
            .jobs
            .read()
            .values()
            .any(|j| j.market_id == *market && j.job_type == job_type && j.status.is_open()))
    }

    async fn jobs_for_market(&self, market: &MarketId, job_type: JobType) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .values()
            .filter(|j| j.market_id == *market && j.job_type == job_type)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn job_counts(&self) -> Result<Vec<(JobStatus, u64)>> {
        let jobs = self.jobs.read();
        Ok(JobStatus::ALL
            .iter()
            .map(|s| (*s, jobs.values().filter(|j| j.status == *s).count() as u64))
            .collect())
    }

    async fn prune_jobs(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let markets = self.markets.read();
        let live = |id: &MarketId| {
            markets
                .get(id)
                .is_some_and(|m| matches!(m.status, MarketStatus::Active | MarketStatus::Committed))
        };
        let mut jobs = self.jobs.write();
        let before = jobs.len();
        jobs.retain(|_, j| {
            let prunable = match j.status {
                JobStatus::Completed => true,
                JobStatus::Failed => !live(&j.market_id),
                _ => false,
            };
            !(prunable && j.updated_at < older_than)
        });
        Ok(before - jobs.len())
    }
}

#[async_trait]
impl ResolutionStore for MemoryStore {
    async fn save_resolution(&self, resolution: &Resolution) -> Result<()> {
        self.resolutions
            .write()
            .insert(resolution.market_id, resolution.clone());
        Ok(())
    }

    async fn get_resolution(&self, market: &MarketId) -> Result<Option<Resolution>> {
        Ok(self.resolutions.read().get(market).cloned())
    }
}

#[async_trait]
impl MetricAuditStore for MemoryStore {
    async fn record_metric(&self, record: &MetricRecord) -> Result<()> {
        self.metrics.write().push(record.clone());
        Ok(())
    }

    async fn metrics_for_market(&self, market: &MarketId) -> Result<Vec<MetricRecord>> {
        Ok(self
            .metrics
            .read()
            .iter()
            .filter(|r| r.market_id == *market)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
