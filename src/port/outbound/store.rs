//! Persistence ports for markets, jobs, resolutions and the metric audit log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Job, JobId, JobStatus, JobType, Market, MarketId, MarketStatus, MetricRecord, Resolution,
};
use crate::error::Result;

/// Storage operations for markets.
#[async_trait]
pub trait MarketStore: Send + Sync {
    /// Insert a market unless one with the same id exists.
    ///
    /// Returns `true` when the row was created. An existing row is left
    /// untouched so re-ingestion never resets its status.
    async fn insert_market(&self, market: &Market) -> Result<bool>;

    /// Get a market by id.
    async fn get_market(&self, id: &MarketId) -> Result<Option<Market>>;

    /// Change a market's status.
    async fn update_market_status(
        &self,
        id: &MarketId,
        status: MarketStatus,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Markets in the given status, oldest first.
    async fn markets_by_status(&self, status: MarketStatus) -> Result<Vec<Market>>;
}

/// Storage operations for scheduled jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job.
    async fn insert_job(&self, job: &Job) -> Result<()>;

    /// Get a job by id.
    async fn get_job(&self, id: &JobId) -> Result<Option<Job>>;

    /// Overwrite a job's mutable fields.
    async fn update_job(&self, job: &Job) -> Result<()>;

    /// Atomically move the earliest due `PENDING`/`RETRYING` job to
    /// `PROCESSING` and return it.
    ///
    /// Two concurrent callers never receive the same job.
    async fn claim_next_job(&self, now: DateTime<Utc>) -> Result<Option<Job>>;

    /// Jobs still `PROCESSING` that started before `started_before`.
    async fn find_stale_jobs(&self, started_before: DateTime<Utc>) -> Result<Vec<Job>>;

    /// Most recently updated jobs, optionally filtered by status.
    async fn list_jobs(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<Job>>;

    /// A `PENDING`, `PROCESSING` or `RETRYING` job of this type exists.
    async fn has_open_job(&self, market: &MarketId, job_type: JobType) -> Result<bool>;

    /// Every job of this type for a market, oldest first.
    async fn jobs_for_market(&self, market: &MarketId, job_type: JobType) -> Result<Vec<Job>>;

    /// Number of jobs per status. Statuses with no jobs may be omitted.
    async fn job_counts(&self) -> Result<Vec<(JobStatus, u64)>>;

    /// Delete `COMPLETED` jobs last updated before the cutoff, and `FAILED`
    /// ones whose market is no longer `ACTIVE` or `COMMITTED`.
    ///
    /// A failed job of a live market is kept so it stays visible for
    /// manual replay.
    async fn prune_jobs(&self, older_than: DateTime<Utc>) -> Result<usize>;
}

/// Storage operations for resolution records.
#[async_trait]
pub trait ResolutionStore: Send + Sync {
    /// Save a resolution, replacing any previous one for the market.
    async fn save_resolution(&self, resolution: &Resolution) -> Result<()>;

    /// Get the resolution for a market.
    async fn get_resolution(&self, market: &MarketId) -> Result<Option<Resolution>>;
}

/// Append-only audit log of fetched metric values.
#[async_trait]
pub trait MetricAuditStore: Send + Sync {
    /// Append a record.
    async fn record_metric(&self, record: &MetricRecord) -> Result<()>;

    /// Every record for a market in fetch order.
    async fn metrics_for_market(&self, market: &MarketId) -> Result<Vec<MetricRecord>>;
}

/// Everything the engine persists, behind one handle.
#[async_trait]
pub trait Store: MarketStore + JobStore + ResolutionStore + MetricAuditStore {
    /// Cheap round trip used by health checks.
    async fn ping(&self) -> Result<()>;
}
