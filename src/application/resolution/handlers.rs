//! Scheduler handlers for `RESOLVE_MARKET` and `FINALIZE_MARKET` jobs.

use std::sync::Arc;

use async_trait::async_trait;

use super::processor::{MarketProcessor, ProcessOutcome};
use crate::application::scheduler::{JobHandler, JobOutcome};
use crate::domain::Job;
use crate::error::Result;

fn to_job_outcome(outcome: ProcessOutcome) -> Result<JobOutcome> {
    match outcome {
        ProcessOutcome::NotDue { until } => Ok(JobOutcome::deferred(until, "not due yet")),
        other => Ok(JobOutcome::completed(serde_json::to_value(&other)?)),
    }
}

/// Runs [`MarketProcessor::process_market_resolution`].
pub struct ResolveMarketHandler {
    processor: Arc<MarketProcessor>,
}

impl ResolveMarketHandler {
    pub fn new(processor: Arc<MarketProcessor>) -> Self {
        Self { processor }
    }
}

#[async_trait]
impl JobHandler for ResolveMarketHandler {
    async fn handle(&self, job: &Job) -> Result<JobOutcome> {
        let outcome = self
            .processor
            .process_market_resolution(&job.market_id)
            .await?;
        to_job_outcome(outcome)
    }
}

/// Runs [`MarketProcessor::process_market_finalization`].
pub struct FinalizeMarketHandler {
    processor: Arc<MarketProcessor>,
}

impl FinalizeMarketHandler {
    pub fn new(processor: Arc<MarketProcessor>) -> Self {
        Self { processor }
    }
}

#[async_trait]
impl JobHandler for FinalizeMarketHandler {
    async fn handle(&self, job: &Job) -> Result<JobOutcome> {
        let outcome = self
            .processor
            .process_market_finalization(&job.market_id)
            .await?;
        to_job_outcome(outcome)
    }
}
