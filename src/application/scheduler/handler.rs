//! Job handler contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::Job;
use crate::error::Result;

/// What a handler made of a job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// Done; the value is stored as the job result.
    Completed(serde_json::Value),
    /// Not yet actionable. The job goes back to `PENDING` at `until`
    /// without consuming an attempt.
    Deferred {
        until: DateTime<Utc>,
        reason: String,
    },
}

impl JobOutcome {
    pub fn completed(result: serde_json::Value) -> Self {
        Self::Completed(result)
    }

    pub fn deferred(until: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self::Deferred {
            until,
            reason: reason.into(),
        }
    }
}

/// Executes jobs of one type.
///
/// Delivery is at-least-once, so implementations must be idempotent.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<JobOutcome>;
}
