//! Durable job records executed by the scheduler.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::DomainError;
use super::id::{JobId, MarketId};

/// Kind of work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    /// Fetch data, evaluate, and commit an outcome.
    ResolveMarket,
    /// Finalize a committed outcome after the dispute window.
    FinalizeMarket,
}

impl JobType {
    /// Stored representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ResolveMarket => "RESOLVE_MARKET",
            Self::FinalizeMarket => "FINALIZE_MARKET",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RESOLVE_MARKET" => Ok(Self::ResolveMarket),
            "FINALIZE_MARKET" => Ok(Self::FinalizeMarket),
            other => Err(DomainError::UnknownVariant {
                kind: "job type",
                value: other.to_string(),
            }),
        }
    }
}

/// Scheduler state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Waiting for `scheduled_for`.
    Pending,
    /// Claimed by a worker.
    Processing,
    /// Finished successfully.
    Completed,
    /// Permanently failed; only an operator requeue revives it.
    Failed,
    /// Failed at least once; waiting for its backoff to expire.
    Retrying,
}

impl JobStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Processing,
        Self::Retrying,
        Self::Completed,
        Self::Failed,
    ];

    /// Stored representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Retrying => "RETRYING",
        }
    }

    /// Jobs in these states are still going to run.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing | Self::Retrying)
    }

    /// Jobs in these states may be claimed once due.
    #[must_use]
    pub const fn is_claimable(&self) -> bool {
        matches!(self, Self::Pending | Self::Retrying)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            "RETRYING" => Ok(Self::Retrying),
            _ => Err(DomainError::UnknownVariant {
                kind: "job status",
                value: s.to_string(),
            }),
        }
    }
}

/// A unit of scheduled work.
///
/// `attempts` counts failed executions; it never exceeds `max_attempts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier.
    pub id: JobId,
    /// Work to perform.
    pub job_type: JobType,
    /// Market the job acts on.
    pub market_id: MarketId,
    /// Current state.
    pub status: JobStatus,
    /// Earliest time the job may run.
    pub scheduled_for: DateTime<Utc>,
    /// Failed executions so far.
    pub attempts: u32,
    /// Failures allowed before the job is marked failed.
    pub max_attempts: u32,
    /// Handler input.
    pub payload: serde_json::Value,
    /// Handler output on success.
    pub result: Option<serde_json::Value>,
    /// Most recent error message.
    pub last_error: Option<String>,
    /// When the job was scheduled.
    pub created_at: DateTime<Utc>,
    /// When the job last changed.
    pub updated_at: DateTime<Utc>,
    /// When the current or last execution started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a `PENDING` job.
    #[must_use]
    pub fn new(
        job_type: JobType,
        market_id: MarketId,
        payload: serde_json::Value,
        scheduled_for: DateTime<Utc>,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: JobId::generate(),
            job_type,
            market_id,
            status: JobStatus::Pending,
            scheduled_for,
            attempts: 0,
            max_attempts,
            payload,
            result: None,
            last_error: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Claimable and due at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status.is_claimable() && self.scheduled_for <= now
    }
}
