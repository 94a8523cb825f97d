//! `oracled jobs`: inspect the queue and replay failed jobs.

use std::path::Path;
use std::sync::Arc;

use chrono::SecondsFormat;
use serde_json::json;
use tabled::Tabled;

use crate::adapter::inbound::cli::output;
use crate::application::scheduler::JobScheduler;
use crate::domain::{Job, JobId, JobStatus};
use crate::error::Result;
use crate::infrastructure::bootstrap;
use crate::infrastructure::config::Config;
use crate::port::{NullNotifier, Store, SystemClock};

#[derive(Tabled)]
struct JobRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Type")]
    job_type: String,
    #[tabled(rename = "Market")]
    market: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Attempts")]
    attempts: String,
    #[tabled(rename = "Scheduled")]
    scheduled_for: String,
    #[tabled(rename = "Last error")]
    last_error: String,
}

fn row(job: &Job) -> JobRow {
    JobRow {
        id: job.id.to_string(),
        job_type: job.job_type.to_string(),
        market: job.market_id.to_string(),
        status: output::status(job.status, status_tone(job.status)),
        attempts: format!("{}/{}", job.attempts, job.max_attempts),
        scheduled_for: job.scheduled_for.to_rfc3339_opts(SecondsFormat::Secs, true),
        last_error: job.last_error.clone().unwrap_or_default(),
    }
}

fn status_tone(status: JobStatus) -> Option<bool> {
    match status {
        JobStatus::Completed => Some(true),
        JobStatus::Failed => Some(false),
        JobStatus::Pending | JobStatus::Processing | JobStatus::Retrying => None,
    }
}

/// Queue operations need no chain access; notifications are dropped.
fn scheduler(store: Arc<dyn Store>, config: &Config) -> JobScheduler {
    JobScheduler::new(
        store,
        Arc::new(SystemClock),
        Arc::new(NullNotifier),
        config.scheduler.clone(),
    )
}

/// List jobs, optionally filtered by status.
pub async fn execute_list<P: AsRef<Path>>(
    config_path: P,
    status: Option<JobStatus>,
    limit: usize,
) -> Result<()> {
    let config = Config::load(config_path.as_ref())?;
    let store = bootstrap::open_store(&config.database)?;
    let scheduler = scheduler(store, &config);
    list(&scheduler, status, limit).await
}

async fn list(scheduler: &JobScheduler, status: Option<JobStatus>, limit: usize) -> Result<()> {
    let jobs = scheduler.list(status, limit).await?;
    let counts = scheduler.counts().await?;

    if output::is_json() {
        let counts: serde_json::Map<String, serde_json::Value> = counts
            .iter()
            .map(|(status, n)| (status.to_string(), json!(n)))
            .collect();
        output::json_output(json!({
            "command": "jobs.list",
            "counts": counts,
            "jobs": serde_json::to_value(&jobs)?,
        }));
        return Ok(());
    }

    output::section("Jobs");
    let summary = counts
        .iter()
        .map(|(status, n)| format!("{} {n}", status.as_str().to_ascii_lowercase()))
        .collect::<Vec<_>>()
        .join("  ");
    output::field("Queue", summary);

    if jobs.is_empty() {
        output::note("No jobs found");
        return Ok(());
    }
    output::table(jobs.iter().map(row).collect());
    if jobs.len() == limit {
        output::hint(&format!("showing the first {limit}; raise --limit for more"));
    }
    Ok(())
}

/// Put a FAILED job back in the queue.
pub async fn execute_replay<P: AsRef<Path>>(config_path: P, id: JobId) -> Result<()> {
    let config = Config::load(config_path.as_ref())?;
    let store = bootstrap::open_store(&config.database)?;
    let scheduler = scheduler(store, &config);
    replay(&scheduler, &id).await
}

async fn replay(scheduler: &JobScheduler, id: &JobId) -> Result<()> {
    let job = scheduler.requeue(id).await?;

    if output::is_json() {
        output::json_output(json!({
            "command": "jobs.replay",
            "job": serde_json::to_value(&job)?,
        }));
        return Ok(());
    }

    output::success(&format!(
        "Requeued {} job {} for market {}",
        job.job_type,
        output::highlight(job.id),
        job.market_id
    ));
    Ok(())
}
