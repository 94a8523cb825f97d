//! Durable, retrying job queue and worker pool.
//!
//! Jobs live in the store; workers poll it, atomically claim one due job
//! at a time and dispatch it by [`JobType`] to a registered
//! [`JobHandler`]. The pool size bounds concurrency; excess jobs simply wait
//! in the store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::handler::{JobHandler, JobOutcome};
use crate::domain::{Job, JobId, JobStatus, JobType, MarketId};
use crate::error::{Error, Result};
use crate::port::{Clock, Event, JobFailedEvent, Notifier, Store};

/// Worker pool and retry policy.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Concurrent workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Idle poll interval (milliseconds).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Attempts before a job is failed permanently.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry (seconds).
    #[serde(default = "default_base_backoff_secs")]
    pub base_backoff_secs: u64,
    /// Upper bound for retry delays (seconds).
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    /// `PROCESSING` longer than this is reported as stale (seconds).
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    /// Completed and failed jobs older than this are pruned (days, 0 keeps all).
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
    /// Interval of the stale-job and pruning sweep (seconds).
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_workers() -> usize {
    4
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_backoff_secs() -> u64 {
    30
}

fn default_max_backoff_secs() -> u64 {
    3_600
}

fn default_stale_after_secs() -> u64 {
    900
}

fn default_retention_days() -> u64 {
    30
}

fn default_sweep_interval_secs() -> u64 {
    300
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            poll_interval_ms: default_poll_interval_ms(),
            max_attempts: default_max_attempts(),
            base_backoff_secs: default_base_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            stale_after_secs: default_stale_after_secs(),
            retention_days: default_retention_days(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl SchedulerConfig {
    /// `base * 2^attempts`, capped. `attempts` counts failures so far,
    /// including the one being rescheduled.
    #[must_use]
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exp = attempts.min(32);
        let secs = self
            .base_backoff_secs
            .saturating_mul(1u64 << exp)
            .min(self.max_backoff_secs);
        Duration::from_secs(secs)
    }
}

/// Write side of the queue, shared with producers of jobs.
#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
}

impl JobQueue {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, max_attempts: u32) -> Self {
        Self {
            store,
            clock,
            max_attempts,
        }
    }

    /// Persist a `PENDING` job due at `run_at`.
    pub async fn schedule(
        &self,
        job_type: JobType,
        market_id: MarketId,
        payload: serde_json::Value,
        run_at: DateTime<Utc>,
    ) -> Result<Job> {
        let job = Job::new(
            job_type,
            market_id,
            payload,
            run_at,
            self.max_attempts,
            self.clock.now(),
        );
        self.store.insert_job(&job).await?;
        info!(job = %job.id, job_type = %job_type, market = %market_id, run_at = %run_at, "Job scheduled");
        Ok(job)
    }

    /// Schedule unless an open job of this type already exists for the market.
    pub async fn schedule_unless_open(
        &self,
        job_type: JobType,
        market_id: MarketId,
        payload: serde_json::Value,
        run_at: DateTime<Utc>,
    ) -> Result<Option<Job>> {
        if self.store.has_open_job(&market_id, job_type).await? {
            debug!(job_type = %job_type, market = %market_id, "Open job exists; not scheduling");
            return Ok(None);
        }
        self.schedule(job_type, market_id, payload, run_at)
            .await
            .map(Some)
    }
}

/// Durable job queue with a bounded worker pool.
pub struct JobScheduler {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    queue: JobQueue,
    config: SchedulerConfig,
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl JobScheduler {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        config: SchedulerConfig,
    ) -> Self {
        let queue = JobQueue::new(store.clone(), clock.clone(), config.max_attempts);
        Self {
            store,
            clock,
            notifier,
            queue,
            config,
            handlers: HashMap::new(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Producer handle for listeners, processors and the reconciler.
    pub fn queue(&self) -> JobQueue {
        self.queue.clone()
    }

    /// Register the handler for a job type, replacing any previous one.
    pub fn register(&mut self, job_type: JobType, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(job_type, handler);
    }

    /// Persist a `PENDING` job due at `run_at`.
    pub async fn schedule(
        &self,
        job_type: JobType,
        market_id: MarketId,
        payload: serde_json::Value,
        run_at: DateTime<Utc>,
    ) -> Result<Job> {
        self.queue.schedule(job_type, market_id, payload, run_at).await
    }

    /// Schedule unless an open job of this type already exists for the market.
    pub async fn schedule_unless_open(
        &self,
        job_type: JobType,
        market_id: MarketId,
        payload: serde_json::Value,
        run_at: DateTime<Utc>,
    ) -> Result<Option<Job>> {
        self.queue
            .schedule_unless_open(job_type, market_id, payload, run_at)
            .await
    }

    /// Claim and execute one due job. Returns the job's new state, or
    /// `None` when nothing was due.
    pub async fn run_next(&self) -> Result<Option<Job>> {
        let Some(job) = self.store.claim_next_job(self.clock.now()).await? else {
            return Ok(None);
        };
        self.execute(job).await.map(Some)
    }

    async fn execute(&self, mut job: Job) -> Result<Job> {
        debug!(job = %job.id, job_type = %job.job_type, market = %job.market_id, attempts = job.attempts, "Executing job");

        let outcome = match self.handlers.get(&job.job_type) {
            Some(handler) => handler.handle(&job).await,
            None => Err(Error::Parse(format!(
                "no handler registered for {}",
                job.job_type
            ))),
        };
        let now = self.clock.now();
        job.updated_at = now;

        match outcome {
            Ok(JobOutcome::Completed(result)) => {
                job.status = JobStatus::Completed;
                job.result = Some(result);
                job.last_error = None;
                job.completed_at = Some(now);
                info!(job = %job.id, job_type = %job.job_type, market = %job.market_id, "Job completed");
            }
            Ok(JobOutcome::Deferred { until, reason }) => {
                job.status = JobStatus::Pending;
                job.scheduled_for = until;
                job.started_at = None;
                info!(job = %job.id, job_type = %job.job_type, until = %until, reason = %reason, "Job deferred");
            }
            Err(e) => self.record_failure(&mut job, &e, now),
        }

        self.store.update_job(&job).await?;
        Ok(job)
    }

    fn record_failure(&self, job: &mut Job, err: &Error, now: DateTime<Utc>) {
        job.attempts = (job.attempts + 1).min(job.max_attempts);
        job.last_error = Some(err.to_string());
        job.started_at = None;

        let exhausted = job.attempts >= job.max_attempts;
        if err.is_terminal() || exhausted {
            job.status = JobStatus::Failed;
            job.completed_at = Some(now);
            error!(
                job = %job.id,
                job_type = %job.job_type,
                market = %job.market_id,
                attempts = job.attempts,
                terminal = err.is_terminal(),
                error = %err,
                "Job failed permanently"
            );
            self.notifier.notify(Event::JobFailed(JobFailedEvent {
                job_id: job.id,
                job_type: job.job_type,
                market_id: job.market_id,
                attempts: job.attempts,
                error: err.to_string(),
            }));
            return;
        }

        let delay = self.config.backoff(job.attempts);
        let delay = chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::days(1));
        job.status = JobStatus::Retrying;
        job.scheduled_for = now + delay;
        warn!(
            job = %job.id,
            job_type = %job.job_type,
            attempts = job.attempts,
            retry_at = %job.scheduled_for,
            error = %err,
            "Job failed; retrying"
        );
    }

    /// Put a `FAILED` job back in the queue with a fresh attempt budget.
    pub async fn requeue(&self, id: &JobId) -> Result<Job> {
        let mut job = self
            .store
            .get_job(id)
            .await?
            .ok_or_else(|| Error::JobNotFound(id.to_string()))?;
        if job.status != JobStatus::Failed {
            return Err(Error::NotReplayable {
                id: id.to_string(),
                status: job.status.to_string(),
            });
        }
        let now = self.clock.now();
        job.status = JobStatus::Pending;
        job.attempts = 0;
        job.scheduled_for = now;
        job.last_error = None;
        job.started_at = None;
        job.completed_at = None;
        job.updated_at = now;
        self.store.update_job(&job).await?;
        info!(job = %job.id, job_type = %job.job_type, market = %job.market_id, "Job requeued");
        Ok(job)
    }

    pub async fn get(&self, id: &JobId) -> Result<Option<Job>> {
        self.store.get_job(id).await
    }

    pub async fn list(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<Job>> {
        self.store.list_jobs(status, limit).await
    }

    /// Job count for every status, zeros included.
    pub async fn counts(&self) -> Result<Vec<(JobStatus, u64)>> {
        let stored = self.store.job_counts().await?;
        Ok(JobStatus::ALL
            .iter()
            .map(|status| {
                let n = stored
                    .iter()
                    .find(|(s, _)| s == status)
                    .map_or(0, |(_, n)| *n);
                (*status, n)
            })
            .collect())
    }

    /// Delete completed and failed jobs last touched before `older_than`.
    pub async fn prune(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let pruned = self.store.prune_jobs(older_than).await?;
        if pruned > 0 {
            info!(pruned, older_than = %older_than, "Pruned finished jobs");
        }
        Ok(pruned)
    }

    /// Jobs stuck in `PROCESSING` past the stale threshold. They are only
    /// reported, never requeued automatically.
    pub async fn stale_jobs(&self) -> Result<Vec<Job>> {
        let threshold = chrono::Duration::seconds(
            i64::try_from(self.config.stale_after_secs).unwrap_or(i64::MAX),
        );
        self.store
            .find_stale_jobs(self.clock.now() - threshold)
            .await
    }

    /// One maintenance pass: surface stale jobs, prune old finished ones.
    pub async fn sweep(&self) -> Result<()> {
        for job in self.stale_jobs().await? {
            warn!(
                job = %job.id,
                job_type = %job.job_type,
                market = %job.market_id,
                started_at = ?job.started_at,
                "Job stuck in PROCESSING"
            );
        }
        if self.config.retention_days > 0 {
            let retention = chrono::Duration::days(
                i64::try_from(self.config.retention_days).unwrap_or(i64::MAX / 86_400),
            );
            self.prune(self.clock.now() - retention).await?;
        }
        Ok(())
    }

    /// Spawn the worker pool and the maintenance sweep.
    ///
    /// Workers finish their in-flight job before observing shutdown.
    pub fn start(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles: Vec<JoinHandle<()>> = (0..self.config.workers.max(1))
            .map(|worker| {
                let scheduler = Arc::clone(&self);
                let shutdown = shutdown.clone();
                tokio::spawn(async move { scheduler.worker_loop(worker, shutdown).await })
            })
            .collect();

        let scheduler = Arc::clone(&self);
        handles.push(tokio::spawn(async move {
            scheduler.sweep_loop(shutdown).await;
        }));
        info!(workers = self.config.workers.max(1), "Job scheduler started");
        handles
    }

    async fn worker_loop(&self, worker: usize, mut shutdown: watch::Receiver<bool>) {
        let idle = Duration::from_millis(self.config.poll_interval_ms.max(1));
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.run_next().await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => warn!(worker, error = %e, "Job poll failed"),
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                () = tokio::time::sleep(idle) => {}
            }
        }
        debug!(worker, "Worker stopped");
    }

    async fn sweep_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let period = Duration::from_secs(self.config.sweep_interval_secs.max(1));
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                () = tokio::time::sleep(period) => {
                    if let Err(e) = self.sweep().await {
                        warn!(error = %e, "Job sweep failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::outbound::memory::MemoryStore;
    use crate::error::{OracleError, ValidationError};
    use crate::port::JobStore;
    use crate::testkit::{fixtures, ManualClock, RecordingNotifier};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;

    struct Scripted {
        results: Mutex<VecDeque<Result<JobOutcome>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(results: Vec<Result<JobOutcome>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock()
        }
    }

    #[async_trait]
    impl JobHandler for Scripted {
        async fn handle(&self, _job: &Job) -> Result<JobOutcome> {
            *self.calls.lock() += 1;
            self.results
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(Error::Connection("rpc reset".into())))
        }
    }

    struct Setup {
        clock: Arc<ManualClock>,
        store: Arc<MemoryStore>,
        notifier: RecordingNotifier,
        scheduler: JobScheduler,
    }

    fn setup(max_attempts: u32, handler: Arc<Scripted>) -> Setup {
        let clock = Arc::new(ManualClock::new(fixtures::t0()));
        let store = Arc::new(MemoryStore::new());
        let notifier = RecordingNotifier::new();
        let config = SchedulerConfig {
            max_attempts,
            base_backoff_secs: 10,
            max_backoff_secs: 25,
            ..SchedulerConfig::default()
        };
        let mut scheduler = JobScheduler::new(
            store.clone(),
            clock.clone(),
            Arc::new(notifier.clone()),
            config,
        );
        scheduler.register(JobType::ResolveMarket, handler);
        Setup {
            clock,
            store,
            notifier,
            scheduler,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let config = SchedulerConfig {
            base_backoff_secs: 10,
            max_backoff_secs: 50,
            ..SchedulerConfig::default()
        };
        assert_eq!(config.backoff(0), Duration::from_secs(10));
        assert_eq!(config.backoff(1), Duration::from_secs(20));
        assert_eq!(config.backoff(2), Duration::from_secs(40));
        assert_eq!(config.backoff(3), Duration::from_secs(50));
        assert_eq!(config.backoff(60), Duration::from_secs(50));
    }

    #[tokio::test]
    async fn job_never_runs_before_its_time() {
        let handler = Scripted::new(vec![Ok(JobOutcome::completed(json!({"ok": true})))]);
        let s = setup(3, handler.clone());
        let run_at = fixtures::t0() + chrono::Duration::seconds(60);
        s.scheduler
            .schedule(JobType::ResolveMarket, fixtures::market_id(1), json!({}), run_at)
            .await
            .unwrap();

        assert!(s.scheduler.run_next().await.unwrap().is_none());
        assert_eq!(handler.calls(), 0);

        s.clock.advance(chrono::Duration::seconds(60));
        let job = s.scheduler.run_next().await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result, Some(json!({"ok": true})));
    }

    #[tokio::test]
    async fn transient_failure_retries_with_backoff() {
        let handler = Scripted::new(vec![Err(Error::Connection("reset".into()))]);
        let s = setup(3, handler);
        s.scheduler
            .schedule(JobType::ResolveMarket, fixtures::market_id(1), json!({}), fixtures::t0())
            .await
            .unwrap();

        let job = s.scheduler.run_next().await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Retrying);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.scheduled_for, fixtures::t0() + chrono::Duration::seconds(20));
        assert!(s.scheduler.run_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn exhausting_attempts_fails_exactly_once() {
        let handler = Scripted::new(vec![]);
        let s = setup(2, handler.clone());
        let job = s
            .scheduler
            .schedule(JobType::ResolveMarket, fixtures::market_id(1), json!({}), fixtures::t0())
            .await
            .unwrap();

        s.scheduler.run_next().await.unwrap();
        s.clock.advance(chrono::Duration::seconds(20));
        let failed = s.scheduler.run_next().await.unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.attempts, 2);

        s.clock.advance(chrono::Duration::days(1));
        assert!(s.scheduler.run_next().await.unwrap().is_none());
        assert_eq!(handler.calls(), 2);
        assert_eq!(
            s.notifier.count(|e| matches!(e, Event::JobFailed(_))),
            1
        );
        let stored = s.store.get_job(&job.id).await.unwrap().unwrap();
        assert!(stored.attempts <= stored.max_attempts);
    }

    #[tokio::test]
    async fn terminal_error_fails_immediately() {
        let handler = Scripted::new(vec![Err(ValidationError::LowConfidence {
            confidence: 0.1,
            min: 0.5,
        }
        .into())]);
        let s = setup(5, handler);
        s.scheduler
            .schedule(JobType::ResolveMarket, fixtures::market_id(1), json!({}), fixtures::t0())
            .await
            .unwrap();

        let job = s.scheduler.run_next().await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 1);
    }

    #[tokio::test]
    async fn deferral_does_not_consume_attempts() {
        let until = fixtures::t0() + chrono::Duration::hours(1);
        let handler = Scripted::new(vec![Ok(JobOutcome::deferred(until, "dispute window open"))]);
        let s = setup(3, handler);
        s.scheduler
            .schedule(JobType::ResolveMarket, fixtures::market_id(1), json!({}), fixtures::t0())
            .await
            .unwrap();

        let job = s.scheduler.run_next().await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.scheduled_for, until);
    }

    #[tokio::test]
    async fn missing_handler_counts_as_failure() {
        let handler = Scripted::new(vec![]);
        let s = setup(3, handler);
        s.scheduler
            .schedule(JobType::FinalizeMarket, fixtures::market_id(1), json!({}), fixtures::t0())
            .await
            .unwrap();

        let job = s.scheduler.run_next().await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Retrying);
        assert!(job.last_error.unwrap().contains("no handler"));
    }

    #[tokio::test]
    async fn requeue_revives_failed_jobs_only() {
        let handler = Scripted::new(vec![
            Err(OracleError::TransactionFailed {
                kind: crate::domain::TxKind::Commit,
                hash: alloy_primitives::B256::ZERO,
            }
            .into()),
            Ok(JobOutcome::completed(json!(null))),
        ]);
        let s = setup(3, handler);
        let job = s
            .scheduler
            .schedule(JobType::ResolveMarket, fixtures::market_id(1), json!({}), fixtures::t0())
            .await
            .unwrap();
        s.scheduler.run_next().await.unwrap();

        let requeued = s.scheduler.requeue(&job.id).await.unwrap();
        assert_eq!(requeued.status, JobStatus::Pending);
        assert_eq!(requeued.attempts, 0);

        let done = s.scheduler.run_next().await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert!(matches!(
            s.scheduler.requeue(&job.id).await,
            Err(Error::NotReplayable { .. })
        ));
    }

    #[tokio::test]
    async fn schedule_unless_open_skips_duplicates() {
        let s = setup(3, Scripted::new(vec![]));
        let market = fixtures::market_id(1);
        let first = s
            .scheduler
            .schedule_unless_open(JobType::ResolveMarket, market, json!({}), fixtures::t0())
            .await
            .unwrap();
        let second = s
            .scheduler
            .schedule_unless_open(JobType::ResolveMarket, market, json!({}), fixtures::t0())
            .await
            .unwrap();
        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn counts_include_every_status() {
        let s = setup(3, Scripted::new(vec![]));
        s.scheduler
            .schedule(JobType::ResolveMarket, fixtures::market_id(1), json!({}), fixtures::t0())
            .await
            .unwrap();

        let counts = s.scheduler.counts().await.unwrap();
        assert_eq!(counts.len(), JobStatus::ALL.len());
        assert!(counts.contains(&(JobStatus::Pending, 1)));
        assert!(counts.contains(&(JobStatus::Failed, 0)));
    }

    #[tokio::test]
    async fn stale_processing_jobs_are_reported() {
        let s = setup(3, Scripted::new(vec![]));
        let mut job = s
            .scheduler
            .schedule(JobType::ResolveMarket, fixtures::market_id(1), json!({}), fixtures::t0())
            .await
            .unwrap();
        job.status = JobStatus::Processing;
        job.started_at = Some(fixtures::t0());
        s.store.update_job(&job).await.unwrap();

        assert!(s.scheduler.stale_jobs().await.unwrap().is_empty());
        s.clock.advance(chrono::Duration::seconds(901));
        assert_eq!(s.scheduler.stale_jobs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn workers_drain_queue_and_stop() {
        let handler = Scripted::new(
            (0..5)
                .map(|_| Ok(JobOutcome::completed(json!(null))))
                .collect(),
        );
        let mut s = setup(3, handler.clone());
        s.scheduler.config.poll_interval_ms = 5;
        for n in 0..5 {
            s.scheduler
                .schedule(JobType::ResolveMarket, fixtures::market_id(n), json!({}), fixtures::t0())
                .await
                .unwrap();
        }

        let scheduler = Arc::new(s.scheduler);
        let (tx, rx) = watch::channel(false);
        let handles = scheduler.clone().start(rx);
        for _ in 0..200 {
            if handler.calls() == 5 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tx.send(true).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(handler.calls(), 5);
        let counts = scheduler.counts().await.unwrap();
        assert!(counts.contains(&(JobStatus::Completed, 5)));
    }
}
