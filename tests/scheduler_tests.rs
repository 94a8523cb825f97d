//! Durable job scheduling against SQLite.

mod harness;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use oracled::application::scheduler::{JobHandler, JobOutcome, JobScheduler, SchedulerConfig};
use oracled::domain::{Job, JobId, JobStatus, JobType};
use oracled::error::{Error, Result};
use oracled::port::{Clock, Event};
use oracled::testkit::{fixtures, ManualClock, RecordingNotifier};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::watch;

use harness::temp_db::TempDb;

/// Counts executions per job; fails the first `failures` calls.
#[derive(Default)]
struct CountingHandler {
    seen: Mutex<HashMap<JobId, usize>>,
    failures: Mutex<usize>,
}

impl CountingHandler {
    fn failing(failures: usize) -> Self {
        Self {
            failures: Mutex::new(failures),
            ..Self::default()
        }
    }

    fn executions(&self) -> usize {
        self.seen.lock().values().sum()
    }

    fn max_per_job(&self) -> usize {
        self.seen.lock().values().copied().max().unwrap_or(0)
    }
}

#[async_trait]
impl JobHandler for CountingHandler {
    async fn handle(&self, job: &Job) -> Result<JobOutcome> {
        *self.seen.lock().entry(job.id).or_default() += 1;
        {
            let mut failures = self.failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(Error::Connection("rpc unavailable".into()));
            }
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
        Ok(JobOutcome::completed(json!({ "ok": true })))
    }
}

struct Fixture {
    _db: TempDb,
    clock: Arc<ManualClock>,
    notifier: RecordingNotifier,
    handler: Arc<CountingHandler>,
    scheduler: Arc<JobScheduler>,
}

fn fixture(config: SchedulerConfig, handler: CountingHandler) -> Fixture {
    let db = TempDb::create();
    let clock = Arc::new(ManualClock::new(fixtures::t0()));
    let notifier = RecordingNotifier::new();
    let handler = Arc::new(handler);

    let mut scheduler = JobScheduler::new(
        db.store(),
        clock.clone(),
        Arc::new(notifier.clone()),
        config,
    );
    scheduler.register(JobType::ResolveMarket, handler.clone());

    Fixture {
        _db: db,
        clock,
        notifier,
        handler,
        scheduler: Arc::new(scheduler),
    }
}

fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        workers: 4,
        poll_interval_ms: 5,
        max_attempts: 3,
        base_backoff_secs: 10,
        max_backoff_secs: 30,
        ..SchedulerConfig::default()
    }
}

async fn schedule(f: &Fixture, n: u64) -> Job {
    f.scheduler
        .schedule(
            JobType::ResolveMarket,
            fixtures::market_id(n),
            json!({ "n": n }),
            f.clock.now(),
        )
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn worker_pool_runs_every_job_exactly_once() {
    let f = fixture(fast_config(), CountingHandler::default());
    for n in 0..20 {
        schedule(&f, n).await;
    }

    let (shutdown, rx) = watch::channel(false);
    let handles = f.scheduler.clone().start(rx);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let completed = f
            .scheduler
            .list(Some(JobStatus::Completed), 100)
            .await
            .unwrap()
            .len();
        if completed == 20 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "only {completed} of 20 jobs completed"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    shutdown.send(true).unwrap();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(f.handler.executions(), 20);
    assert_eq!(f.handler.max_per_job(), 1);
}

#[tokio::test]
async fn exhausted_retries_fail_the_job_and_replay_revives_it() {
    let f = fixture(fast_config(), CountingHandler::failing(3));
    let job = schedule(&f, 1).await;

    let first = f.scheduler.run_next().await.unwrap().unwrap();
    assert_eq!(first.status, JobStatus::Retrying);
    // 10 * 2^1
    assert_eq!(first.scheduled_for, f.clock.now() + ChronoDuration::seconds(20));

    f.clock.advance(ChronoDuration::seconds(20));
    let second = f.scheduler.run_next().await.unwrap().unwrap();
    assert_eq!(second.status, JobStatus::Retrying);
    // 10 * 2^2 capped at 30
    assert_eq!(second.scheduled_for, f.clock.now() + ChronoDuration::seconds(30));

    f.clock.advance(ChronoDuration::seconds(30));
    let third = f.scheduler.run_next().await.unwrap().unwrap();
    assert_eq!(third.status, JobStatus::Failed);
    assert_eq!(third.attempts, 3);
    assert_eq!(
        f.notifier.count(|e| matches!(e, Event::JobFailed(_))),
        1
    );

    let replayed = f.scheduler.requeue(&job.id).await.unwrap();
    assert_eq!(replayed.status, JobStatus::Pending);
    assert_eq!(replayed.attempts, 0);
    assert!(replayed.last_error.is_none());

    let done = f.scheduler.run_next().await.unwrap().unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(f.handler.executions(), 4);
}

#[tokio::test]
async fn replay_refuses_open_jobs() {
    let f = fixture(fast_config(), CountingHandler::default());
    let job = schedule(&f, 1).await;

    let err = f.scheduler.requeue(&job.id).await.unwrap_err();
    assert!(matches!(err, Error::NotReplayable { .. }));

    let err = f.scheduler.requeue(&JobId::generate()).await.unwrap_err();
    assert!(matches!(err, Error::JobNotFound(_)));
}

#[tokio::test]
async fn future_jobs_wait_for_their_time() {
    let f = fixture(fast_config(), CountingHandler::default());
    f.scheduler
        .schedule(
            JobType::ResolveMarket,
            fixtures::market_id(1),
            json!({}),
            f.clock.now() + ChronoDuration::hours(1),
        )
        .await
        .unwrap();

    assert!(f.scheduler.run_next().await.unwrap().is_none());
    f.clock.advance(ChronoDuration::hours(1));
    assert!(f.scheduler.run_next().await.unwrap().is_some());
}

#[tokio::test]
async fn counts_cover_every_status() {
    let f = fixture(fast_config(), CountingHandler::default());
    schedule(&f, 1).await;
    schedule(&f, 2).await;
    f.scheduler.run_next().await.unwrap();

    let counts = f.scheduler.counts().await.unwrap();
    assert_eq!(counts.len(), JobStatus::ALL.len());
    let count = |status: JobStatus| {
        counts
            .iter()
            .find(|(s, _)| *s == status)
            .map(|(_, n)| *n)
            .unwrap()
    };
    assert_eq!(count(JobStatus::Pending), 1);
    assert_eq!(count(JobStatus::Completed), 1);
    assert_eq!(count(JobStatus::Failed), 0);
}

#[tokio::test]
async fn sweep_prunes_finished_jobs_past_retention() {
    let config = SchedulerConfig {
        retention_days: 1,
        ..fast_config()
    };
    let f = fixture(config, CountingHandler::default());
    schedule(&f, 1).await;
    f.scheduler.run_next().await.unwrap();
    schedule(&f, 2).await;

    f.clock.advance(ChronoDuration::days(2));
    f.scheduler.sweep().await.unwrap();

    let remaining = f.scheduler.list(None, 10).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].status, JobStatus::Pending);
}
