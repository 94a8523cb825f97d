//! Queue and resolution state survive a restart of the service graph.

mod harness;

use std::sync::Arc;

use chrono::Duration;
use oracled::application::metric::MetricFetcherRegistry;
use oracled::domain::{Job, JobStatus, JobType, MarketStatus};
use oracled::infrastructure::bootstrap::{open_store, Adapters, Services};
use oracled::infrastructure::config::{Config, DatabaseConfig};
use oracled::port::{JobStore, MarketStore, MetricAuditStore, ResolutionStore};
use oracled::testkit::{fixtures, RecordingNotifier, ScriptedFetcher};
use serde_json::json;
use tokio::sync::watch;

use harness::engine::Engine;

#[tokio::test]
async fn finalization_resumes_after_restart() {
    let engine = Engine::start();
    engine
        .chain
        .push_event(fixtures::created_event(1, 100, 0, &fixtures::params_gt(3_000)));
    engine.services.listener.poll_once().await.unwrap();
    engine.clock.set(fixtures::t0() + Duration::minutes(1));
    engine.pyth.push_ok(fixtures::eth_price(3_500, 0.99));
    engine.services.scheduler.run_next().await.unwrap();

    // Second process over the same database file.
    let store = open_store(&DatabaseConfig {
        url: engine.db.path().to_string_lossy().into_owned(),
    })
    .unwrap();
    let mut registry = MetricFetcherRegistry::new();
    registry.register(Arc::new(ScriptedFetcher::new("pyth")));
    let mut config = Config::default();
    config.chain.factory_address = fixtures::factory_address();
    config.monitor.poll_interval_ms = 5;
    let restarted = Services::assemble(
        &config,
        Adapters {
            store,
            chain: engine.chain.clone(),
            contract: engine.chain.clone(),
            registry,
            notifier: Arc::new(RecordingNotifier::new()),
            clock: engine.clock.clone(),
        },
    );
    let (_shutdown, rx) = watch::channel(false);
    restarted.transactions.clone().start(rx);

    let id = fixtures::market_id(1);
    let pending = restarted
        .scheduler
        .list(Some(JobStatus::Pending), 10)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].job_type, JobType::FinalizeMarket);

    engine.clock.advance(Duration::minutes(61));
    let job = restarted.scheduler.run_next().await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    let market = restarted.store.get_market(&id).await.unwrap().unwrap();
    assert_eq!(market.status, MarketStatus::Resolved);
    let resolution = restarted.store.get_resolution(&id).await.unwrap().unwrap();
    assert!(resolution.is_finalized());
    assert_eq!(
        restarted.store.metrics_for_market(&id).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn reconciler_schedules_jobs_for_orphaned_markets() {
    let engine = Engine::start();
    let store = &engine.services.store;

    let mut committed = fixtures::market(1);
    committed.status = MarketStatus::Committed;
    store.insert_market(&committed).await.unwrap();
    store.insert_market(&fixtures::market(2)).await.unwrap();
    engine.clock.set(fixtures::t0() + Duration::hours(2));

    let report = engine.services.reconciler.run_once().await.unwrap();
    assert_eq!(report.resolve_scheduled, 1);
    assert_eq!(report.finalize_scheduled, 1);

    let again = engine.services.reconciler.run_once().await.unwrap();
    assert_eq!(again.resolve_scheduled + again.finalize_scheduled, 0);

    let jobs = engine.services.scheduler.list(None, 10).await.unwrap();
    assert_eq!(jobs.len(), 2);
    let finalize = jobs
        .iter()
        .find(|j| j.job_type == JobType::FinalizeMarket)
        .unwrap();
    assert_eq!(finalize.market_id, fixtures::market_id(1));
}

#[tokio::test]
async fn reconciler_leaves_terminally_failed_markets_to_the_operator() {
    let engine = Engine::start();
    let store = &engine.services.store;
    let market = fixtures::market(1);
    store.insert_market(&market).await.unwrap();
    engine.clock.set(fixtures::t0() + Duration::hours(2));

    let mut job = Job::new(
        JobType::ResolveMarket,
        market.id,
        json!({ "market": market.id }),
        fixtures::t0(),
        5,
        fixtures::t0(),
    );
    job.status = JobStatus::Failed;
    job.attempts = 5;
    job.last_error = Some("transaction reverted".into());
    store.insert_job(&job).await.unwrap();

    for _ in 0..3 {
        let report = engine.services.reconciler.run_once().await.unwrap();
        assert_eq!(report.resolve_scheduled, 0);
    }
    let jobs = engine.services.scheduler.list(None, 10).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Failed);

    let replayed = engine.services.scheduler.requeue(&job.id).await.unwrap();
    assert_eq!(replayed.status, JobStatus::Pending);
    let report = engine.services.reconciler.run_once().await.unwrap();
    assert_eq!(report.resolve_scheduled, 0);
}
