//! `MarketCreated` ingestion.
//!
//! Two entry points feed the same pipeline:
//!
//! - push: the webhook adapter decodes a payload and calls
//!   [`EventListener::handle_event`];
//! - pull: [`EventListener::poll_once`] queries logs for
//!   `(current_block, latest]`, after a one-off catch-up over the last
//!   `catchup_blocks` blocks.
//!
//! Both share one [`EventDeduplicator`], so a log delivered through both
//! paths yields one market and one `RESOLVE_MARKET` job.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::dedup::EventDeduplicator;
use crate::application::scheduler::JobQueue;
use crate::domain::{JobId, JobType, Market, MarketId, MarketParams, MarketStatus};
use crate::error::Result;
use crate::port::{ChainReader, Clock, Event, MarketCreatedEvent, Notifier, Store};

/// Log polling and dedup settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenerConfig {
    /// Interval between log polls (milliseconds).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Blocks scanned once at startup.
    #[serde(default = "default_catchup_blocks")]
    pub catchup_blocks: u64,
    /// Largest block span per log query.
    #[serde(default = "default_max_block_range")]
    pub max_block_range: u64,
    /// Event keys remembered for deduplication.
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
}

fn default_poll_interval_ms() -> u64 {
    12_000
}

fn default_catchup_blocks() -> u64 {
    5_000
}

fn default_max_block_range() -> u64 {
    2_000
}

fn default_dedup_capacity() -> usize {
    10_000
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            catchup_blocks: default_catchup_blocks(),
            max_block_range: default_max_block_range(),
            dedup_capacity: default_dedup_capacity(),
        }
    }
}

/// What became of one delivered event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Market persisted (or already known) and scheduled where needed.
    Ingested {
        market_id: MarketId,
        created: bool,
        job: Option<JobId>,
    },
    /// Same `txHash:logIndex` seen before.
    Duplicate,
    /// Emitted by a contract other than the configured factory.
    Foreign(Address),
    /// Parameters missing or invalid; dropped.
    Malformed(String),
    /// The market contract reports it is already resolved.
    AlreadyResolved(MarketId),
    /// State read failed transiently; a later pass may pick it up.
    Deferred(String),
}

impl IngestOutcome {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Ingested { .. } => "ingested",
            Self::Duplicate => "duplicate",
            Self::Foreign(_) => "foreign",
            Self::Malformed(_) => "malformed",
            Self::AlreadyResolved(_) => "already_resolved",
            Self::Deferred(_) => "deferred",
        }
    }
}

/// Converts `MarketCreated` events into markets and resolution jobs.
pub struct EventListener {
    chain: Arc<dyn ChainReader>,
    store: Arc<dyn Store>,
    jobs: JobQueue,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    factory: Address,
    config: ListenerConfig,
    dedup: EventDeduplicator,
    current_block: Mutex<Option<u64>>,
}

impl EventListener {
    pub fn new(
        chain: Arc<dyn ChainReader>,
        store: Arc<dyn Store>,
        jobs: JobQueue,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        factory: Address,
        config: ListenerConfig,
    ) -> Self {
        let dedup = EventDeduplicator::new(config.dedup_capacity);
        Self {
            chain,
            store,
            jobs,
            notifier,
            clock,
            factory,
            config,
            dedup,
            current_block: Mutex::new(None),
        }
    }

    /// Last block fully processed by the pull path.
    pub fn current_block(&self) -> Option<u64> {
        *self.current_block.lock()
    }

    pub fn factory(&self) -> Address {
        self.factory
    }

    /// Ingest one event from either path.
    ///
    /// Only store failures surface as errors; everything else is reported
    /// through [`IngestOutcome`].
    pub async fn handle_event(&self, event: MarketCreatedEvent) -> Result<IngestOutcome> {
        if event.contract_address != self.factory {
            warn!(contract = %event.contract_address, market = %event.market, "Ignoring event from foreign contract");
            return Ok(IngestOutcome::Foreign(event.contract_address));
        }

        let key = event.key();
        if !self.dedup.insert(&key) {
            debug!(event = %key, "Duplicate event");
            return Ok(IngestOutcome::Duplicate);
        }

        let params = match decode_params(&event.params) {
            Ok(params) => params,
            Err(reason) => {
                warn!(event = %key, market = %event.market, reason = %reason, "Dropping malformed event");
                return Ok(IngestOutcome::Malformed(reason));
            }
        };

        let state = match self.chain.market_state(&event.market).await {
            Ok(state) => state,
            Err(e) => {
                self.dedup.forget(&key);
                warn!(event = %key, market = %event.market, error = %e, "Market state read failed; skipping for this pass");
                return Ok(IngestOutcome::Deferred(e.to_string()));
            }
        };
        if state.resolved {
            info!(market = %event.market, "Market already resolved on-chain; skipping");
            return Ok(IngestOutcome::AlreadyResolved(event.market));
        }

        let now = self.clock.now();
        let mut market = Market::from_params(event.market, params, now);
        market.title = state.title;
        market.creator = format!("{:#x}", event.creator);
        market.market_type = event.market_type.clone();
        market.resolve_time = state.resolve_time;
        market.source_event = Some(key.clone());

        match self.persist(&market, &event).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.dedup.forget(&key);
                Err(e)
            }
        }
    }

    async fn persist(&self, market: &Market, event: &MarketCreatedEvent) -> Result<IngestOutcome> {
        let created = self.store.insert_market(market).await?;
        let status = if created {
            MarketStatus::Active
        } else {
            self.store
                .get_market(&market.id)
                .await?
                .map_or(MarketStatus::Active, |m| m.status)
        };

        let job = if status == MarketStatus::Active {
            let payload = json!({ "market": market.id, "event": event.key().as_str() });
            self.jobs
                .schedule_unless_open(JobType::ResolveMarket, market.id, payload, market.window.t_end)
                .await?
                .map(|job| job.id)
        } else {
            None
        };

        if created {
            info!(
                market = %market.id,
                subject = %market.subject,
                resolve_at = %market.window.t_end,
                block = event.block_number,
                "Market ingested"
            );
            self.notifier.notify(Event::MarketIngested {
                market_id: market.id,
                subject: market.subject.to_string(),
                resolve_at: market.window.t_end,
            });
        }

        Ok(IngestOutcome::Ingested {
            market_id: market.id,
            created,
            job,
        })
    }

    /// Scan the last `catchup_blocks` blocks once.
    pub async fn catch_up(&self) -> Result<usize> {
        let latest = self.chain.block_number().await?;
        let from = latest.saturating_sub(self.config.catchup_blocks);
        info!(from, to = latest, "Catching up on MarketCreated events");
        let processed = self.process_range(from, latest).await?;
        *self.current_block.lock() = Some(latest);
        Ok(processed)
    }

    /// Process `(current_block, latest]`; the first call performs catch-up.
    ///
    /// The cursor advances even when individual events fail; only a failed
    /// log query leaves it in place.
    pub async fn poll_once(&self) -> Result<usize> {
        let Some(current) = self.current_block() else {
            return self.catch_up().await;
        };
        let latest = self.chain.block_number().await?;
        if latest <= current {
            return Ok(0);
        }
        let processed = self.process_range(current + 1, latest).await?;
        *self.current_block.lock() = Some(latest);
        Ok(processed)
    }

    async fn process_range(&self, from: u64, to: u64) -> Result<usize> {
        let span = self.config.max_block_range.max(1);
        let mut processed = 0;
        let mut start = from;
        while start <= to {
            let end = start.saturating_add(span - 1).min(to);
            let events = self.chain.market_created_events(start, end).await?;
            debug!(from = start, to = end, events = events.len(), "Fetched MarketCreated logs");
            for event in events {
                let key = event.key();
                match self.handle_event(event).await {
                    Ok(outcome) => {
                        debug!(event = %key, outcome = outcome.label(), "Event processed");
                        processed += 1;
                    }
                    Err(e) => warn!(event = %key, error = %e, "Event ingestion failed"),
                }
            }
            if end == u64::MAX {
                break;
            }
            start = end + 1;
        }
        Ok(processed)
    }

    /// Catch up, then poll on the configured interval until shutdown.
    pub fn start(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = Duration::from_millis(self.config.poll_interval_ms.max(1));
            info!(factory = %self.factory, "Event listener started");
            loop {
                if let Err(e) = self.poll_once().await {
                    warn!(error = %e, "Log poll failed");
                }
                tokio::select! {
                    _ = shutdown.changed() => break,
                    () = tokio::time::sleep(period) => {}
                }
            }
            info!(block = ?self.current_block(), "Event listener stopped");
        })
    }
}

fn decode_params(raw: &serde_json::Value) -> std::result::Result<MarketParams, String> {
    let params: MarketParams =
        serde_json::from_value(raw.clone()).map_err(|e| format!("undecodable params: {e}"))?;
    params.validate().map_err(|e| e.to_string())?;
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::outbound::memory::MemoryStore;
    use crate::application::scheduler::{JobScheduler, SchedulerConfig};
    use crate::port::{JobStore, MarketChainState, MarketStore};
    use crate::testkit::{fixtures, FakeChain, ManualClock, RecordingNotifier};

    struct Setup {
        chain: Arc<FakeChain>,
        store: Arc<MemoryStore>,
        listener: EventListener,
    }

    fn setup() -> Setup {
        let clock = Arc::new(ManualClock::new(fixtures::t0() - chrono::Duration::days(1)));
        let chain = Arc::new(FakeChain::new(clock.clone()));
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let scheduler = JobScheduler::new(
            store.clone(),
            clock.clone(),
            notifier.clone(),
            SchedulerConfig::default(),
        );
        let config = ListenerConfig {
            catchup_blocks: 50,
            max_block_range: 10,
            ..ListenerConfig::default()
        };
        let listener = EventListener::new(
            chain.clone(),
            store.clone(),
            scheduler.queue(),
            notifier,
            clock,
            fixtures::factory_address(),
            config,
        );
        Setup {
            chain,
            store,
            listener,
        }
    }

    #[tokio::test]
    async fn new_event_persists_market_and_schedules_resolution() {
        let s = setup();
        let event = fixtures::created_event(1, 100, 0, &fixtures::params_gt(3_000));

        let outcome = s.listener.handle_event(event).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::Ingested { created: true, job: Some(_), .. }));

        let market = s.store.get_market(&fixtures::market_id(1)).await.unwrap().unwrap();
        assert_eq!(market.status, MarketStatus::Active);
        let jobs = s.store.all_jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_type, JobType::ResolveMarket);
        assert_eq!(jobs[0].scheduled_for, fixtures::t0());
    }

    #[tokio::test]
    async fn duplicate_delivery_is_a_no_op() {
        let s = setup();
        let event = fixtures::created_event(1, 100, 0, &fixtures::params_gt(3_000));

        s.listener.handle_event(event.clone()).await.unwrap();
        let again = s.listener.handle_event(event).await.unwrap();
        assert_eq!(again, IngestOutcome::Duplicate);
        assert_eq!(s.store.all_jobs().len(), 1);
    }

    #[tokio::test]
    async fn foreign_and_malformed_events_are_dropped() {
        let s = setup();
        let mut foreign = fixtures::created_event(1, 100, 0, &fixtures::params_gt(3_000));
        foreign.contract_address = Address::repeat_byte(0x01);
        assert!(matches!(
            s.listener.handle_event(foreign).await.unwrap(),
            IngestOutcome::Foreign(_)
        ));

        let mut malformed = fixtures::created_event(2, 100, 1, &fixtures::params_gt(3_000));
        malformed.params = json!({"subject": "nope"});
        assert!(matches!(
            s.listener.handle_event(malformed).await.unwrap(),
            IngestOutcome::Malformed(_)
        ));

        let good = fixtures::created_event(3, 100, 2, &fixtures::params_gt(3_000));
        assert!(matches!(
            s.listener.handle_event(good).await.unwrap(),
            IngestOutcome::Ingested { .. }
        ));
        assert_eq!(s.store.all_jobs().len(), 1);
    }

    #[tokio::test]
    async fn resolved_markets_are_skipped() {
        let s = setup();
        s.chain.set_market_state(
            &fixtures::market_id(1),
            MarketChainState {
                title: "done".into(),
                resolve_time: None,
                resolved: true,
            },
        );
        let event = fixtures::created_event(1, 100, 0, &fixtures::params_gt(3_000));

        let outcome = s.listener.handle_event(event).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::AlreadyResolved(_)));
        assert!(s.store.get_market(&fixtures::market_id(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn transient_state_read_failure_allows_later_retry() {
        let s = setup();
        s.chain.fail_market_state_reads(1);
        let event = fixtures::created_event(1, 100, 0, &fixtures::params_gt(3_000));

        let first = s.listener.handle_event(event.clone()).await.unwrap();
        assert!(matches!(first, IngestOutcome::Deferred(_)));
        let second = s.listener.handle_event(event).await.unwrap();
        assert!(matches!(second, IngestOutcome::Ingested { created: true, .. }));
    }

    #[tokio::test]
    async fn reingesting_known_market_keeps_single_open_job() {
        let s = setup();
        let params = fixtures::params_gt(3_000);
        s.listener
            .handle_event(fixtures::created_event(1, 100, 0, &params))
            .await
            .unwrap();
        // Same market, different log (e.g. replayed by another indexer).
        let mut replay = fixtures::created_event(1, 101, 5, &params);
        replay.transaction_hash = alloy_primitives::B256::repeat_byte(0x42);

        let outcome = s.listener.handle_event(replay).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::Ingested { created: false, job: None, .. }));
        assert!(s
            .store
            .has_open_job(&fixtures::market_id(1), JobType::ResolveMarket)
            .await
            .unwrap());
        assert_eq!(s.store.all_jobs().len(), 1);
    }

    #[tokio::test]
    async fn polling_catches_up_then_advances_in_chunks() {
        let s = setup();
        let params = fixtures::params_gt(3_000);
        s.chain.push_event(fixtures::created_event(1, 95, 0, &params));
        s.chain.set_block(120);

        assert_eq!(s.listener.poll_once().await.unwrap(), 1);
        assert_eq!(s.listener.current_block(), Some(120));

        s.chain.push_event(fixtures::created_event(2, 125, 0, &params));
        s.chain.push_event(fixtures::created_event(3, 140, 0, &params));
        assert_eq!(s.listener.poll_once().await.unwrap(), 2);
        assert_eq!(s.listener.current_block(), Some(140));
        assert_eq!(s.store.all_jobs().len(), 3);
    }

    #[tokio::test]
    async fn cursor_advances_past_failed_events() {
        let s = setup();
        s.listener.catch_up().await.unwrap();
        let params = fixtures::params_gt(3_000);
        s.chain.push_event(fixtures::created_event(1, 130, 0, &params));
        s.chain.fail_market_state_reads(1);

        s.listener.poll_once().await.unwrap();
        assert_eq!(s.listener.current_block(), Some(130));
        assert!(s.store.get_market(&fixtures::market_id(1)).await.unwrap().is_none());

        s.listener.catch_up().await.unwrap();
        assert!(s.store.get_market(&fixtures::market_id(1)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn failed_log_query_keeps_cursor() {
        let s = setup();
        s.listener.catch_up().await.unwrap();
        let before = s.listener.current_block();
        s.chain.set_rpc_down(true);
        assert!(s.listener.poll_once().await.is_err());
        assert_eq!(s.listener.current_block(), before);
    }
}
