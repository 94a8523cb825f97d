use std::sync::Arc;

use oracled::application::metric::MetricFetcherRegistry;
use oracled::infrastructure::bootstrap::{Adapters, Services};
use oracled::infrastructure::config::Config;
use oracled::testkit::{fixtures, FakeChain, ManualClock, RecordingNotifier, ScriptedFetcher};
use tokio::sync::watch;

use super::temp_db::TempDb;

/// Fully assembled services over a temporary SQLite database and
/// in-process chain, clock and data source.
pub struct Engine {
    pub db: TempDb,
    pub clock: Arc<ManualClock>,
    pub chain: Arc<FakeChain>,
    pub pyth: Arc<ScriptedFetcher>,
    pub notifier: RecordingNotifier,
    pub services: Services,
    _shutdown: watch::Sender<bool>,
}

impl Engine {
    /// Engine whose clock starts one day before the fixtures' resolution time.
    pub fn start() -> Self {
        let db = TempDb::create();
        let clock = Arc::new(ManualClock::new(fixtures::t0() - chrono::Duration::days(1)));
        let chain = Arc::new(FakeChain::new(clock.clone()));
        let pyth = Arc::new(ScriptedFetcher::new("pyth"));
        let notifier = RecordingNotifier::new();

        let mut registry = MetricFetcherRegistry::new();
        registry.register(pyth.clone());

        let mut config = Config::default();
        config.chain.factory_address = fixtures::factory_address();
        config.monitor.poll_interval_ms = 5;

        let services = Services::assemble(
            &config,
            Adapters {
                store: db.store(),
                chain: chain.clone(),
                contract: chain.clone(),
                registry,
                notifier: Arc::new(notifier.clone()),
                clock: clock.clone(),
            },
        );

        // Commits and finalizations wait on receipts observed by the monitor.
        let (shutdown, rx) = watch::channel(false);
        services.transactions.clone().start(rx);

        Self {
            db,
            clock,
            chain,
            pyth,
            notifier,
            services,
            _shutdown: shutdown,
        }
    }
}
