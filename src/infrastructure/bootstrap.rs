//! Composition root: builds the service graph from a [`Config`].
//!
//! [`Services::assemble`] takes already-built adapters so tests can wire
//! in-process fakes; [`connect`] builds the production adapters first.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::adapter::inbound::webhook::WebhookIngress;
use crate::adapter::outbound::fetcher::HttpMetricFetcher;
use crate::adapter::outbound::notifier::WebhookNotifier;
use crate::adapter::outbound::sqlite::{create_pool, run_migrations, SqliteStore};
use crate::application::health::{AlertManager, HealthMonitor};
use crate::application::ingest::EventListener;
use crate::application::metric::{MetricDataValidator, MetricFetcherRegistry, ResilientFetcher};
use crate::application::monitor::TransactionMonitor;
use crate::application::oracle::{GasPolicy, OracleClient};
use crate::application::resolution::{
    FinalizeMarketHandler, MarketProcessor, Reconciler, ResolveMarketHandler,
};
use crate::application::scheduler::JobScheduler;
use crate::domain::JobType;
use crate::error::Result;
use crate::infrastructure::config::{AlertsConfig, Config, DatabaseConfig, FetcherConfig};
use crate::port::{
    ChainReader, Clock, LogNotifier, Notifier, NotifierRegistry, OracleContract, Store,
};

/// Adapters the services are built on.
pub struct Adapters {
    pub store: Arc<dyn Store>,
    pub chain: Arc<dyn ChainReader>,
    pub contract: Arc<dyn OracleContract>,
    pub registry: MetricFetcherRegistry,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
}

/// The wired application.
pub struct Services {
    pub store: Arc<dyn Store>,
    pub chain: Arc<dyn ChainReader>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub registry: Arc<MetricFetcherRegistry>,
    pub oracle: Arc<OracleClient>,
    pub transactions: Arc<TransactionMonitor>,
    pub scheduler: Arc<JobScheduler>,
    pub processor: Arc<MarketProcessor>,
    pub listener: Arc<EventListener>,
    pub reconciler: Arc<Reconciler>,
    pub health: Arc<HealthMonitor>,
    pub alerts: Arc<AlertManager>,
}

impl Services {
    /// Wire every service and register the job handlers.
    pub fn assemble(config: &Config, adapters: Adapters) -> Self {
        let Adapters {
            store,
            chain,
            contract,
            registry,
            notifier,
            clock,
        } = adapters;
        let registry = Arc::new(registry);
        let gas = GasPolicy::new(config.gas.clone());

        let oracle = Arc::new(OracleClient::new(
            contract,
            Arc::clone(&chain),
            Arc::clone(&clock),
            gas.clone(),
        ));
        let transactions = Arc::new(TransactionMonitor::new(
            Arc::clone(&chain),
            Arc::clone(&clock),
            gas,
            config.monitor.clone(),
        ));

        let mut scheduler = JobScheduler::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            Arc::clone(&notifier),
            config.scheduler.clone(),
        );
        let jobs = scheduler.queue();

        let processor = Arc::new(MarketProcessor::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            MetricDataValidator::new(config.validation.clone()),
            Arc::clone(&oracle),
            Arc::clone(&transactions),
            jobs.clone(),
            Arc::clone(&notifier),
            Arc::clone(&clock),
        ));
        scheduler.register(
            JobType::ResolveMarket,
            Arc::new(ResolveMarketHandler::new(Arc::clone(&processor))),
        );
        scheduler.register(
            JobType::FinalizeMarket,
            Arc::new(FinalizeMarketHandler::new(Arc::clone(&processor))),
        );
        let scheduler = Arc::new(scheduler);

        let listener = Arc::new(EventListener::new(
            Arc::clone(&chain),
            Arc::clone(&store),
            jobs.clone(),
            Arc::clone(&notifier),
            Arc::clone(&clock),
            config.chain.factory_address,
            config.listener.clone(),
        ));
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&store),
            jobs,
            Arc::clone(&oracle),
            Arc::clone(&clock),
            Duration::from_secs(config.scheduler.sweep_interval_secs.max(1)),
        ));

        let health = Arc::new(HealthMonitor::new(
            Arc::clone(&store),
            Arc::clone(&chain),
            Arc::clone(&oracle),
            Arc::clone(&transactions),
            Arc::clone(&registry),
            Arc::clone(&scheduler),
            Arc::clone(&clock),
            config.health.clone(),
        ));
        let alerts = Arc::new(AlertManager::new(
            Arc::clone(&notifier),
            Arc::clone(&clock),
            config.alerts.rules.clone(),
        ));

        Self {
            store,
            chain,
            notifier,
            clock,
            registry,
            oracle,
            transactions,
            scheduler,
            processor,
            listener,
            reconciler,
            health,
            alerts,
        }
    }

    /// Push-path entry point sharing the listener's dedup state.
    pub fn webhook(&self) -> WebhookIngress {
        WebhookIngress::new(Arc::clone(&self.listener))
    }
}

/// Open the SQLite pool and apply pending migrations.
pub fn open_store(config: &DatabaseConfig) -> Result<Arc<SqliteStore>> {
    let pool = create_pool(&config.url)?;
    run_migrations(&pool)?;
    info!(database = %config.url, "Database initialized");
    Ok(Arc::new(SqliteStore::new(pool)))
}

/// One resilient HTTP fetcher per `[[fetchers]]` entry, in file order.
pub fn build_fetcher_registry(fetchers: &[FetcherConfig]) -> Result<MetricFetcherRegistry> {
    let mut registry = MetricFetcherRegistry::new();
    for config in fetchers {
        let fetcher = HttpMetricFetcher::new(config)?;
        registry.register(Arc::new(ResilientFetcher::new(
            fetcher,
            config.resilience.clone(),
        )));
    }
    info!(fetchers = ?registry.ids(), "Metric fetchers registered");
    Ok(registry)
}

/// Log notifier plus whichever alert channels are configured.
pub fn build_notifier_registry(config: &AlertsConfig) -> Result<NotifierRegistry> {
    let mut registry = NotifierRegistry::new();
    registry.register(Box::new(LogNotifier));

    if let Some(url) = config.webhook_url.as_deref() {
        registry.register(Box::new(WebhookNotifier::new(url)?));
        info!("Webhook notifier enabled");
    }

    if config.telegram.enabled {
        register_telegram(&mut registry, config);
    }
    Ok(registry)
}

#[cfg(feature = "telegram")]
fn register_telegram(registry: &mut NotifierRegistry, config: &AlertsConfig) {
    use crate::adapter::outbound::notifier::telegram::{TelegramNotifier, TelegramSettings};
    use crate::infrastructure::config::settings::TELEGRAM_TOKEN_ENV;

    match (config.telegram.token.clone(), config.telegram.chat_id) {
        (Some(bot_token), Some(chat_id)) => {
            registry.register(Box::new(TelegramNotifier::new(TelegramSettings {
                bot_token,
                chat_id,
            })));
            info!(chat_id, "Telegram notifier enabled");
        }
        _ => warn!("Telegram enabled but {TELEGRAM_TOKEN_ENV} or chat_id not set"),
    }
}

#[cfg(not(feature = "telegram"))]
fn register_telegram(_registry: &mut NotifierRegistry, _config: &AlertsConfig) {
    warn!("Telegram enabled but this build lacks the telegram feature");
}

/// Build production adapters and assemble the services.
#[cfg(feature = "evm")]
pub async fn connect(config: &Config) -> Result<Services> {
    use crate::adapter::outbound::evm::EvmChain;
    use crate::port::SystemClock;

    let store = open_store(&config.database)?;
    let chain = Arc::new(EvmChain::connect(&config.chain)?);
    chain.verify_chain_id().await?;
    match chain.signer_address() {
        Some(signer) => info!(signer = %signer, "Oracle signer loaded"),
        None => warn!("No signer key configured; commits and finalizations will fail"),
    }

    let registry = build_fetcher_registry(&config.fetchers)?;
    let notifier = build_notifier_registry(&config.alerts)?;
    info!(notifiers = notifier.len(), "Notifiers initialized");

    Ok(Services::assemble(
        config,
        Adapters {
            store,
            chain: chain.clone(),
            contract: chain,
            registry,
            notifier: Arc::new(notifier),
            clock: Arc::new(SystemClock),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::outbound::memory::MemoryStore;
    use crate::infrastructure::config::TelegramConfig;
    use crate::testkit::{fixtures, FakeChain, ManualClock, RecordingNotifier, ScriptedFetcher};

    #[tokio::test]
    async fn notifier_registry_counts_configured_channels() {
        let registry = build_notifier_registry(&AlertsConfig::default()).unwrap();
        assert_eq!(registry.len(), 1);

        let config = AlertsConfig {
            webhook_url: Some("http://127.0.0.1:9/hook".into()),
            ..AlertsConfig::default()
        };
        assert_eq!(build_notifier_registry(&config).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn telegram_without_token_is_skipped() {
        let config = AlertsConfig {
            telegram: TelegramConfig {
                enabled: true,
                chat_id: Some(42),
                token: None,
            },
            ..AlertsConfig::default()
        };
        assert_eq!(build_notifier_registry(&config).unwrap().len(), 1);
    }

    #[test]
    fn invalid_webhook_url_is_rejected() {
        let config = AlertsConfig {
            webhook_url: Some("not a url".into()),
            ..AlertsConfig::default()
        };
        assert!(build_notifier_registry(&config).is_err());
    }

    #[test]
    fn file_backed_store_is_migrated() {
        let dir = tempfile::tempdir().unwrap();
        let url = dir.path().join("oracled.db");
        let config = DatabaseConfig {
            url: url.to_string_lossy().into_owned(),
        };
        open_store(&config).unwrap();
        assert!(url.exists());
    }

    #[tokio::test]
    async fn assembled_services_share_the_queue() {
        let clock = Arc::new(ManualClock::new(fixtures::t0() - chrono::Duration::days(1)));
        let chain = Arc::new(FakeChain::new(clock.clone()));
        let store = Arc::new(MemoryStore::new());
        let mut registry = MetricFetcherRegistry::new();
        registry.register(Arc::new(ScriptedFetcher::new("pyth")));

        let mut config = Config::default();
        config.chain.factory_address = fixtures::factory_address();
        let services = Services::assemble(
            &config,
            Adapters {
                store: store.clone(),
                chain: chain.clone(),
                contract: chain,
                registry,
                notifier: Arc::new(RecordingNotifier::new()),
                clock,
            },
        );

        let event = fixtures::created_event(1, 10, 0, &fixtures::params_gt(3_000));
        services.listener.handle_event(event).await.unwrap();
        let pending = services.scheduler.list(None, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].job_type, JobType::ResolveMarket);
    }
}
