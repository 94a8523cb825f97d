//! Background task lifecycle.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::infrastructure::bootstrap::Services;

/// Owns the spawned service loops and the shutdown signal they watch.
pub struct RuntimeHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl RuntimeHandle {
    /// Spawn the scheduler workers, log listener, transaction monitor,
    /// reconciler and health monitor.
    pub fn start(services: &Services) -> Self {
        let (shutdown, rx) = watch::channel(false);
        let mut tasks = services.scheduler.clone().start(rx.clone());
        tasks.push(services.listener.clone().start(rx.clone()));
        tasks.push(services.transactions.clone().start(rx.clone()));
        tasks.push(services.reconciler.clone().start(rx.clone()));
        tasks.push(services.health.clone().start(services.alerts.clone(), rx));
        Self { shutdown, tasks }
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Signal shutdown and wait for every loop to exit. Scheduler workers
    /// finish their in-flight job first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        info!("All background tasks stopped");
    }
}

/// Run the services until `shutdown` flips to `true` or its sender drops.
pub async fn serve(services: &Services, mut shutdown: watch::Receiver<bool>) {
    let handle = RuntimeHandle::start(services);
    info!(tasks = handle.task_count(), "oracled running");

    loop {
        match shutdown.changed().await {
            Ok(()) => {
                if *shutdown.borrow() {
                    info!("Shutdown signal received");
                    break;
                }
            }
            Err(_) => {
                info!("Shutdown channel closed");
                break;
            }
        }
    }

    handle.shutdown().await;
}

/// Connect to the configured chain and run until Ctrl-C.
#[cfg(feature = "evm")]
pub async fn run(config: &crate::infrastructure::config::Config) -> crate::error::Result<()> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(true);
        }
    });
    run_with_shutdown(config, rx).await
}

/// Connect to the configured chain and run until `shutdown` fires.
#[cfg(feature = "evm")]
pub async fn run_with_shutdown(
    config: &crate::infrastructure::config::Config,
    shutdown: watch::Receiver<bool>,
) -> crate::error::Result<()> {
    info!(
        chain_id = config.chain.chain_id,
        oracle = %config.chain.oracle_address,
        factory = %config.chain.factory_address,
        "Starting oracled"
    );
    let services = crate::infrastructure::bootstrap::connect(config).await?;
    serve(&services, shutdown).await;
    info!("oracled stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::adapter::outbound::memory::MemoryStore;
    use crate::application::metric::MetricFetcherRegistry;
    use crate::infrastructure::bootstrap::Adapters;
    use crate::infrastructure::config::Config;
    use crate::testkit::{fixtures, FakeChain, ManualClock, RecordingNotifier};

    fn services() -> Services {
        let clock = Arc::new(ManualClock::new(fixtures::t0()));
        let chain = Arc::new(FakeChain::new(clock.clone()));
        let mut config = Config::default();
        config.chain.factory_address = fixtures::factory_address();
        config.scheduler.workers = 2;
        Services::assemble(
            &config,
            Adapters {
                store: Arc::new(MemoryStore::new()),
                chain: chain.clone(),
                contract: chain,
                registry: MetricFetcherRegistry::new(),
                notifier: Arc::new(RecordingNotifier::new()),
                clock,
            },
        )
    }

    #[tokio::test]
    async fn handle_spawns_every_loop_and_drains() {
        let services = services();
        let handle = RuntimeHandle::start(&services);
        // two workers, the sweep, and four service loops
        assert_eq!(handle.task_count(), 7);
        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn serve_returns_on_signal() {
        let services = services();
        let (tx, rx) = watch::channel(false);
        let stop = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            tx.send(true).unwrap();
        });
        tokio::time::timeout(Duration::from_secs(5), serve(&services, rx))
            .await
            .unwrap();
        stop.await.unwrap();
    }
}
