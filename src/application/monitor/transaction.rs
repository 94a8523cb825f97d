//! Receipt polling for in-flight oracle transactions.
//!
//! ```text
//! OracleClient ──submit──> tx hash ──track()──> TransactionMonitor
//!                                                   │ poll receipts
//!                      per-hash mpsc <──────────────┤
//!                      broadcast     <──────────────┘
//! ```
//!
//! A tracked hash produces exactly one final event (`Success`, `Failed`,
//! `Timeout`) or one `Retry`, after which it is no longer tracked; the owner
//! resubmits and tracks the replacement hash.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::application::oracle::{is_transaction_stuck, GasPolicy};
use crate::domain::{PendingTransaction, TxEvent, TxHash, TxReceipt};
use crate::error::Result;
use crate::port::{ChainReader, Clock};

/// Receipt polling and timeout settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Interval between receipt polls (milliseconds).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Time without a receipt before a transaction counts as timed out.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Gas-escalated resubmissions allowed per call.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fraction of the recommended gas price below which a transaction is stuck.
    #[serde(default = "default_stuck_threshold")]
    pub stuck_threshold: Decimal,
    /// Capacity of the observer broadcast channel.
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_timeout_secs() -> u64 {
    180
}

fn default_max_retries() -> u32 {
    3
}

fn default_stuck_threshold() -> Decimal {
    dec!(0.8)
}

fn default_broadcast_capacity() -> usize {
    256
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            stuck_threshold: default_stuck_threshold(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

impl MonitorConfig {
    /// Upper bound on how long an owner should wait for the next event of
    /// one hash.
    #[must_use]
    pub fn event_wait(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.saturating_mul(2))
            + Duration::from_millis(self.poll_interval_ms.saturating_mul(2))
    }
}

struct Tracked {
    tx: PendingTransaction,
    sender: mpsc::UnboundedSender<TxEvent>,
}

/// Tracks submitted transactions until they are mined, time out, or need a
/// gas-escalated retry.
pub struct TransactionMonitor {
    chain: Arc<dyn ChainReader>,
    clock: Arc<dyn Clock>,
    gas: GasPolicy,
    config: MonitorConfig,
    pending: DashMap<TxHash, Tracked>,
    events: broadcast::Sender<TxEvent>,
}

impl TransactionMonitor {
    pub fn new(
        chain: Arc<dyn ChainReader>,
        clock: Arc<dyn Clock>,
        gas: GasPolicy,
        config: MonitorConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.broadcast_capacity.max(1));
        Self {
            chain,
            clock,
            gas,
            config,
            pending: DashMap::new(),
            events,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Start tracking a transaction; events for its hash arrive on the
    /// returned receiver.
    pub fn track(&self, tx: PendingTransaction) -> mpsc::UnboundedReceiver<TxEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        debug!(tx = %tx.hash, market = %tx.market_id, kind = %tx.kind, attempts = tx.attempts, "Tracking transaction");
        self.pending.insert(tx.hash, Tracked { tx, sender });
        receiver
    }

    /// Stop tracking without emitting anything.
    pub fn untrack(&self, hash: &TxHash) -> bool {
        self.pending.remove(hash).is_some()
    }

    /// Observer stream of every event.
    pub fn subscribe(&self) -> broadcast::Receiver<TxEvent> {
        self.events.subscribe()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn pending(&self) -> Vec<PendingTransaction> {
        self.pending.iter().map(|entry| entry.tx.clone()).collect()
    }

    /// Gas price below the stuck threshold of the current recommendation.
    pub async fn is_transaction_stuck(&self, tx: &PendingTransaction) -> Result<bool> {
        let recommended = self.chain.gas_price().await?;
        Ok(is_transaction_stuck(
            tx.gas_price,
            recommended,
            self.config.stuck_threshold,
        ))
    }

    fn emit(&self, hash: &TxHash, event: TxEvent) {
        info!(tx = %hash, market = %event.tx().market_id, event = event.label(), "Transaction event");
        if let Some((_, tracked)) = self.pending.remove(hash) {
            let _ = tracked.sender.send(event.clone());
        }
        let _ = self.events.send(event);
    }

    /// Receipt for whichever broadcast of `tx` was mined. The newest hash is
    /// checked first, but a replaced one can still win the nonce.
    async fn mined_receipt(&self, tx: &PendingTransaction) -> Result<Option<TxReceipt>> {
        for hash in std::iter::once(&tx.hash).chain(tx.replaced.iter().rev()) {
            if let Some(receipt) = self.chain.receipt(hash).await? {
                return Ok(Some(receipt));
            }
        }
        Ok(None)
    }

    /// One polling pass over every tracked transaction.
    pub async fn poll_once(&self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let recommended = match self.chain.gas_price().await {
            Ok(price) => Some(price),
            Err(e) => {
                warn!(error = %e, "Gas price unavailable; stuck detection skipped");
                None
            }
        };
        let now = self.clock.now();
        let timeout = chrono::Duration::seconds(
            i64::try_from(self.config.timeout_secs).unwrap_or(i64::MAX),
        );

        for tx in self.pending() {
            let receipt = match self.mined_receipt(&tx).await {
                Ok(receipt) => receipt,
                Err(e) => {
                    warn!(tx = %tx.hash, error = %e, "Receipt lookup failed");
                    continue;
                }
            };

            if let Some(receipt) = receipt {
                let event = if receipt.success {
                    TxEvent::Success {
                        tx: tx.clone(),
                        receipt,
                    }
                } else {
                    TxEvent::Failed {
                        tx: tx.clone(),
                        receipt,
                    }
                };
                self.emit(&tx.hash, event);
                continue;
            }

            let timed_out = now - tx.submitted_at >= timeout;
            let stuck = recommended.is_some_and(|r| {
                is_transaction_stuck(tx.gas_price, r, self.config.stuck_threshold)
            });
            if !timed_out && !stuck {
                continue;
            }

            let escalated = (tx.attempts < self.config.max_retries)
                .then(|| {
                    self.gas
                        .escalate(tx.gas_price, recommended.unwrap_or_default(), tx.attempts)
                })
                .flatten();

            match escalated {
                Some(price) => {
                    debug!(tx = %tx.hash, timed_out, stuck, price = %price, "Escalating gas");
                    self.emit(
                        &tx.hash,
                        TxEvent::Retry {
                            tx: tx.clone(),
                            recommended_gas_price: price,
                        },
                    );
                }
                None if timed_out => {
                    self.emit(&tx.hash, TxEvent::Timeout { tx: tx.clone() });
                }
                None => {}
            }
        }
        Ok(())
    }

    /// Poll on the configured interval until shutdown is signalled.
    pub fn start(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms.max(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(pending = self.pending_count(), "Transaction monitor started");

            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        info!("Transaction monitor shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.poll_once().await {
                            warn!(error = %e, "Transaction poll failed");
                        }
                    }
                }
            }
        })
    }
}
