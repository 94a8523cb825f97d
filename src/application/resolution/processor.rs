//! Resolution state machine: `ACTIVE -> COMMITTED -> RESOLVED`.
//!
//! ```text
//! RESOLVE_MARKET job
//!   guard (exists, ACTIVE, past t_end, nothing on-chain yet)
//!   fetch -> validate -> round -> audit -> evaluate predicate
//!   save Resolution -> commit -> await TxEvent -> COMMITTED
//!   schedule FINALIZE_MARKET at commit_time + dispute_window
//!
//! FINALIZE_MARKET job
//!   guard (Resolution exists, committed on-chain, window elapsed)
//!   finalize -> await TxEvent -> RESOLVED
//! ```
//!
//! Every step is safe to repeat: an on-chain commitment found by the guard
//! is adopted instead of committing again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::application::metric::{
    aggregate_metric_values, apply_rounding, evaluate_predicate, MetricDataValidator,
    MetricFetcherRegistry,
};
use crate::application::monitor::TransactionMonitor;
use crate::application::oracle::{OracleClient, Submission};
use crate::application::scheduler::JobQueue;
use crate::domain::{
    JobType, Market, MarketId, MarketStatus, MetricRecord, MetricValue, Outcome, PendingTransaction,
    Resolution, TxEvent, TxHash, TxKind,
};
use crate::error::{Error, OracleError, Result, ValidationError};
use crate::port::{
    Clock, CommitEvent, Event, Notifier, OnChainCommitment, Store, TransactionEvent,
};

/// Result of one processing step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ProcessOutcome {
    /// Outcome committed on-chain.
    Committed {
        outcome: Outcome,
        tx_hash: TxHash,
        finalize_at: DateTime<Utc>,
    },
    /// Outcome finalized on-chain.
    Finalized { outcome: Outcome, tx_hash: TxHash },
    /// On-chain state was ahead of the store and has been adopted.
    Recovered { status: MarketStatus },
    /// Not actionable before `until`.
    NotDue { until: DateTime<Utc> },
    /// Guard tripped; nothing to do.
    Skipped { reason: String },
}

impl ProcessOutcome {
    fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }
}

/// How a tracked oracle call ended up on-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Confirmation {
    /// One of our broadcasts mined with status 1.
    Mined(TxHash),
    /// The call's effect is on-chain but none of our hashes carried it.
    LandedElsewhere,
}

/// Drives markets through resolution.
pub struct MarketProcessor {
    store: Arc<dyn Store>,
    registry: Arc<MetricFetcherRegistry>,
    validator: MetricDataValidator,
    oracle: Arc<OracleClient>,
    monitor: Arc<TransactionMonitor>,
    jobs: JobQueue,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl MarketProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<MetricFetcherRegistry>,
        validator: MetricDataValidator,
        oracle: Arc<OracleClient>,
        monitor: Arc<TransactionMonitor>,
        jobs: JobQueue,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            registry,
            validator,
            oracle,
            monitor,
            jobs,
            notifier,
            clock,
        }
    }

    async fn load(&self, id: &MarketId) -> Result<Market> {
        self.store
            .get_market(id)
            .await?
            .ok_or(Error::MarketNotFound(*id))
    }

    /// Resolve a market and commit its outcome.
    pub async fn process_market_resolution(&self, id: &MarketId) -> Result<ProcessOutcome> {
        let market = self.load(id).await?;
        match market.status {
            MarketStatus::Active => {}
            MarketStatus::Committed => {
                let commitment = self.oracle.pending(id).await?;
                self.ensure_finalize_job(id, &commitment).await?;
                return Ok(ProcessOutcome::skipped("already committed"));
            }
            status => return Ok(ProcessOutcome::skipped(format!("market is {status}"))),
        }

        let now = self.clock.now();
        if !market.is_due(now) {
            debug!(market = %id, t_end = %market.window.t_end, "Market not due yet");
            return Ok(ProcessOutcome::NotDue {
                until: market.window.t_end,
            });
        }

        let commitment = self.oracle.pending(id).await?;
        if let Some(recovered) = self.adopt_chain_state(id, &commitment).await? {
            return Ok(recovered);
        }

        let metric = self.resolve_value(&market).await?;
        let outcome = Outcome::from_predicate(evaluate_predicate(&metric, &market.predicate));
        info!(
            market = %id,
            value = %metric.display_value(),
            source = %metric.source,
            predicate = %market.predicate.op,
            outcome = %outcome,
            "Outcome decided"
        );

        let mut resolution = Resolution::new(*id, outcome, &metric, self.clock.now());
        self.store.save_resolution(&resolution).await?;

        let data_hash = metric.hash;
        let submission = match self.oracle.commit(id, outcome, data_hash).await {
            Ok(submission) => submission,
            Err(Error::Oracle(
                OracleError::AlreadyCommitted { .. } | OracleError::AlreadyFinalized { .. },
            )) => {
                let commitment = self.oracle.pending(id).await?;
                return match self.adopt_chain_state(id, &commitment).await? {
                    Some(recovered) => Ok(recovered),
                    None => Ok(ProcessOutcome::skipped("commitment vanished")),
                };
            }
            Err(e) => return Err(e),
        };

        let confirmed = self
            .confirm(id, TxKind::Commit, submission, |price, nonce| async move {
                self.oracle
                    .resubmit_commit(id, outcome, data_hash, price, nonce)
                    .await
            })
            .await?;
        let Confirmation::Mined(tx_hash) = confirmed else {
            let commitment = self.oracle.pending(id).await?;
            return match self.adopt_chain_state(id, &commitment).await? {
                Some(recovered) => Ok(recovered),
                None => Ok(ProcessOutcome::skipped("commitment vanished")),
            };
        };

        let commitment = self.oracle.pending(id).await?;
        let commit_time = commitment.commit_time.unwrap_or_else(|| self.clock.now());
        resolution.commit_tx_hash = Some(tx_hash);
        resolution.committed_at = Some(commit_time);
        self.store.save_resolution(&resolution).await?;
        self.store
            .update_market_status(id, MarketStatus::Committed, self.clock.now())
            .await?;

        let finalize_at = self.ensure_finalize_job(id, &commitment).await?;
        info!(market = %id, tx = %tx_hash, finalize_at = %finalize_at, "Outcome committed");
        self.notifier.notify(Event::MarketCommitted(CommitEvent {
            market_id: *id,
            outcome,
            tx_hash,
            finalize_at,
        }));

        Ok(ProcessOutcome::Committed {
            outcome,
            tx_hash,
            finalize_at,
        })
    }

    /// Finalize a committed outcome once the dispute window has elapsed.
    pub async fn process_market_finalization(&self, id: &MarketId) -> Result<ProcessOutcome> {
        let market = self.load(id).await?;
        if market.status == MarketStatus::Resolved {
            return Ok(ProcessOutcome::skipped("already resolved"));
        }

        let Some(mut resolution) = self.store.get_resolution(id).await? else {
            warn!(market = %id, "Finalization requested without a resolution");
            return Ok(ProcessOutcome::skipped("no resolution recorded"));
        };
        if resolution.is_finalized() {
            self.mark(id, MarketStatus::Resolved).await?;
            return Ok(ProcessOutcome::skipped("resolution already finalized"));
        }

        let commitment = self.oracle.pending(id).await?;
        if commitment.finalized {
            resolution.finalized_at = Some(self.clock.now());
            self.store.save_resolution(&resolution).await?;
            self.mark(id, MarketStatus::Resolved).await?;
            info!(market = %id, "Market already finalized on-chain");
            return Ok(ProcessOutcome::Recovered {
                status: MarketStatus::Resolved,
            });
        }
        if !commitment.committed {
            warn!(market = %id, "No on-chain commitment to finalize");
            return Ok(ProcessOutcome::skipped("no on-chain commitment"));
        }

        if let Some(remaining) = self.oracle.time_until_finalization(id).await? {
            if !remaining.is_zero() {
                let until = self.clock.now()
                    + chrono::Duration::from_std(remaining)
                        .map_err(|e| OracleError::Rpc(e.to_string()))?;
                return Ok(ProcessOutcome::NotDue { until });
            }
        }

        let submission = match self.oracle.finalize(id).await {
            Ok(submission) => submission,
            Err(Error::Oracle(OracleError::DisputeWindowNotElapsed { remaining_secs, .. })) => {
                let secs = i64::try_from(remaining_secs).unwrap_or(i64::MAX / 1_000);
                return Ok(ProcessOutcome::NotDue {
                    until: self.clock.now() + chrono::Duration::seconds(secs),
                });
            }
            Err(Error::Oracle(OracleError::AlreadyFinalized { .. })) => {
                resolution.finalized_at = Some(self.clock.now());
                self.store.save_resolution(&resolution).await?;
                self.mark(id, MarketStatus::Resolved).await?;
                return Ok(ProcessOutcome::Recovered {
                    status: MarketStatus::Resolved,
                });
            }
            Err(e) => return Err(e),
        };

        let confirmed = self
            .confirm(id, TxKind::Finalize, submission, |price, nonce| async move {
                self.oracle.resubmit_finalize(id, price, nonce).await
            })
            .await?;

        let tx_hash = match confirmed {
            Confirmation::Mined(hash) => Some(hash),
            Confirmation::LandedElsewhere => None,
        };
        resolution.finalize_tx_hash = tx_hash;
        resolution.finalized_at = Some(self.clock.now());
        self.store.save_resolution(&resolution).await?;
        self.mark(id, MarketStatus::Resolved).await?;

        let Some(tx_hash) = tx_hash else {
            return Ok(ProcessOutcome::Recovered {
                status: MarketStatus::Resolved,
            });
        };
        info!(market = %id, tx = %tx_hash, outcome = %resolution.outcome, "Market resolved");
        self.notifier.notify(Event::MarketResolved {
            market_id: *id,
            outcome: resolution.outcome,
            tx_hash,
        });
        Ok(ProcessOutcome::Finalized {
            outcome: resolution.outcome,
            tx_hash,
        })
    }

    /// Fetch, validate, round and audit the value a market resolves on.
    async fn resolve_value(&self, market: &Market) -> Result<MetricValue> {
        let subject = &market.subject;
        let spec = &market.oracle_spec;
        let at = market.window.t_end;
        let now = self.clock.now();
        let target = subject.value_decimals;

        let metric = match spec.aggregation {
            None => {
                let raw = self.registry.fetch_metric(subject, spec, at).await?;
                let value = self.validator.validate_metric_value(&raw, target, at, now)?;
                self.audit(market.id, &value).await?;
                value
            }
            Some(method) => {
                let required = spec.min_sources.max(1);
                let raw = self
                    .registry
                    .fetch_metric_multi_source(subject, at, self.registry.len())
                    .await?;
                let mut values = Vec::with_capacity(raw.len());
                for value in &raw {
                    match self.validator.validate_metric_value(value, target, at, now) {
                        Ok(value) => {
                            self.audit(market.id, &value).await?;
                            values.push(value);
                        }
                        Err(e) => {
                            warn!(market = %market.id, source = %value.source, error = %e, "Discarding source value");
                        }
                    }
                }
                if values.len() < required {
                    return Err(ValidationError::InsufficientSources {
                        required,
                        available: values.len(),
                    }
                    .into());
                }
                aggregate_metric_values(&values, method)?
            }
        };

        let rounded = apply_rounding(metric.value, target, spec.rounding_decimals)?;
        let metric = if rounded == metric.value && spec.aggregation.is_none() {
            metric
        } else {
            let value = MetricValue::new(
                rounded,
                target,
                metric.source.clone(),
                metric.confidence,
                metric.timestamp,
            )
            .with_metadata(metric.metadata.clone());
            self.audit(market.id, &value).await?;
            value
        };
        Ok(metric)
    }

    async fn audit(&self, market_id: MarketId, metric: &MetricValue) -> Result<()> {
        self.store
            .record_metric(&MetricRecord {
                market_id,
                metric: metric.clone(),
                fetched_at: self.clock.now(),
            })
            .await
    }

    /// Adopt an on-chain commitment the store does not know about yet.
    async fn adopt_chain_state(
        &self,
        id: &MarketId,
        commitment: &OnChainCommitment,
    ) -> Result<Option<ProcessOutcome>> {
        if commitment.finalized {
            info!(market = %id, "Found finalized outcome on-chain");
            self.mark(id, MarketStatus::Resolved).await?;
            return Ok(Some(ProcessOutcome::Recovered {
                status: MarketStatus::Resolved,
            }));
        }
        if commitment.committed {
            info!(market = %id, "Found committed outcome on-chain; scheduling finalization");
            if let Some(mut resolution) = self.store.get_resolution(id).await? {
                if resolution.committed_at.is_none() {
                    resolution.committed_at = commitment.commit_time;
                    self.store.save_resolution(&resolution).await?;
                }
            }
            self.mark(id, MarketStatus::Committed).await?;
            self.ensure_finalize_job(id, commitment).await?;
            return Ok(Some(ProcessOutcome::Recovered {
                status: MarketStatus::Committed,
            }));
        }
        Ok(None)
    }

    /// Schedule FINALIZE at `commit_time + dispute_window` unless one is open.
    async fn ensure_finalize_job(
        &self,
        id: &MarketId,
        commitment: &OnChainCommitment,
    ) -> Result<DateTime<Utc>> {
        let window = self.oracle.get_dispute_window().await?;
        let window =
            chrono::Duration::from_std(window).map_err(|e| OracleError::Rpc(e.to_string()))?;
        let commit_time = commitment.commit_time.unwrap_or_else(|| self.clock.now());
        let finalize_at = commit_time + window;
        self.jobs
            .schedule_unless_open(
                JobType::FinalizeMarket,
                *id,
                json!({ "market": id }),
                finalize_at,
            )
            .await?;
        Ok(finalize_at)
    }

    async fn mark(&self, id: &MarketId, status: MarketStatus) -> Result<()> {
        self.store
            .update_market_status(id, status, self.clock.now())
            .await
    }

    /// Follow a submission through the monitor until it lands, replacing it
    /// at escalated gas prices (same nonce) on `Retry`.
    async fn confirm<F, Fut>(
        &self,
        id: &MarketId,
        kind: TxKind,
        submission: Submission,
        resubmit: F,
    ) -> Result<Confirmation>
    where
        F: Fn(u128, u64) -> Fut,
        Fut: std::future::Future<Output = Result<Submission>>,
    {
        let wait = self.monitor.config().event_wait();
        let mut tx = PendingTransaction::new(
            submission.hash,
            *id,
            kind,
            submission.nonce,
            submission.gas_price,
            self.clock.now(),
        );

        loop {
            let mut events = self.monitor.track(tx.clone());
            let event = match timeout(wait, events.recv()).await {
                Ok(Some(event)) => event,
                Ok(None) => {
                    return Err(OracleError::Rpc(format!("monitor stopped tracking {}", tx.hash)).into())
                }
                Err(_) => {
                    self.monitor.untrack(&tx.hash);
                    return Err(OracleError::Rpc(format!(
                        "no confirmation for {} within {}s",
                        tx.hash,
                        wait.as_secs()
                    ))
                    .into());
                }
            };

            match event {
                TxEvent::Success { receipt, .. } => {
                    return Ok(Confirmation::Mined(receipt.hash));
                }
                TxEvent::Failed { tx, .. } => {
                    if self.landed(id, kind).await? {
                        info!(market = %id, tx = %tx.hash, "Reverted, but the call already landed");
                        return self.settled_by(&tx).await;
                    }
                    self.notifier
                        .notify(Event::TransactionFailed(transaction_event(&tx)));
                    return Err(OracleError::TransactionFailed {
                        kind,
                        hash: tx.hash,
                    }
                    .into());
                }
                TxEvent::Timeout { tx } => {
                    if self.landed(id, kind).await? {
                        return self.settled_by(&tx).await;
                    }
                    self.notifier
                        .notify(Event::TransactionTimeout(transaction_event(&tx)));
                    return Err(OracleError::TransactionTimeout {
                        kind,
                        hash: tx.hash,
                        attempts: tx.attempts,
                    }
                    .into());
                }
                TxEvent::Retry {
                    tx: previous,
                    recommended_gas_price,
                } => match resubmit(recommended_gas_price, previous.nonce).await {
                    Ok(next) => {
                        info!(
                            market = %id,
                            kind = %kind,
                            previous = %previous.hash,
                            tx = %next.hash,
                            nonce = next.nonce,
                            gas_price = %next.gas_price,
                            "Resubmitted with higher gas"
                        );
                        tx = previous.resubmitted(next.hash, next.gas_price, self.clock.now());
                    }
                    Err(Error::Oracle(
                        OracleError::AlreadyCommitted { .. } | OracleError::AlreadyFinalized { .. },
                    )) => {
                        info!(market = %id, tx = %previous.hash, "Call landed before resubmission");
                        return self.settled_by(&previous).await;
                    }
                    Err(e) => return Err(e),
                },
            }
        }
    }

    /// The call is on-chain; find which of our broadcasts, if any, carried it.
    async fn settled_by(&self, tx: &PendingTransaction) -> Result<Confirmation> {
        match self.oracle.first_successful(tx.hashes()).await? {
            Some(hash) => Ok(Confirmation::Mined(hash)),
            None => {
                warn!(
                    market = %tx.market_id,
                    kind = %tx.kind,
                    tx = %tx.hash,
                    replaced = tx.replaced.len(),
                    "Call landed without a successful receipt for any of our hashes"
                );
                Ok(Confirmation::LandedElsewhere)
            }
        }
    }

    async fn landed(&self, id: &MarketId, kind: TxKind) -> Result<bool> {
        let commitment = self.oracle.pending(id).await?;
        Ok(match kind {
            TxKind::Commit => commitment.committed,
            TxKind::Finalize => commitment.finalized,
        })
    }
}

fn transaction_event(tx: &PendingTransaction) -> TransactionEvent {
    TransactionEvent {
        market_id: tx.market_id,
        kind: tx.kind,
        tx_hash: tx.hash,
        attempts: tx.attempts,
    }
}
