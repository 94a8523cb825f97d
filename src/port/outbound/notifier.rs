//! Notifier port for event notifications.
//!
//! This module defines the trait for sending notifications about
//! resolution progress, transaction problems, job failures and alerts.

use chrono::{DateTime, Utc};

use crate::domain::{Alert, JobId, JobType, MarketId, Outcome, TxHash, TxKind};

/// Events that can trigger notifications.
#[derive(Debug, Clone)]
pub enum Event {
    /// A new market was persisted and scheduled.
    MarketIngested {
        market_id: MarketId,
        /// `kind:key` of the measured subject.
        subject: String,
        resolve_at: DateTime<Utc>,
    },
    /// An outcome was committed on-chain.
    MarketCommitted(CommitEvent),
    /// An outcome was finalized on-chain.
    MarketResolved {
        market_id: MarketId,
        outcome: Outcome,
        tx_hash: TxHash,
    },
    /// A submitted transaction reverted.
    TransactionFailed(TransactionEvent),
    /// A transaction was never mined despite gas escalation.
    TransactionTimeout(TransactionEvent),
    /// A job exhausted its attempts or hit a terminal error.
    JobFailed(JobFailedEvent),
    /// An alert rule fired.
    AlertFired(Alert),
    /// A previously fired alert cleared.
    AlertResolved(Alert),
}

/// Commit confirmation.
#[derive(Debug, Clone)]
pub struct CommitEvent {
    pub market_id: MarketId,
    pub outcome: Outcome,
    pub tx_hash: TxHash,
    /// Earliest finalization time.
    pub finalize_at: DateTime<Utc>,
}

/// Transaction problem.
#[derive(Debug, Clone)]
pub struct TransactionEvent {
    pub market_id: MarketId,
    pub kind: TxKind,
    pub tx_hash: TxHash,
    pub attempts: u32,
}

/// Permanent job failure.
#[derive(Debug, Clone)]
pub struct JobFailedEvent {
    pub job_id: JobId,
    pub job_type: JobType,
    pub market_id: MarketId,
    pub attempts: u32,
    pub error: String,
}

/// Trait for notification handlers.
///
/// Notifications are fire-and-forget: `notify` must return quickly and
/// spawn a task for anything that does I/O.
pub trait Notifier: Send + Sync {
    /// Handle an event.
    fn notify(&self, event: Event);
}

/// Registry of notifiers (composite pattern).
///
/// Broadcasts events to all registered notifiers.
pub struct NotifierRegistry {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl NotifierRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { notifiers: vec![] }
    }

    /// Register a notifier.
    pub fn register(&mut self, notifier: Box<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    /// Notify all registered notifiers.
    pub fn notify_all(&self, event: Event) {
        for notifier in &self.notifiers {
            notifier.notify(event.clone());
        }
    }

    /// Number of registered notifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    /// Check if registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

impl Default for NotifierRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for NotifierRegistry {
    fn notify(&self, event: Event) {
        self.notify_all(event);
    }
}

/// A no-op notifier for testing or when notifications are disabled.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _event: Event) {}
}

/// A logging notifier that logs events via tracing.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: Event) {
        use tracing::{error, info, warn};
        match event {
            Event::MarketIngested {
                market_id,
                subject,
                resolve_at,
            } => {
                info!(market = %market_id, subject = %subject, resolve_at = %resolve_at, "Market ingested");
            }
            Event::MarketCommitted(e) => {
                info!(
                    market = %e.market_id,
                    outcome = %e.outcome,
                    tx = %e.tx_hash,
                    finalize_at = %e.finalize_at,
                    "Outcome committed"
                );
            }
            Event::MarketResolved {
                market_id,
                outcome,
                tx_hash,
            } => {
                info!(market = %market_id, outcome = %outcome, tx = %tx_hash, "Market resolved");
            }
            Event::TransactionFailed(e) => {
                error!(market = %e.market_id, kind = %e.kind, tx = %e.tx_hash, "Transaction reverted");
            }
            Event::TransactionTimeout(e) => {
                error!(
                    market = %e.market_id,
                    kind = %e.kind,
                    tx = %e.tx_hash,
                    attempts = e.attempts,
                    "Transaction timed out"
                );
            }
            Event::JobFailed(e) => {
                error!(
                    job = %e.job_id,
                    job_type = %e.job_type,
                    market = %e.market_id,
                    attempts = e.attempts,
                    error = %e.error,
                    "Job failed permanently"
                );
            }
            Event::AlertFired(alert) => {
                warn!(
                    alert = %alert.key,
                    severity = %alert.severity,
                    message = %alert.message,
                    "Alert fired"
                );
            }
            Event::AlertResolved(alert) => {
                info!(alert = %alert.key, "Alert resolved");
            }
        }
    }
}
