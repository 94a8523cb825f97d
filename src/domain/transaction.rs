//! In-flight oracle transactions and their lifecycle events.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{MarketId, TxHash};

/// Which oracle call a transaction carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    /// `Oracle.commit`.
    Commit,
    /// `Oracle.finalize`.
    Finalize,
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Commit => f.write_str("commit"),
            Self::Finalize => f.write_str("finalize"),
        }
    }
}

/// A submitted transaction awaiting its receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransaction {
    /// Transaction hash.
    pub hash: TxHash,
    /// Market the call targets.
    pub market_id: MarketId,
    /// Oracle call kind.
    pub kind: TxKind,
    /// When this hash was submitted.
    pub submitted_at: DateTime<Utc>,
    /// Gas-escalated resubmissions so far.
    pub attempts: u32,
    /// Gas price (wei) this hash was submitted with.
    pub gas_price: u128,
    /// Sender nonce shared by every replacement of this call.
    pub nonce: u64,
    /// Earlier hashes this one replaced, oldest first. Any of them may
    /// still be the one that gets mined.
    #[serde(default)]
    pub replaced: Vec<TxHash>,
}

impl PendingTransaction {
    /// A first submission.
    #[must_use]
    pub const fn new(
        hash: TxHash,
        market_id: MarketId,
        kind: TxKind,
        nonce: u64,
        gas_price: u128,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            hash,
            market_id,
            kind,
            submitted_at,
            attempts: 0,
            gas_price,
            nonce,
            replaced: Vec::new(),
        }
    }

    /// Replacement submission at a higher price, same nonce.
    #[must_use]
    pub fn resubmitted(&self, hash: TxHash, gas_price: u128, submitted_at: DateTime<Utc>) -> Self {
        let mut replaced = self.replaced.clone();
        replaced.push(self.hash);
        Self {
            hash,
            market_id: self.market_id,
            kind: self.kind,
            submitted_at,
            attempts: self.attempts + 1,
            gas_price,
            nonce: self.nonce,
            replaced,
        }
    }

    /// Every hash broadcast for this call, oldest first.
    pub fn hashes(&self) -> impl Iterator<Item = &TxHash> {
        self.replaced.iter().chain(std::iter::once(&self.hash))
    }
}

/// Mined transaction summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    /// Transaction hash.
    pub hash: TxHash,
    /// `status == 1`.
    pub success: bool,
    /// Inclusion block.
    pub block_number: Option<u64>,
    /// Gas consumed.
    pub gas_used: u64,
}

/// Lifecycle event for one tracked transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxEvent {
    /// Mined with status 1.
    Success {
        /// The transaction.
        tx: PendingTransaction,
        /// Its receipt.
        receipt: TxReceipt,
    },
    /// Mined with status 0.
    Failed {
        /// The transaction.
        tx: PendingTransaction,
        /// Its receipt.
        receipt: TxReceipt,
    },
    /// Not mined in time (or stuck); resubmit at the given price.
    Retry {
        /// The transaction.
        tx: PendingTransaction,
        /// Escalated gas price, strictly above `tx.gas_price`.
        recommended_gas_price: u128,
    },
    /// Not mined in time and no retries remain.
    Timeout {
        /// The transaction.
        tx: PendingTransaction,
    },
}

impl TxEvent {
    /// Transaction the event is about.
    #[must_use]
    pub const fn tx(&self) -> &PendingTransaction {
        match self {
            Self::Success { tx, .. }
            | Self::Failed { tx, .. }
            | Self::Retry { tx, .. }
            | Self::Timeout { tx } => tx,
        }
    }

    /// No further events follow for this hash.
    #[must_use]
    pub const fn is_final(&self) -> bool {
        !matches!(self, Self::Retry { .. })
    }

    /// Short label for logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Failed { .. } => "failed",
            Self::Retry { .. } => "retry",
            Self::Timeout { .. } => "timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, B256};

    #[test]
    fn resubmission_bumps_attempts_and_keeps_target() {
        let now = Utc::now();
        let market = MarketId::new(Address::repeat_byte(7));
        let tx = PendingTransaction::new(B256::repeat_byte(1), market, TxKind::Commit, 4, 100, now);
        let next = tx.resubmitted(B256::repeat_byte(2), 150, now);
        assert_eq!(next.attempts, 1);
        assert_eq!(next.market_id, market);
        assert_eq!(next.kind, TxKind::Commit);
        assert_eq!(next.gas_price, 150);
        assert_eq!(next.nonce, 4);
    }

    #[test]
    fn replacements_remember_every_earlier_hash() {
        let now = Utc::now();
        let market = MarketId::new(Address::repeat_byte(7));
        let tx = PendingTransaction::new(B256::repeat_byte(1), market, TxKind::Finalize, 9, 100, now)
            .resubmitted(B256::repeat_byte(2), 150, now)
            .resubmitted(B256::repeat_byte(3), 200, now);
        assert_eq!(tx.nonce, 9);
        assert_eq!(tx.replaced, vec![B256::repeat_byte(1), B256::repeat_byte(2)]);
        let all: Vec<_> = tx.hashes().copied().collect();
        assert_eq!(all, vec![B256::repeat_byte(1), B256::repeat_byte(2), B256::repeat_byte(3)]);
    }

    #[test]
    fn only_retry_is_non_final() {
        let tx = PendingTransaction::new(
            B256::ZERO,
            MarketId::new(Address::ZERO),
            TxKind::Finalize,
            0,
            1,
            Utc::now(),
        );
        assert!(!TxEvent::Retry { tx: tx.clone(), recommended_gas_price: 2 }.is_final());
        assert!(TxEvent::Timeout { tx }.is_final());
    }
}
