//! Resolution records and the audit trail behind them.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{B256, I256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::DomainError;
use super::fixed;
use super::id::{MarketId, TxHash};
use super::metric::MetricValue;

/// Binary market outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    /// The predicate held.
    Yes,
    /// The predicate did not hold.
    No,
}

impl Outcome {
    /// Outcome from a predicate evaluation.
    #[must_use]
    pub const fn from_predicate(holds: bool) -> Self {
        if holds {
            Self::Yes
        } else {
            Self::No
        }
    }

    /// On-chain `uint8` encoding.
    #[must_use]
    pub const fn code(&self) -> u8 {
        match self {
            Self::Yes => 1,
            Self::No => 2,
        }
    }

    /// Decode the on-chain encoding; `0` means no outcome.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Yes),
            2 => Some(Self::No),
            _ => None,
        }
    }

    /// Stored representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "YES",
            Self::No => "NO",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "YES" => Ok(Self::Yes),
            "NO" => Ok(Self::No),
            other => Err(DomainError::UnknownVariant {
                kind: "outcome",
                value: other.to_string(),
            }),
        }
    }
}

/// One resolution cycle for a market.
///
/// Written when the outcome is decided, then only updated as the commit
/// and finalize transactions land. A retry overwrites the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// Market being resolved.
    pub market_id: MarketId,
    /// Decided outcome.
    pub outcome: Outcome,
    /// Normalized value the predicate was evaluated on.
    #[serde(with = "fixed::decimal_string")]
    pub value: I256,
    /// Precision of `value`.
    pub decimals: u8,
    /// Source (or aggregate label) that produced the value.
    pub source: String,
    /// Confidence of the value.
    pub confidence: f64,
    /// Content hash committed on-chain.
    pub data_hash: B256,
    /// When the outcome was decided.
    pub resolved_at: DateTime<Utc>,
    /// When the commit was first submitted.
    pub submitted_at: DateTime<Utc>,
    /// Confirmed commit transaction.
    pub commit_tx_hash: Option<TxHash>,
    /// On-chain commit time.
    pub committed_at: Option<DateTime<Utc>>,
    /// Confirmed finalize transaction.
    pub finalize_tx_hash: Option<TxHash>,
    /// When finalization confirmed.
    pub finalized_at: Option<DateTime<Utc>>,
}

impl Resolution {
    /// Start a resolution from the value that decided it.
    #[must_use]
    pub fn new(market_id: MarketId, outcome: Outcome, metric: &MetricValue, now: DateTime<Utc>) -> Self {
        Self {
            market_id,
            outcome,
            value: metric.value,
            decimals: metric.decimals,
            source: metric.source.clone(),
            confidence: metric.confidence,
            data_hash: metric.hash,
            resolved_at: now,
            submitted_at: now,
            commit_tx_hash: None,
            committed_at: None,
            finalize_tx_hash: None,
            finalized_at: None,
        }
    }

    /// Finalization has been confirmed.
    #[must_use]
    pub const fn is_finalized(&self) -> bool {
        self.finalized_at.is_some()
    }
}

/// Audit log entry for a value used in a resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Market the value was fetched for.
    pub market_id: MarketId,
    /// The value as fetched.
    pub metric: MetricValue,
    /// When it was fetched.
    pub fetched_at: DateTime<Utc>,
}
