//! On-chain ports: the oracle contract and read-only chain access.

use std::time::Duration;

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{EventKey, MarketId, Outcome, TxHash, TxKind, TxReceipt};
use crate::error::Result;

/// A `MarketCreated` log, from either the log poll or the webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketCreatedEvent {
    /// Address of the new market contract.
    pub market: MarketId,
    pub creator: Address,
    pub market_type: String,
    /// Undecoded `MarketParams` JSON.
    pub params: serde_json::Value,
    pub transaction_hash: TxHash,
    pub log_index: u64,
    pub block_number: u64,
    /// Factory contract that emitted the log.
    pub contract_address: Address,
}

impl MarketCreatedEvent {
    /// Dedup key of this delivery.
    #[must_use]
    pub fn key(&self) -> EventKey {
        EventKey::new(&self.transaction_hash, self.log_index)
    }
}

/// Result of `Oracle.pending(market)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OnChainCommitment {
    /// Committed outcome, if any.
    pub outcome: Option<Outcome>,
    pub data_hash: B256,
    pub commit_time: Option<DateTime<Utc>>,
    pub committed: bool,
    pub finalized: bool,
}

/// Immutable market contract state read at ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketChainState {
    pub title: String,
    pub resolve_time: Option<DateTime<Utc>>,
    pub resolved: bool,
}

/// A state-changing oracle call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleCall {
    Commit {
        market: MarketId,
        outcome: Outcome,
        data_hash: B256,
    },
    Finalize {
        market: MarketId,
    },
}

impl OracleCall {
    #[must_use]
    pub const fn market(&self) -> MarketId {
        match self {
            Self::Commit { market, .. } | Self::Finalize { market } => *market,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> TxKind {
        match self {
            Self::Commit { .. } => TxKind::Commit,
            Self::Finalize { .. } => TxKind::Finalize,
        }
    }
}

/// Gas settings for one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasParams {
    pub gas_limit: u64,
    /// Wei per gas.
    pub gas_price: u128,
    /// Reuse this sender nonce so the broadcast replaces an earlier one.
    /// `None` takes the next pending nonce.
    pub nonce: Option<u64>,
}

/// A transaction the node accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Broadcast {
    pub hash: TxHash,
    /// Sender nonce it was signed with.
    pub nonce: u64,
}

/// The resolution oracle contract.
#[async_trait]
pub trait OracleContract: Send + Sync {
    /// `Oracle.disputeWindow()`.
    async fn dispute_window(&self) -> Result<Duration>;

    /// `Oracle.pending(market)`.
    async fn pending(&self, market: &MarketId) -> Result<OnChainCommitment>;

    /// Gas estimate for a call.
    async fn estimate_gas(&self, call: &OracleCall) -> Result<u64>;

    /// Sign and broadcast a call; returns once the node accepted it.
    async fn submit(&self, call: &OracleCall, gas: GasParams) -> Result<Broadcast>;
}

/// Read-only chain access.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn block_number(&self) -> Result<u64>;

    /// Current recommended gas price in wei.
    async fn gas_price(&self) -> Result<u128>;

    /// Receipt for a mined transaction; `None` while pending.
    async fn receipt(&self, hash: &TxHash) -> Result<Option<TxReceipt>>;

    /// `MarketCreated` logs in `[from_block, to_block]`.
    ///
    /// Logs whose payload cannot be decoded at all are skipped by the
    /// implementation.
    async fn market_created_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<MarketCreatedEvent>>;

    /// Title, resolve time and resolved flag of a market contract.
    async fn market_state(&self, market: &MarketId) -> Result<MarketChainState>;
}
