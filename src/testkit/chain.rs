//! In-process oracle contract and chain.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::clock::ManualClock;
use crate::domain::{MarketId, Outcome, TxHash, TxReceipt};
use crate::error::{Error, OracleError, Result};
use crate::port::{
    Broadcast, ChainReader, Clock, GasParams, MarketChainState, MarketCreatedEvent,
    OnChainCommitment, OracleCall, OracleContract,
};

/// What happens to a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mining {
    /// Mined at once with status 1 and its effect applied.
    Instant,
    /// Mined at once with status 0, no effect.
    Reverted,
    /// Stays pending until [`FakeChain::mine_pending`] or [`FakeChain::mine`].
    Never,
}

/// A recorded submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
    pub hash: TxHash,
    pub call: OracleCall,
    pub gas: GasParams,
    /// Nonce it was signed with.
    pub nonce: u64,
}

struct State {
    block: u64,
    gas_price: u128,
    estimate: u64,
    dispute_window: Duration,
    mining: Mining,
    sent: u64,
    next_nonce: u64,
    used_nonces: HashSet<u64>,
    commitments: HashMap<MarketId, OnChainCommitment>,
    receipts: HashMap<TxHash, TxReceipt>,
    unmined: Vec<Submitted>,
    submissions: Vec<Submitted>,
    events: Vec<MarketCreatedEvent>,
    market_states: HashMap<MarketId, MarketChainState>,
    failing_state_reads: u32,
    rpc_down: bool,
}

/// Fake [`OracleContract`] + [`ChainReader`] backed by a mutex.
pub struct FakeChain {
    clock: Arc<ManualClock>,
    state: Mutex<State>,
}

impl FakeChain {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            state: Mutex::new(State {
                block: 100,
                gas_price: 30_000_000_000,
                estimate: 100_000,
                dispute_window: Duration::from_secs(3_600),
                mining: Mining::Instant,
                sent: 0,
                next_nonce: 0,
                used_nonces: HashSet::new(),
                commitments: HashMap::new(),
                receipts: HashMap::new(),
                unmined: Vec::new(),
                submissions: Vec::new(),
                events: Vec::new(),
                market_states: HashMap::new(),
                failing_state_reads: 0,
                rpc_down: false,
            }),
        }
    }

    pub fn set_gas_price(&self, wei: u128) {
        self.state.lock().gas_price = wei;
    }

    pub fn set_dispute_window(&self, window: Duration) {
        self.state.lock().dispute_window = window;
    }

    pub fn set_mining(&self, mining: Mining) {
        self.state.lock().mining = mining;
    }

    pub fn set_block(&self, block: u64) {
        self.state.lock().block = block;
    }

    /// Every RPC call fails while set.
    pub fn set_rpc_down(&self, down: bool) {
        self.state.lock().rpc_down = down;
    }

    /// Record an on-chain commitment made by someone else (or an earlier run).
    pub fn set_committed(&self, market: &MarketId, outcome: Outcome, at: chrono::DateTime<chrono::Utc>) {
        self.state.lock().commitments.insert(
            *market,
            OnChainCommitment {
                outcome: Some(outcome),
                data_hash: TxHash::ZERO,
                commit_time: Some(at),
                committed: true,
                finalized: false,
            },
        );
    }

    pub fn set_finalized(&self, market: &MarketId) {
        let mut state = self.state.lock();
        let entry = state.commitments.entry(*market).or_default();
        entry.finalized = true;
    }

    pub fn commitment(&self, market: &MarketId) -> OnChainCommitment {
        self.state
            .lock()
            .commitments
            .get(market)
            .copied()
            .unwrap_or_default()
    }

    pub fn put_receipt(&self, receipt: TxReceipt) {
        self.state.lock().receipts.insert(receipt.hash, receipt);
    }

    pub fn submissions(&self) -> Vec<Submitted> {
        self.state.lock().submissions.clone()
    }

    /// Submissions of one call kind.
    pub fn submissions_of(&self, kind: crate::domain::TxKind) -> usize {
        self.state
            .lock()
            .submissions
            .iter()
            .filter(|s| s.call.kind() == kind)
            .count()
    }

    /// Transactions still waiting in the mempool.
    pub fn unmined(&self) -> Vec<Submitted> {
        self.state.lock().unmined.clone()
    }

    /// Mine every pending transaction successfully. Of several sharing a
    /// nonce only the newest is mined.
    pub fn mine_pending(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let unmined = std::mem::take(&mut state.unmined);
        for (i, submitted) in unmined.iter().enumerate() {
            if unmined[i + 1..].iter().any(|later| later.nonce == submitted.nonce) {
                continue;
            }
            settle(&mut state, submitted, true, now);
        }
    }

    /// Mine one pending transaction. Any other pending transaction with the
    /// same nonce is dropped and never gets a receipt.
    pub fn mine(&self, hash: &TxHash, success: bool) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let Some(pos) = state.unmined.iter().position(|s| s.hash == *hash) else {
            return false;
        };
        let submitted = state.unmined.remove(pos);
        settle(&mut state, &submitted, success, now);
        true
    }

    /// Add a `MarketCreated` log; the head advances to include it.
    pub fn push_event(&self, event: MarketCreatedEvent) {
        let mut state = self.state.lock();
        state.block = state.block.max(event.block_number);
        state.events.push(event);
    }

    pub fn set_market_state(&self, market: &MarketId, market_state: MarketChainState) {
        self.state.lock().market_states.insert(*market, market_state);
    }

    /// The next `n` `market_state` reads fail.
    pub fn fail_market_state_reads(&self, n: u32) {
        self.state.lock().failing_state_reads = n;
    }

    fn check_rpc(&self) -> Result<()> {
        if self.state.lock().rpc_down {
            return Err(Error::Connection("rpc unavailable".into()));
        }
        Ok(())
    }
}

fn apply(state: &mut State, call: &OracleCall, now: chrono::DateTime<chrono::Utc>) {
    match *call {
        OracleCall::Commit {
            market,
            outcome,
            data_hash,
        } => {
            let entry = state.commitments.entry(market).or_default();
            if !entry.committed {
                *entry = OnChainCommitment {
                    outcome: Some(outcome),
                    data_hash,
                    commit_time: Some(now),
                    committed: true,
                    finalized: false,
                };
            }
        }
        OracleCall::Finalize { market } => {
            state.commitments.entry(market).or_default().finalized = true;
        }
    }
}

fn settle(
    state: &mut State,
    submitted: &Submitted,
    success: bool,
    now: chrono::DateTime<chrono::Utc>,
) {
    if success {
        apply(state, &submitted.call, now);
    }
    let block = state.block;
    state.used_nonces.insert(submitted.nonce);
    state.unmined.retain(|s| s.nonce != submitted.nonce);
    state
        .receipts
        .insert(submitted.hash, receipt(submitted.hash, success, block));
}

fn receipt(hash: TxHash, success: bool, block: u64) -> TxReceipt {
    TxReceipt {
        hash,
        success,
        block_number: Some(block),
        gas_used: 50_000,
    }
}

#[async_trait]
impl OracleContract for FakeChain {
    async fn dispute_window(&self) -> Result<Duration> {
        self.check_rpc()?;
        Ok(self.state.lock().dispute_window)
    }

    async fn pending(&self, market: &MarketId) -> Result<OnChainCommitment> {
        self.check_rpc()?;
        Ok(self.commitment(market))
    }

    async fn estimate_gas(&self, _call: &OracleCall) -> Result<u64> {
        self.check_rpc()?;
        Ok(self.state.lock().estimate)
    }

    async fn submit(&self, call: &OracleCall, gas: GasParams) -> Result<Broadcast> {
        self.check_rpc()?;
        let now = self.clock.now();
        let mut state = self.state.lock();
        let nonce = match gas.nonce {
            Some(nonce) if state.used_nonces.contains(&nonce) => {
                return Err(OracleError::Rpc(format!("nonce too low: {nonce}")).into());
            }
            Some(nonce) => nonce,
            None => {
                let nonce = state.next_nonce;
                state.next_nonce += 1;
                nonce
            }
        };
        state.sent += 1;
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&state.sent.to_be_bytes());
        let hash = TxHash::from(bytes);
        let submitted = Submitted {
            hash,
            call: *call,
            gas,
            nonce,
        };
        state.submissions.push(submitted.clone());

        match state.mining {
            Mining::Instant => settle(&mut state, &submitted, true, now),
            Mining::Reverted => settle(&mut state, &submitted, false, now),
            Mining::Never => state.unmined.push(submitted),
        }
        Ok(Broadcast { hash, nonce })
    }
}

#[async_trait]
impl ChainReader for FakeChain {
    async fn block_number(&self) -> Result<u64> {
        self.check_rpc()?;
        Ok(self.state.lock().block)
    }

    async fn gas_price(&self) -> Result<u128> {
        self.check_rpc()?;
        Ok(self.state.lock().gas_price)
    }

    async fn receipt(&self, hash: &TxHash) -> Result<Option<TxReceipt>> {
        self.check_rpc()?;
        Ok(self.state.lock().receipts.get(hash).copied())
    }

    async fn market_created_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<MarketCreatedEvent>> {
        self.check_rpc()?;
        Ok(self
            .state
            .lock()
            .events
            .iter()
            .filter(|e| e.block_number >= from_block && e.block_number <= to_block)
            .cloned()
            .collect())
    }

    async fn market_state(&self, market: &MarketId) -> Result<MarketChainState> {
        self.check_rpc()?;
        let mut state = self.state.lock();
        if state.failing_state_reads > 0 {
            state.failing_state_reads -= 1;
            return Err(Error::Connection("market state read timed out".into()));
        }
        Ok(state
            .market_states
            .get(market)
            .cloned()
            .unwrap_or_else(|| MarketChainState {
                title: format!("Market {market}"),
                resolve_time: None,
                resolved: false,
            }))
    }
}
