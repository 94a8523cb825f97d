//! Oracle contract client with idempotency guards and gas policy.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::B256;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::gas::GasPolicy;
use crate::domain::{MarketId, Outcome, TxHash};
use crate::error::{OracleError, Result};
use crate::port::{ChainReader, Clock, GasParams, OnChainCommitment, OracleCall, OracleContract};

/// A transaction accepted by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    pub hash: TxHash,
    /// Sender nonce; replacements reuse it.
    pub nonce: u64,
    pub gas_limit: u64,
    pub gas_price: u128,
}

/// Commit, finalize and read calls against the oracle contract.
///
/// Every state-changing call re-reads `pending(market)` first, so a market
/// that is already committed or finalized on-chain is never submitted again.
pub struct OracleClient {
    contract: Arc<dyn OracleContract>,
    chain: Arc<dyn ChainReader>,
    clock: Arc<dyn Clock>,
    gas: GasPolicy,
    dispute_window: OnceCell<Duration>,
}

impl OracleClient {
    pub fn new(
        contract: Arc<dyn OracleContract>,
        chain: Arc<dyn ChainReader>,
        clock: Arc<dyn Clock>,
        gas: GasPolicy,
    ) -> Self {
        Self {
            contract,
            chain,
            clock,
            gas,
            dispute_window: OnceCell::new(),
        }
    }

    pub fn gas_policy(&self) -> &GasPolicy {
        &self.gas
    }

    /// Dispute window, read once per process.
    pub async fn get_dispute_window(&self) -> Result<Duration> {
        let window = self
            .dispute_window
            .get_or_try_init(|| async {
                let window = self.contract.dispute_window().await?;
                info!(secs = window.as_secs(), "Dispute window loaded");
                Ok::<_, crate::error::Error>(window)
            })
            .await?;
        Ok(*window)
    }

    /// Current on-chain commitment state.
    pub async fn pending(&self, market: &MarketId) -> Result<OnChainCommitment> {
        self.contract.pending(market).await
    }

    /// Commit an outcome.
    ///
    /// # Errors
    ///
    /// [`OracleError::AlreadyCommitted`] / [`OracleError::AlreadyFinalized`]
    /// when the guard trips; RPC errors otherwise.
    pub async fn commit(&self, market: &MarketId, outcome: Outcome, data_hash: B256) -> Result<Submission> {
        self.guard_commit(market).await?;
        let call = OracleCall::Commit {
            market: *market,
            outcome,
            data_hash,
        };
        self.submit(&call, None, None).await
    }

    /// Replace a pending commit at an escalated gas price. Reusing `nonce`
    /// means at most one of the two broadcasts can be mined.
    pub async fn resubmit_commit(
        &self,
        market: &MarketId,
        outcome: Outcome,
        data_hash: B256,
        gas_price: u128,
        nonce: u64,
    ) -> Result<Submission> {
        self.guard_commit(market).await?;
        let call = OracleCall::Commit {
            market: *market,
            outcome,
            data_hash,
        };
        self.submit(&call, Some(gas_price), Some(nonce)).await
    }

    /// Finalize a committed outcome once the dispute window has elapsed.
    ///
    /// # Errors
    ///
    /// [`OracleError::DisputeWindowNotElapsed`] while the window is open,
    /// [`OracleError::NotCommitted`] / [`OracleError::AlreadyFinalized`] when
    /// the guard trips.
    pub async fn finalize(&self, market: &MarketId) -> Result<Submission> {
        self.guard_finalize(market).await?;
        self.submit(&OracleCall::Finalize { market: *market }, None, None)
            .await
    }

    /// Replace a pending finalize at an escalated gas price, same nonce.
    pub async fn resubmit_finalize(
        &self,
        market: &MarketId,
        gas_price: u128,
        nonce: u64,
    ) -> Result<Submission> {
        self.guard_finalize(market).await?;
        self.submit(
            &OracleCall::Finalize { market: *market },
            Some(gas_price),
            Some(nonce),
        )
        .await
    }

    /// First of `hashes` whose receipt reports success.
    ///
    /// Replacements share a nonce, so at most one of them can succeed; an
    /// empty result means the call landed through some other transaction.
    pub async fn first_successful<'a, I>(&self, hashes: I) -> Result<Option<TxHash>>
    where
        I: IntoIterator<Item = &'a TxHash>,
    {
        for hash in hashes {
            if let Some(receipt) = self.chain.receipt(hash).await? {
                if receipt.success {
                    return Ok(Some(*hash));
                }
            }
        }
        Ok(None)
    }

    /// Committed, not finalized, and the dispute window has elapsed.
    pub async fn can_finalize(&self, market: &MarketId) -> Result<bool> {
        let pending = self.pending(market).await?;
        if !pending.committed || pending.finalized {
            return Ok(false);
        }
        Ok(self.remaining(&pending).await?.is_zero())
    }

    /// Time left in the dispute window; `None` when nothing is committed.
    pub async fn time_until_finalization(&self, market: &MarketId) -> Result<Option<Duration>> {
        let pending = self.pending(market).await?;
        if !pending.committed {
            return Ok(None);
        }
        Ok(Some(self.remaining(&pending).await?))
    }

    async fn remaining(&self, pending: &OnChainCommitment) -> Result<Duration> {
        let window = self.get_dispute_window().await?;
        let Some(commit_time) = pending.commit_time else {
            return Ok(Duration::ZERO);
        };
        let window = chrono::Duration::from_std(window)
            .map_err(|e| OracleError::Rpc(format!("dispute window out of range: {e}")))?;
        let deadline = commit_time + window;
        Ok((deadline - self.clock.now()).to_std().unwrap_or(Duration::ZERO))
    }

    async fn guard_commit(&self, market: &MarketId) -> Result<()> {
        let pending = self.pending(market).await?;
        if pending.finalized {
            return Err(OracleError::AlreadyFinalized { market: *market }.into());
        }
        if pending.committed {
            return Err(OracleError::AlreadyCommitted { market: *market }.into());
        }
        Ok(())
    }

    async fn guard_finalize(&self, market: &MarketId) -> Result<()> {
        let pending = self.pending(market).await?;
        if pending.finalized {
            return Err(OracleError::AlreadyFinalized { market: *market }.into());
        }
        if !pending.committed {
            return Err(OracleError::NotCommitted { market: *market }.into());
        }
        let remaining = self.remaining(&pending).await?;
        if !remaining.is_zero() {
            return Err(OracleError::DisputeWindowNotElapsed {
                market: *market,
                remaining_secs: remaining.as_secs().max(1),
            }
            .into());
        }
        Ok(())
    }

    async fn submit(
        &self,
        call: &OracleCall,
        gas_price: Option<u128>,
        nonce: Option<u64>,
    ) -> Result<Submission> {
        let estimate = self.contract.estimate_gas(call).await?;
        let gas_limit = self.gas.gas_limit(estimate);
        let gas_price = match gas_price {
            Some(price) => price,
            None => self.chain.gas_price().await?,
        };
        let gas_price = self.gas.clamp_price(gas_price);

        let sent = self
            .contract
            .submit(
                call,
                GasParams {
                    gas_limit,
                    gas_price,
                    nonce,
                },
            )
            .await?;
        debug!(
            market = %call.market(),
            kind = %call.kind(),
            tx = %sent.hash,
            nonce = sent.nonce,
            gas_limit,
            gas_price = %gas_price,
            "Oracle transaction submitted"
        );
        Ok(Submission {
            hash: sent.hash,
            nonce: sent.nonce,
            gas_limit,
            gas_price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TxReceipt;
    use crate::error::Error;
    use crate::testkit::{fixtures, FakeChain, ManualClock, Mining};

    fn client(chain: &Arc<FakeChain>, clock: &Arc<ManualClock>) -> OracleClient {
        OracleClient::new(chain.clone(), chain.clone(), clock.clone(), GasPolicy::default())
    }

    #[tokio::test]
    async fn commit_pads_gas_and_submits() {
        let clock = Arc::new(ManualClock::new(fixtures::t0()));
        let chain = Arc::new(FakeChain::new(clock.clone()));
        let market = fixtures::market_id(1);

        let sub = client(&chain, &clock)
            .commit(&market, Outcome::Yes, B256::repeat_byte(9))
            .await
            .unwrap();
        assert_eq!(sub.gas_limit, 120_000);
        assert_eq!(chain.submissions().len(), 1);
    }

    #[tokio::test]
    async fn commit_refuses_when_already_committed() {
        let clock = Arc::new(ManualClock::new(fixtures::t0()));
        let chain = Arc::new(FakeChain::new(clock.clone()));
        let market = fixtures::market_id(1);
        chain.set_committed(&market, Outcome::No, fixtures::t0());

        let err = client(&chain, &clock)
            .commit(&market, Outcome::Yes, B256::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Oracle(OracleError::AlreadyCommitted { .. })));
        assert!(chain.submissions().is_empty());
    }

    #[tokio::test]
    async fn finalize_waits_for_dispute_window() {
        let clock = Arc::new(ManualClock::new(fixtures::t0()));
        let chain = Arc::new(FakeChain::new(clock.clone()));
        chain.set_dispute_window(Duration::from_secs(3_600));
        let market = fixtures::market_id(1);
        chain.set_committed(&market, Outcome::Yes, fixtures::t0());
        let oracle = client(&chain, &clock);

        let err = oracle.finalize(&market).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Oracle(OracleError::DisputeWindowNotElapsed {
                remaining_secs: 3_600,
                ..
            })
        ));
        assert!(!oracle.can_finalize(&market).await.unwrap());
        assert_eq!(
            oracle.time_until_finalization(&market).await.unwrap(),
            Some(Duration::from_secs(3_600))
        );

        clock.advance(chrono::Duration::seconds(3_600));
        assert!(oracle.can_finalize(&market).await.unwrap());
        oracle.finalize(&market).await.unwrap();
    }

    #[tokio::test]
    async fn finalize_requires_commitment() {
        let clock = Arc::new(ManualClock::new(fixtures::t0()));
        let chain = Arc::new(FakeChain::new(clock.clone()));
        let market = fixtures::market_id(1);

        let err = client(&chain, &clock).finalize(&market).await.unwrap_err();
        assert!(matches!(err, Error::Oracle(OracleError::NotCommitted { .. })));
        assert_eq!(
            client(&chain, &clock)
                .time_until_finalization(&market)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn dispute_window_is_read_once() {
        let clock = Arc::new(ManualClock::new(fixtures::t0()));
        let chain = Arc::new(FakeChain::new(clock.clone()));
        chain.set_dispute_window(Duration::from_secs(60));
        let oracle = client(&chain, &clock);

        assert_eq!(oracle.get_dispute_window().await.unwrap(), Duration::from_secs(60));
        chain.set_dispute_window(Duration::from_secs(120));
        assert_eq!(oracle.get_dispute_window().await.unwrap(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn resubmission_uses_explicit_price_under_ceiling() {
        let clock = Arc::new(ManualClock::new(fixtures::t0()));
        let chain = Arc::new(FakeChain::new(clock.clone()));
        let market = fixtures::market_id(1);
        let oracle = client(&chain, &clock);

        chain.set_mining(Mining::Never);
        let first = oracle.commit(&market, Outcome::Yes, B256::ZERO).await.unwrap();
        let sub = oracle
            .resubmit_commit(&market, Outcome::Yes, B256::ZERO, 10_000_000_000_000, first.nonce)
            .await
            .unwrap();
        assert_eq!(sub.gas_price, oracle.gas_policy().ceiling_wei());
        assert_eq!(sub.nonce, first.nonce);
    }

    #[tokio::test]
    async fn replacement_reuses_the_nonce_of_the_first_broadcast() {
        let clock = Arc::new(ManualClock::new(fixtures::t0()));
        let chain = Arc::new(FakeChain::new(clock.clone()));
        chain.set_mining(Mining::Never);
        let oracle = client(&chain, &clock);

        let first = oracle
            .commit(&fixtures::market_id(1), Outcome::Yes, B256::ZERO)
            .await
            .unwrap();
        let other = oracle
            .commit(&fixtures::market_id(2), Outcome::No, B256::ZERO)
            .await
            .unwrap();
        assert_ne!(first.nonce, other.nonce);

        let market = fixtures::market_id(1);
        let replacement = oracle
            .resubmit_commit(&market, Outcome::Yes, B256::ZERO, 2 * first.gas_price, first.nonce)
            .await
            .unwrap();
        assert_eq!(replacement.nonce, first.nonce);
        let sent = chain.submissions();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[2].gas.nonce, Some(first.nonce));
        assert_eq!(chain.unmined().len(), 3);

        // only one broadcast per nonce can be mined
        chain.mine_pending();
        assert!(chain.receipt(&first.hash).await.unwrap().is_none());
        assert!(chain.receipt(&replacement.hash).await.unwrap().is_some());
        assert!(chain.receipt(&other.hash).await.unwrap().is_some());
        let stale = GasParams {
            gas_limit: first.gas_limit,
            gas_price: 3 * first.gas_price,
            nonce: Some(first.nonce),
        };
        let err = chain
            .submit(&OracleCall::Finalize { market }, stale)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Oracle(OracleError::Rpc(_))));
    }

    #[tokio::test]
    async fn first_successful_skips_reverted_and_unmined_hashes() {
        let clock = Arc::new(ManualClock::new(fixtures::t0()));
        let chain = Arc::new(FakeChain::new(clock.clone()));
        let oracle = client(&chain, &clock);
        let (reverted, mined, unknown) = (B256::repeat_byte(1), B256::repeat_byte(2), B256::repeat_byte(3));
        for (hash, success) in [(reverted, false), (mined, true)] {
            chain.put_receipt(TxReceipt {
                hash,
                success,
                block_number: Some(100),
                gas_used: 21_000,
            });
        }

        let hashes = [unknown, reverted, mined];
        assert_eq!(oracle.first_successful(&hashes).await.unwrap(), Some(mined));
        assert_eq!(oracle.first_successful(&hashes[..2]).await.unwrap(), None);
    }
}
