//! Builders for domain values used across tests.
//!
//! Everything is anchored at [`t0`] so tests can reason about windows and
//! dispute periods with plain offsets.

use alloy_primitives::{Address, B256, I256};
use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::domain::{
    pow10, Economics, Market, MarketId, MarketParams, MetricValue, OracleSpec, Predicate,
    PredicateOp, ResolutionWindow, Subject, WindowKind,
};
use crate::port::MarketCreatedEvent;

/// Decimals used by every price fixture.
pub const PRICE_DECIMALS: u8 = 8;

/// `2023-11-14T22:13:20Z`.
pub fn t0() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

/// `TOKEN_PRICE:ETH` with 8 decimals.
pub fn eth_subject() -> Subject {
    Subject::token_price("ETH", PRICE_DECIMALS)
}

/// `whole` scaled to 8 decimals.
pub fn scaled(whole: i64) -> I256 {
    I256::try_from(whole).unwrap() * pow10(PRICE_DECIMALS).unwrap()
}

/// ETH price from the `pyth` source observed at [`t0`].
pub fn eth_price(whole: i64, confidence: f64) -> MetricValue {
    price_from("pyth", whole, confidence)
}

/// Price from an arbitrary source observed at [`t0`].
pub fn price_from(source: &str, whole: i64, confidence: f64) -> MetricValue {
    MetricValue::new(scaled(whole), PRICE_DECIMALS, source, confidence, t0())
}

/// Deterministic market address derived from `n`.
pub fn market_id(n: u64) -> MarketId {
    let mut bytes = [0u8; 20];
    bytes[0] = 0xaa;
    bytes[12..].copy_from_slice(&n.to_be_bytes());
    MarketId::new(Address::from(bytes))
}

/// Factory contract emitting `MarketCreated`.
pub fn factory_address() -> Address {
    Address::repeat_byte(0xfa)
}

/// Single-source oracle spec.
pub fn oracle_spec(primary: &str) -> OracleSpec {
    OracleSpec {
        primary_source_id: primary.to_string(),
        fallback_source_id: None,
        rounding_decimals: PRICE_DECIMALS,
        aggregation: None,
        min_sources: 1,
    }
}

/// `ETH > threshold` resolving at [`t0`] against `pyth`.
pub fn params_gt(threshold_whole: i64) -> MarketParams {
    MarketParams {
        subject: eth_subject(),
        predicate: Predicate::new(PredicateOp::Gt, scaled(threshold_whole)),
        window: ResolutionWindow {
            kind: WindowKind::Snapshot,
            t_start: t0() - Duration::days(1),
            t_end: t0(),
        },
        oracle_spec: oracle_spec("pyth"),
        cutoff_time: t0() - Duration::hours(1),
        economics: Economics::default(),
    }
}

/// `ACTIVE` market `n` built from [`params_gt`]`(3000)`.
pub fn market(n: u64) -> Market {
    let mut market = Market::from_params(market_id(n), params_gt(3_000), t0() - Duration::days(1));
    market.title = format!("ETH above 3000 #{n}");
    market.creator = format!("{:#x}", Address::repeat_byte(0xcc));
    market.market_type = "CPMM".to_string();
    market
}

/// `MarketCreated` for market `n`, logged in `block` at `log_index`.
pub fn created_event(n: u64, block: u64, log_index: u64, params: &MarketParams) -> MarketCreatedEvent {
    MarketCreatedEvent {
        market: market_id(n),
        creator: Address::repeat_byte(0xcc),
        market_type: "CPMM".to_string(),
        params: serde_json::to_value(params).unwrap(),
        transaction_hash: B256::left_padding_from(&n.to_be_bytes()),
        log_index,
        block_number: block,
        contract_address: factory_address(),
    }
}
