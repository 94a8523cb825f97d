//! oracled - off-chain resolution engine for on-chain prediction market
//! oracles.
//!
//! The engine watches a market factory for `MarketCreated` events, waits
//! until each market's resolution window closes, fetches the measured
//! value from one or more HTTP data sources, evaluates the market's
//! predicate with exact fixed-point arithmetic, and commits the outcome
//! (`YES = 1`, `NO = 2`) together with a content hash of the data to the
//! oracle contract. Once the dispute window has passed it finalizes the
//! commitment.
//!
//! # Architecture
//!
//! Hexagonal layout:
//!
//! - [`domain`] - markets, jobs, metric values, resolutions, fixed-point math
//! - [`port`] - traits for the chain, data sources, storage, notifiers, time
//! - [`application`] - ingestion, job scheduling, metric validation,
//!   oracle client, transaction monitor, resolution state machine, health
//! - [`adapter`] - SQLite, alloy EVM client, reqwest fetchers, notifiers,
//!   CLI and webhook payload decoding
//! - [`infrastructure`] - configuration, wiring, runtime lifecycle
//!
//! # Features
//!
//! - `evm` (default) - alloy-backed chain access
//! - `telegram` (default) - Telegram alert channel
//! - `testkit` - in-process fakes for integration tests

pub mod adapter;
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod port;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
