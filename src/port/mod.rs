//! Trait definitions (hexagonal ports). Depend only on domain.
//!
//! # Architecture
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │      Application        │
//!                    │                         │
//!     ┌──────────────┤  Domain + Port          ├──────────────┐
//!     │              │                         │              │
//!     │              └─────────────────────────┘              │
//!     │                  │             │                      │
//!     ▼                  ▼             ▼                      ▼
//! ┌─────────┐     ┌───────────┐  ┌───────────┐         ┌───────────┐
//! │  Chain  │     │  Fetcher  │  │   Store   │         │ Notifier  │
//! │ Adapter │     │  Adapter  │  │  Adapter  │         │  Adapter  │
//! └─────────┘     └───────────┘  └───────────┘         └───────────┘
//! ```

pub mod outbound;

pub use outbound::chain::{
    Broadcast, ChainReader, GasParams, MarketChainState, MarketCreatedEvent, OnChainCommitment,
    OracleCall, OracleContract,
};
pub use outbound::clock::{Clock, SystemClock};
pub use outbound::fetcher::MetricFetcher;
pub use outbound::notifier::{
    CommitEvent, Event, JobFailedEvent, LogNotifier, Notifier, NotifierRegistry, NullNotifier,
    TransactionEvent,
};
pub use outbound::store::{JobStore, MarketStore, MetricAuditStore, ResolutionStore, Store};
