//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`clock`]: `ManualClock`, a settable [`Clock`](crate::port::Clock).
//! - [`fetcher`]: `ScriptedFetcher`, a [`MetricFetcher`](crate::port::MetricFetcher)
//!   that replays queued results.
//! - [`chain`]: `FakeChain`, an in-process oracle contract and chain reader.
//! - [`notifier`]: `RecordingNotifier`, captures emitted events.
//! - [`fixtures`]: builders for subjects, markets, params and events.

pub mod chain;
pub mod clock;
pub mod fetcher;
pub mod fixtures;
pub mod notifier;

pub use chain::{FakeChain, Mining};
pub use clock::ManualClock;
pub use fetcher::ScriptedFetcher;
pub use notifier::RecordingNotifier;
