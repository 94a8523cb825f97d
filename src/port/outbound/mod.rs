//! Outbound ports (driven side): interfaces implemented by outbound adapters.
//!
//! These contracts describe infrastructure dependencies such as storage,
//! data sources, the chain, notifications and time.

pub mod chain;
pub mod clock;
pub mod fetcher;
pub mod notifier;
pub mod store;
