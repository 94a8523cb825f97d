//! Implementations of ports (hexagonal adapters).
//!
//! - [`inbound`]: drives the application (CLI, webhook payloads).
//! - [`outbound`]: driven by it (SQLite, chain, HTTP fetchers, notifiers).

pub mod inbound;
pub mod outbound;
