//! Market-creation event ingestion.

pub mod dedup;
pub mod listener;

pub use dedup::EventDeduplicator;
pub use listener::{EventListener, IngestOutcome, ListenerConfig};
