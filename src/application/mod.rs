//! Application services (use cases).
//!
//! These services orchestrate domain logic and coordinate adapters
//! to implement ingestion, scheduling and resolution.

pub mod health;
pub mod ingest;
pub mod metric;
pub mod monitor;
pub mod oracle;
pub mod resolution;
pub mod scheduler;
