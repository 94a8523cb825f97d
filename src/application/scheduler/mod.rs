//! Job scheduling: durable queue, retry policy, worker pool.

pub mod handler;
pub mod service;

pub use handler::{JobHandler, JobOutcome};
pub use service::{JobQueue, JobScheduler, SchedulerConfig};
