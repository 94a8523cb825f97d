//! SQLite persistence adapter.
//!
//! Markets, jobs, resolutions and the metric audit log stored with Diesel
//! ORM behind an r2d2 pool.

pub mod database;
pub mod store;

pub use database::connection::{create_pool, run_migrations, DbPool};
pub use store::SqliteStore;
