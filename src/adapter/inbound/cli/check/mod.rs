//! Configuration and health check command handlers.

pub mod config;
pub mod health;
