//! Infrastructure configuration modules.

pub mod alerts;
pub mod chain;
pub mod database;
pub mod fetcher;
pub mod logging;
pub mod settings;

pub use alerts::{AlertsConfig, TelegramConfig};
pub use chain::ChainConfig;
pub use database::DatabaseConfig;
pub use fetcher::FetcherConfig;
pub use logging::LoggingConfig;
pub use settings::Config;
