//! Application configuration loading and validation.
//!
//! Provides the main [`Config`] struct that aggregates all application settings.
//! Configuration is loaded from a TOML file; secrets come from the environment
//! only (`ORACLED_PRIVATE_KEY`, `ORACLED_TELEGRAM_TOKEN`, and each fetcher's
//! `api_key_env`).
//!
//! # Example
//!
//! ```no_run
//! use oracled::infrastructure::config::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.toml")?;
//!     config.init_logging();
//!     Ok(())
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;

use alloy_primitives::Address;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::alerts::AlertsConfig;
use super::chain::ChainConfig;
use super::database::DatabaseConfig;
use super::fetcher::FetcherConfig;
use super::logging::LoggingConfig;
use crate::application::health::HealthConfig;
use crate::application::ingest::ListenerConfig;
use crate::application::metric::ValidationConfig;
use crate::application::monitor::MonitorConfig;
use crate::application::oracle::GasConfig;
use crate::application::scheduler::SchedulerConfig;
use crate::error::{ConfigError, Result};

/// Environment variable holding the oracle signer key.
pub const PRIVATE_KEY_ENV: &str = "ORACLED_PRIVATE_KEY";

/// Environment variable holding the Telegram bot token.
pub const TELEGRAM_TOKEN_ENV: &str = "ORACLED_TELEGRAM_TOKEN";

/// Main application configuration.
///
/// Load from a TOML file using [`Config::load`] or parse directly with
/// [`Config::parse_toml`].
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// SQLite location.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging and tracing configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// RPC endpoint and contract addresses.
    #[serde(default)]
    pub chain: ChainConfig,

    /// Gas padding, ceiling and escalation tiers.
    #[serde(default)]
    pub gas: GasConfig,

    /// `MarketCreated` log polling.
    #[serde(default)]
    pub listener: ListenerConfig,

    /// Worker pool and retry policy.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Transaction receipt polling.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Metric quality thresholds.
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Metric data sources, in fallback order.
    #[serde(default)]
    pub fetchers: Vec<FetcherConfig>,

    /// Periodic component checks.
    #[serde(default)]
    pub health: HealthConfig,

    /// Alert rules and channels.
    #[serde(default)]
    pub alerts: AlertsConfig,
}

impl Config {
    /// Parse configuration from TOML content and load secrets from the
    /// process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML content is malformed or validation fails.
    #[allow(clippy::result_large_err)]
    pub fn parse_toml(content: &str) -> Result<Self> {
        Self::parse_toml_with_env(content, |name| std::env::var(name).ok())
    }

    /// Like [`Config::parse_toml`] with an explicit environment lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML content is malformed or validation fails.
    #[allow(clippy::result_large_err)]
    pub fn parse_toml_with_env<F>(content: &str, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.load_secrets(env)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the TOML content is
    /// malformed, or validation fails.
    #[allow(clippy::result_large_err)]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    #[allow(clippy::result_large_err)]
    fn load_secrets<F>(&mut self, env: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| env(name).filter(|v| !v.trim().is_empty());

        self.chain.private_key = non_empty(PRIVATE_KEY_ENV);
        self.alerts.telegram.token = non_empty(TELEGRAM_TOKEN_ENV);

        for fetcher in &mut self.fetchers {
            let Some(var) = fetcher.api_key_env.as_deref() else {
                continue;
            };
            match non_empty(var) {
                Some(key) => fetcher.api_key = Some(key),
                None => {
                    return Err(ConfigError::Other(format!(
                        "fetcher {} expects an API key in {var}",
                        fetcher.id
                    ))
                    .into())
                }
            }
        }
        Ok(())
    }

    /// Validate configuration values.
    ///
    /// Checks that all required fields are present and values are within
    /// acceptable ranges.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "database.url",
            }
            .into());
        }
        if !self.logging.is_known_format() {
            return Err(ConfigError::InvalidValue {
                field: "logging.format",
                reason: format!("unknown format {:?}", self.logging.format),
            }
            .into());
        }

        self.validate_chain()?;

        if self.gas.gas_limit_multiplier < Decimal::ONE {
            return Err(ConfigError::InvalidValue {
                field: "gas.gas_limit_multiplier",
                reason: "must be >= 1".to_string(),
            }
            .into());
        }
        if self.gas.max_gas_price_gwei == 0 {
            return Err(ConfigError::InvalidValue {
                field: "gas.max_gas_price_gwei",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.gas.escalation_low <= Decimal::ONE
            || self.gas.escalation_medium < self.gas.escalation_low
            || self.gas.escalation_high < self.gas.escalation_medium
        {
            return Err(ConfigError::InvalidValue {
                field: "gas.escalation",
                reason: "tiers must be ordered 1 < low <= medium <= high".to_string(),
            }
            .into());
        }

        if self.listener.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "listener.poll_interval_ms",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.listener.max_block_range == 0 {
            return Err(ConfigError::InvalidValue {
                field: "listener.max_block_range",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.scheduler.workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scheduler.workers",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.scheduler.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scheduler.max_attempts",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.scheduler.max_backoff_secs < self.scheduler.base_backoff_secs {
            return Err(ConfigError::InvalidValue {
                field: "scheduler.max_backoff_secs",
                reason: "must be >= base_backoff_secs".to_string(),
            }
            .into());
        }

        if self.monitor.poll_interval_ms == 0 || self.monitor.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "monitor",
                reason: "poll interval and timeout must be greater than 0".to_string(),
            }
            .into());
        }

        if !(0.0..=1.0).contains(&self.validation.min_confidence) {
            return Err(ConfigError::InvalidValue {
                field: "validation.min_confidence",
                reason: "must be between 0 and 1".to_string(),
            }
            .into());
        }
        if self.validation.max_staleness_secs < 0 || self.validation.max_future_skew_secs < 0 {
            return Err(ConfigError::InvalidValue {
                field: "validation",
                reason: "durations must not be negative".to_string(),
            }
            .into());
        }

        self.validate_fetchers()?;

        if self.health.interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "health.interval_secs",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.alerts.telegram.enabled && self.alerts.telegram.chat_id.is_none() {
            return Err(ConfigError::MissingField {
                field: "alerts.telegram.chat_id",
            }
            .into());
        }
        if let Some(url) = &self.alerts.webhook_url {
            url::Url::parse(url).map_err(|e| ConfigError::InvalidValue {
                field: "alerts.webhook_url",
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    #[allow(clippy::result_large_err)]
    fn validate_chain(&self) -> Result<()> {
        if self.chain.rpc_url.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "chain.rpc_url",
            }
            .into());
        }
        url::Url::parse(&self.chain.rpc_url).map_err(|e| ConfigError::InvalidValue {
            field: "chain.rpc_url",
            reason: e.to_string(),
        })?;
        if self.chain.oracle_address == Address::ZERO {
            return Err(ConfigError::MissingField {
                field: "chain.oracle_address",
            }
            .into());
        }
        if self.chain.factory_address == Address::ZERO {
            return Err(ConfigError::MissingField {
                field: "chain.factory_address",
            }
            .into());
        }
        if self.chain.rpc_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "chain.rpc_timeout_ms",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        Ok(())
    }

    #[allow(clippy::result_large_err)]
    fn validate_fetchers(&self) -> Result<()> {
        if self.fetchers.is_empty() {
            return Err(ConfigError::MissingField { field: "fetchers" }.into());
        }
        let mut ids = HashSet::new();
        for fetcher in &self.fetchers {
            if fetcher.id.trim().is_empty() {
                return Err(ConfigError::MissingField {
                    field: "fetchers.id",
                }
                .into());
            }
            if !ids.insert(fetcher.id.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "fetchers.id",
                    reason: format!("duplicate fetcher id {}", fetcher.id),
                }
                .into());
            }
            url::Url::parse(&fetcher.base_url).map_err(|e| ConfigError::InvalidValue {
                field: "fetchers.base_url",
                reason: format!("{}: {e}", fetcher.id),
            })?;
            if fetcher.kinds.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "fetchers.kinds",
                    reason: format!("{} serves no subject kinds", fetcher.id),
                }
                .into());
            }
            if fetcher.resilience.timeout_ms == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "fetchers.timeout_ms",
                    reason: format!("{}: must be greater than 0", fetcher.id),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Initialize logging with the configured settings.
    pub fn init_logging(&self) {
        self.logging.init();
    }
}
