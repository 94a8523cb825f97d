use std::path::Path;

use serde_json::json;

use crate::adapter::inbound::cli::output;
use crate::error::Result;
use crate::infrastructure::config::settings::{PRIVATE_KEY_ENV, TELEGRAM_TOKEN_ENV};
use crate::infrastructure::config::Config;

/// What `check config` reports about a loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigCheckReport {
    pub chain_id: u64,
    pub rpc_url: String,
    pub oracle: String,
    pub factory: String,
    pub fetchers: Vec<String>,
    pub workers: usize,
    pub signer_configured: bool,
    pub webhook_alerts: bool,
    pub telegram_enabled: bool,
    pub telegram_token_present: bool,
}

impl ConfigCheckReport {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chain_id: config.chain.chain_id,
            rpc_url: config.chain.rpc_url.clone(),
            oracle: format!("{:#x}", config.chain.oracle_address),
            factory: format!("{:#x}", config.chain.factory_address),
            fetchers: config.fetchers.iter().map(|f| f.id.clone()).collect(),
            workers: config.scheduler.workers,
            signer_configured: config.chain.private_key.is_some(),
            webhook_alerts: config.alerts.webhook_url.is_some(),
            telegram_enabled: config.alerts.telegram.enabled,
            telegram_token_present: config.alerts.telegram.token.is_some(),
        }
    }

    /// Problems that do not invalidate the file but will bite at runtime.
    pub fn warnings(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.signer_configured {
            out.push(format!(
                "No signer key (set {PRIVATE_KEY_ENV} to commit and finalize)"
            ));
        }
        if self.telegram_enabled && !self.telegram_token_present {
            out.push(format!(
                "Telegram enabled but {TELEGRAM_TOKEN_ENV} is not set"
            ));
        }
        out
    }
}

/// Validate configuration file without starting the engine.
pub fn execute_config<P: AsRef<Path>>(config_path: P) -> Result<()> {
    let path = config_path.as_ref();
    let config = Config::load(path)?;
    let report = ConfigCheckReport::from_config(&config);

    if output::is_json() {
        output::json_output(json!({
            "command": "check.config",
            "valid": true,
            "config": path.display().to_string(),
            "chain_id": report.chain_id,
            "oracle": report.oracle,
            "factory": report.factory,
            "fetchers": report.fetchers,
            "workers": report.workers,
            "warnings": report.warnings(),
        }));
        return Ok(());
    }

    output::section("Configuration Check");
    output::field("Config", path.display());
    output::success("Configuration file is valid");

    output::section("Summary");
    output::field("Chain ID", report.chain_id);
    output::field("RPC", &report.rpc_url);
    output::field("Oracle", &report.oracle);
    output::field("Factory", &report.factory);
    output::field("Fetchers", report.fetchers.join(", "));
    output::field("Workers", report.workers);
    if output::verbosity() > 0 {
        output::field("Webhook", report.webhook_alerts);
        output::field("Telegram", report.telegram_enabled);
    }

    for warning in report.warnings() {
        output::warning(&warning);
    }

    output::success("Configuration check complete");
    Ok(())
}
