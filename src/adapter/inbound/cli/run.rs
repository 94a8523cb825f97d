//! Handler for the `run` command.

use std::path::Path;

use crate::adapter::inbound::cli::output;
use crate::error::Result;
use crate::infrastructure::config::Config;

/// Load the configuration, print the startup summary and run until Ctrl-C.
pub async fn execute<P: AsRef<Path>>(config_path: P) -> Result<()> {
    let config = Config::load(config_path.as_ref())?;
    if output::is_json() {
        // keep stdout machine-readable
        let mut logging = config.logging.clone();
        logging.format = "json".into();
        logging.init();
    } else {
        config.init_logging();
    }

    print_startup(&config);
    serve(&config).await
}

fn print_startup(config: &Config) {
    if output::is_quiet() && !output::is_json() {
        return;
    }
    output::header(env!("CARGO_PKG_VERSION"));
    output::field("Chain ID", config.chain.chain_id);
    output::field("Oracle", format!("{:#x}", config.chain.oracle_address));
    output::field("Factory", format!("{:#x}", config.chain.factory_address));
    output::field(
        "Fetchers",
        config
            .fetchers
            .iter()
            .map(|f| f.id.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    );
    output::field("Workers", config.scheduler.workers);
    if output::verbosity() > 0 {
        output::field("Database", &config.database.url);
        output::field("RPC", &config.chain.rpc_url);
    }
    if config.chain.private_key.is_none() {
        output::warning("No signer key configured - markets will be ingested but not resolved");
    }
}

#[cfg(feature = "evm")]
async fn serve(config: &Config) -> Result<()> {
    crate::infrastructure::orchestration::run(config).await
}

#[cfg(not(feature = "evm"))]
async fn serve(_config: &Config) -> Result<()> {
    Err(crate::error::Error::Config(crate::error::ConfigError::Other(
        "running the engine needs the evm feature".into(),
    )))
}
