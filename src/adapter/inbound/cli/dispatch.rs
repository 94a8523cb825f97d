//! Global flag handling and command dispatch.

use super::command::{CheckCommand, Cli, Commands, JobsCommand, MarketsCommand};
use super::{check, jobs, markets, output, run};
use crate::error::Result;

/// Apply global flags and run the selected command.
pub async fn execute(cli: Cli) -> Result<()> {
    output::configure(output::OutputConfig::new(cli.json, cli.quiet, cli.verbose));
    output::set_color(cli.color.forced());

    match cli.command {
        Commands::Run(args) => run::execute(&args.config).await,
        Commands::Check(CheckCommand::Config(args)) => check::config::execute_config(&args.config),
        Commands::Check(CheckCommand::Health(args)) => {
            check::health::execute_health(&args.config).await
        }
        Commands::Jobs(JobsCommand::List(args)) => {
            jobs::execute_list(&args.config.config, args.status, args.limit).await
        }
        Commands::Jobs(JobsCommand::Replay(args)) => {
            jobs::execute_replay(&args.config.config, args.id).await
        }
        Commands::Markets(MarketsCommand::Show(args)) => {
            markets::execute_show(&args.config.config, args.address).await
        }
        Commands::Markets(MarketsCommand::Ingest(args)) => {
            markets::execute_ingest(&args.config.config, &args.file).await
        }
    }
}
