//! Command-line interface definitions.
//!
//! Defines the CLI structure for the oracled application using `clap`:
//! running the resolution engine, diagnostic checks, and operator
//! commands over the job queue and stored markets.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use super::paths;
use crate::domain::{JobId, JobStatus, MarketId};

/// Off-chain resolution engine for on-chain prediction market oracles
#[derive(Parser, Debug)]
#[command(name = "oracled")]
#[command(version)]
pub struct Cli {
    /// Color output mode [auto, always, never]
    #[arg(
        long,
        global = true,
        default_value = "auto",
        hide_possible_values = true
    )]
    pub color: ColorChoice,

    /// JSON output for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// Decrease output verbosity
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase output verbosity
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Color output mode for terminal rendering.
#[derive(Clone, Debug, Default, clap::ValueEnum)]
pub enum ColorChoice {
    /// Detect automatically
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl ColorChoice {
    /// Color override, or `None` to detect.
    #[must_use]
    pub const fn forced(&self) -> Option<bool> {
        match self {
            Self::Auto => None,
            Self::Always => Some(true),
            Self::Never => Some(false),
        }
    }
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the resolution engine (foreground)
    Run(ConfigPathArg),

    /// Run diagnostic checks
    #[command(subcommand)]
    Check(CheckCommand),

    /// Inspect and replay resolution jobs
    #[command(subcommand)]
    Jobs(JobsCommand),

    /// Inspect and ingest markets
    #[command(subcommand)]
    Markets(MarketsCommand),
}

/// Subcommands for `oracled check`.
#[derive(Subcommand, Debug)]
pub enum CheckCommand {
    /// Validate the configuration file syntax and semantics.
    Config(ConfigPathArg),
    /// Check the database, chain, oracle and data sources once.
    Health(ConfigPathArg),
}

/// Subcommands for `oracled jobs`.
#[derive(Subcommand, Debug)]
pub enum JobsCommand {
    /// List jobs, newest first.
    List(JobsListArgs),
    /// Put a FAILED job back in the queue.
    Replay(JobReplayArgs),
}

/// Subcommands for `oracled markets`.
#[derive(Subcommand, Debug)]
pub enum MarketsCommand {
    /// Show a market with its resolution and audit trail.
    Show(MarketShowArgs),
    /// Ingest a `MarketCreated` webhook payload from a file.
    Ingest(MarketIngestArgs),
}

/// Shared argument for commands that only need a config path.
#[derive(Args, Debug)]
pub struct ConfigPathArg {
    /// Path to the configuration file.
    #[arg(short, long, default_value_os_t = paths::default_config())]
    pub config: PathBuf,
}

/// Arguments for `oracled jobs list`.
#[derive(Args, Debug)]
pub struct JobsListArgs {
    #[command(flatten)]
    pub config: ConfigPathArg,

    /// Only jobs in this status (pending, processing, retrying, completed, failed).
    #[arg(long)]
    pub status: Option<JobStatus>,

    /// Maximum number of jobs to show.
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

/// Arguments for `oracled jobs replay`.
#[derive(Args, Debug)]
pub struct JobReplayArgs {
    #[command(flatten)]
    pub config: ConfigPathArg,

    /// Job ID.
    pub id: JobId,
}

/// Arguments for `oracled markets show`.
#[derive(Args, Debug)]
pub struct MarketShowArgs {
    #[command(flatten)]
    pub config: ConfigPathArg,

    /// Market contract address.
    pub address: MarketId,
}

/// Arguments for `oracled markets ingest`.
#[derive(Args, Debug)]
pub struct MarketIngestArgs {
    #[command(flatten)]
    pub config: ConfigPathArg,

    /// JSON payload file; `-` reads stdin.
    pub file: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_parse_anywhere() {
        let cli = Cli::try_parse_from(["oracled", "check", "config", "--json", "-vv"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Check(CheckCommand::Config(_))));
    }

    #[test]
    fn run_defaults_to_home_config() {
        let cli = Cli::try_parse_from(["oracled", "run"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("Expected Run command");
        };
        assert_eq!(args.config, paths::default_config());
    }

    #[test]
    fn check_health_accepts_config() {
        let cli = Cli::try_parse_from(["oracled", "check", "health", "-c", "x.toml"]).unwrap();
        let Commands::Check(CheckCommand::Health(args)) = cli.command else {
            panic!("Expected Check Health command");
        };
        assert_eq!(args.config, PathBuf::from("x.toml"));
    }

    #[test]
    fn jobs_list_parses_status_and_limit() {
        let cli =
            Cli::try_parse_from(["oracled", "jobs", "list", "--status", "failed", "--limit", "5"])
                .unwrap();
        let Commands::Jobs(JobsCommand::List(args)) = cli.command else {
            panic!("Expected Jobs List command");
        };
        assert_eq!(args.status, Some(JobStatus::Failed));
        assert_eq!(args.limit, 5);
    }

    #[test]
    fn jobs_list_defaults() {
        let cli = Cli::try_parse_from(["oracled", "jobs", "list"]).unwrap();
        let Commands::Jobs(JobsCommand::List(args)) = cli.command else {
            panic!("Expected Jobs List command");
        };
        assert_eq!(args.status, None);
        assert_eq!(args.limit, 20);
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(Cli::try_parse_from(["oracled", "jobs", "list", "--status", "stuck"]).is_err());
    }

    #[test]
    fn replay_requires_a_uuid() {
        assert!(Cli::try_parse_from(["oracled", "jobs", "replay", "nope"]).is_err());
        let cli = Cli::try_parse_from([
            "oracled",
            "jobs",
            "replay",
            "0b5c3f7e-6f5e-4a57-9d1e-3c2a1b0f9e8d",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Jobs(JobsCommand::Replay(_))));
    }

    #[test]
    fn markets_show_parses_address() {
        let cli = Cli::try_parse_from([
            "oracled",
            "markets",
            "show",
            "0x00000000000000000000000000000000000000aa",
        ])
        .unwrap();
        let Commands::Markets(MarketsCommand::Show(args)) = cli.command else {
            panic!("Expected Markets Show command");
        };
        assert_eq!(
            args.address.to_string(),
            "0x00000000000000000000000000000000000000aa"
        );
        assert!(Cli::try_parse_from(["oracled", "markets", "show", "0x12"]).is_err());
    }

    #[test]
    fn markets_ingest_takes_a_file() {
        let cli = Cli::try_parse_from(["oracled", "markets", "ingest", "event.json"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Markets(MarketsCommand::Ingest(_))
        ));
    }

    #[test]
    fn color_choice_maps_to_override() {
        assert_eq!(ColorChoice::Auto.forced(), None);
        assert_eq!(ColorChoice::Always.forced(), Some(true));
        assert_eq!(ColorChoice::Never.forced(), Some(false));
    }

    #[test]
    fn unknown_command_fails() {
        assert!(Cli::try_parse_from(["oracled", "unknown"]).is_err());
    }
}
