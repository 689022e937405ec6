//! Command-line interface

pub mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use commands::sync::{ImportArgs, RunArgs};
use commands::validate::ValidateArgs;

#[derive(Parser)]
#[command(name = "cms-sync")]
#[command(about = "Synchronize CSV sources into a CMS collection API")]
#[command(version)]
pub struct Cli {
    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run every stage of a pipeline in order
    Run(RunArgs),
    /// Run a single stage, optionally from another input file
    Import(ImportArgs),
    /// Check a pipeline and its inputs without contacting the CMS
    Validate(ValidateArgs),
}

/// Connection and execution settings shared by `run` and `import`
#[derive(Debug, Clone, Args)]
pub struct SyncArgs {
    /// Base URL of the collection API, e.g. https://cms.example.com/api
    #[arg(long, env = "CMS_SYNC_URL")]
    pub url: Option<String>,

    /// Bearer token for the API
    #[arg(long, env = "CMS_SYNC_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Maximum records (and HTTP requests) in flight
    #[arg(long, default_value_t = 8)]
    pub concurrency: usize,

    /// Attempts per call, the first one included
    #[arg(long, default_value_t = 3)]
    pub retries: u32,

    /// Base retry delay; attempt n waits n times this
    #[arg(long, default_value_t = 500)]
    pub retry_base_ms: u64,

    /// Upper bound of the random jitter added to each retry delay
    #[arg(long, default_value_t = 250)]
    pub retry_jitter_ms: u64,

    /// Timeout of a single HTTP attempt
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Stop starting new records after this many seconds
    #[arg(long)]
    pub deadline_secs: Option<u64>,

    /// Page size for reference preloads
    #[arg(long, default_value_t = 100)]
    pub page_size: u32,

    /// Resolve and report without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Run later stages even after a stage had failures
    #[arg(long)]
    pub continue_on_error: bool,

    /// Stop starting new records after the first failure
    #[arg(long)]
    pub abort_on_failure: bool,

    /// Exit with status 0 even when records failed
    #[arg(long)]
    pub no_fail_on_error: bool,

    /// Send updates even when the remote values already match
    #[arg(long)]
    pub always_update: bool,

    /// Number of failures listed in the summary
    #[arg(long, default_value_t = 10)]
    pub error_limit: usize,

    /// Write the list of created entities to this JSON file
    #[arg(long)]
    pub journal: Option<PathBuf>,
}

pub async fn run(cli: Cli) -> Result<ExitCode> {
    if cli.no_color {
        colored::control::set_override(false);
    }

    match cli.command {
        Commands::Run(args) => commands::sync::handle_run_command(args).await,
        Commands::Import(args) => commands::sync::handle_import_command(args).await,
        Commands::Validate(args) => commands::validate::handle_validate_command(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_import_arguments() {
        let cli = Cli::parse_from([
            "cms-sync",
            "import",
            "pipeline.toml",
            "--stage",
            "stores",
            "stores-2024.csv",
            "--dry-run",
        ]);

        match cli.command {
            Commands::Import(args) => {
                assert_eq!(args.stage, "stores");
                assert_eq!(args.input, Some(PathBuf::from("stores-2024.csv")));
                assert!(args.sync.dry_run);
            }
            _ => panic!("expected import"),
        }
    }
}
