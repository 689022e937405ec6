//! `run` and `import` commands

mod handler;

pub use handler::{handle_import_command, handle_run_command};

use clap::Args;
use std::path::PathBuf;

use crate::cli::SyncArgs;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Pipeline definition (TOML)
    pub pipeline: PathBuf,

    #[command(flatten)]
    pub sync: SyncArgs,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Pipeline definition (TOML)
    pub pipeline: PathBuf,

    /// Name of the stage to run
    #[arg(long, short)]
    pub stage: String,

    /// Input file; defaults to the one declared for the stage
    pub input: Option<PathBuf>,

    #[command(flatten)]
    pub sync: SyncArgs,
}
