//! `validate` command

mod handler;

pub use handler::handle_validate_command;

use clap::Args;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Pipeline definition (TOML)
    pub pipeline: PathBuf,

    /// Rejected rows listed per stage
    #[arg(long, default_value_t = 10)]
    pub error_limit: usize,
}
