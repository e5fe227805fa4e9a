//! Command-line interface module.

mod args;
pub mod build;

pub use args::{Cli, Commands, PassArgs};

use anyhow::Result;

/// Dispatch a parsed command line.
pub async fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Build { args } => build::build(cli, args).await,
        Commands::Watch { args } => crate::watch::watch(cli, args).await,
    }
}
