//! CLI module for Backdrop.
//!
//! `backdrop run` hosts the orchestrator in the foreground; every other
//! command works directly on the configuration, the settings file or the
//! cache and exits.

mod commands;
mod output;

use clap::Parser;
pub use commands::Cli;

use crate::error::BackdropError;

/// Runs the CLI.
///
/// Parses command-line arguments and executes the appropriate command.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn run() -> Result<(), BackdropError> {
    let cli = Cli::parse();
    cli.execute()
}
