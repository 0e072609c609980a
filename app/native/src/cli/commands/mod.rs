//! CLI command definitions using Clap.
//!
//! This module defines all CLI commands and their arguments, organized into
//! domain-specific submodules:
//!
//! - `cache` - Image cache management
//! - `config_cmd` - Configuration file management
//! - `daemon` - Running the orchestrator (`run` and `fetch`)
//! - `settings` - Per-source settings
//! - `sources` - Registered image sources

use clap::{Parser, Subcommand};

use crate::error::BackdropError;
use crate::{config, schema};

pub mod cache;
pub mod config_cmd;
pub mod daemon;
pub mod settings;
pub mod sources;

pub use cache::CacheCommands;
pub use config_cmd::ConfigCommands;
pub use settings::SettingsCommands;

/// Application version from Cargo.toml.
const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Backdrop CLI - rotates the desktop background from pluggable image sources.
#[derive(Parser, Debug)]
#[command(name = "backdrop")]
#[command(author, version = APP_VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to a custom configuration file.
    ///
    /// Overrides the default configuration file search paths.
    /// Supports JSONC format (JSON with comments).
    #[arg(long, short, global = true, value_name = "PATH")]
    pub config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
#[command(next_display_order = None)]
pub enum Commands {
    /// Run the wallpaper rotation in the foreground.
    ///
    /// Activates the configured source, fetches a first image, then keeps
    /// rotating on the configured interval. Configuration file edits are
    /// applied while running. Stop with Ctrl-C.
    Run,

    /// Fetch, process and apply one wallpaper, then exit.
    #[command(after_long_help = r#"Examples:
  backdrop fetch                   # Use the configured source
  backdrop fetch --source folder   # Use another source once
  backdrop fetch --dry-run --json  # Process without touching the desktop"#)]
    Fetch {
        /// Source to fetch from instead of the configured one.
        #[arg(long, short, value_name = "NAME")]
        source: Option<String>,

        /// Process and cache the image without setting the desktop background.
        #[arg(long)]
        dry_run: bool,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List the registered image sources.
    Sources {
        /// Print the sources as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show or edit the settings of an image source.
    #[command(subcommand)]
    Settings(SettingsCommands),

    /// Cache management commands.
    ///
    /// Inspect, trim or clear the image cache.
    #[command(subcommand)]
    Cache(CacheCommands),

    /// Configuration file management commands.
    ///
    /// Initialize, view, and manage the configuration file.
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Output Backdrop configuration JSON Schema.
    ///
    /// Outputs a JSON Schema to stdout that describes the structure of the
    /// Backdrop configuration file. Can be redirected to a file for use with
    /// editors that support JSON Schema validation.
    Schema,
}

impl Cli {
    /// Returns the custom config path if specified via --config flag.
    #[must_use]
    pub fn config_path(&self) -> Option<std::path::PathBuf> {
        self.config.as_ref().map(std::path::PathBuf::from)
    }

    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command execution fails.
    pub fn execute(&self) -> Result<(), BackdropError> {
        if let Some(path_buf) = self.config_path() {
            if !path_buf.exists() {
                return Err(BackdropError::ConfigError(format!(
                    "Configuration file not found: {}",
                    path_buf.display()
                )));
            }
            config::set_custom_config_path(path_buf);
        }

        match &self.command {
            Commands::Run => daemon::run(),
            Commands::Fetch { source, dry_run, json } => {
                daemon::fetch_once(source.as_deref(), *dry_run, *json)
            }
            Commands::Sources { json } => sources::execute(*json),
            Commands::Settings(cmd) => settings::execute(cmd),
            Commands::Cache(cmd) => cache::execute(cmd),
            Commands::Config(cmd) => config_cmd::execute(cmd),
            Commands::Schema => {
                println!("{}", schema::generate_schema_json());
                Ok(())
            }
        }
    }
}
