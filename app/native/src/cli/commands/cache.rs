//! Cache CLI commands.

use std::collections::HashSet;

use clap::Subcommand;
use colored::Colorize;
use serde::Serialize;

use crate::cache::{ArtifactKind, ImageCache, format_bytes};
use crate::cli::output;
use crate::config;
use crate::error::BackdropError;

/// Cache management commands.
#[derive(Subcommand, Debug)]
#[command(next_display_order = None)]
pub enum CacheCommands {
    /// Show the cache location, entry counts and size.
    Info {
        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the cache directory path.
    Path,

    /// Apply the configured size and age limits now.
    Evict,

    /// Delete every cached image.
    Clear,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct CacheSummary {
    path: String,
    raw: usize,
    processed: usize,
    total_bytes: u64,
}

fn summarize(cache: &ImageCache) -> Result<CacheSummary, BackdropError> {
    let entries = cache.entries()?;
    let raw = entries.iter().filter(|entry| entry.kind == ArtifactKind::Raw).count();
    Ok(CacheSummary {
        path: cache.root().display().to_string(),
        raw,
        processed: entries.len() - raw,
        total_bytes: entries.iter().map(|entry| entry.size).sum(),
    })
}

/// Execute cache subcommands.
///
/// # Errors
///
/// Returns an error if the cache directory cannot be read or modified.
pub fn execute(cmd: &CacheCommands) -> Result<(), BackdropError> {
    let cache_config = &config::get_config().cache;
    let cache = cache_config.cache();

    match cmd {
        CacheCommands::Info { json } => {
            let summary = summarize(&cache)?;
            if *json {
                output::print_json(&summary)?;
            } else {
                println!("{} {}", "Location:".bold(), summary.path);
                println!("{} {}", "Raw images:".bold(), summary.raw);
                println!("{} {}", "Processed images:".bold(), summary.processed);
                println!("{} {}", "Total size:".bold(), format_bytes(summary.total_bytes));
            }
        }
        CacheCommands::Path => println!("{}", cache.root().display()),
        CacheCommands::Evict => {
            let policy = cache_config.policy();
            if policy.is_unbounded() {
                println!("No cache limits configured; nothing to evict.");
                return Ok(());
            }
            let report = cache.evict(&policy, &HashSet::new())?;
            println!(
                "Removed {} entries, freed {} ({} remaining).",
                report.removed.len(),
                format_bytes(report.freed),
                format_bytes(report.remaining)
            );
        }
        CacheCommands::Clear => {
            let freed = cache.clear()?;
            if freed == 0 {
                println!("Cache is already empty.");
            } else {
                println!("Cache cleared ({} freed).", format_bytes(freed));
            }
        }
    }
    Ok(())
}
