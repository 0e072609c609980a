//! `backdrop sources`: lists the registered image sources.

use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use crate::cli::output;
use crate::config;
use crate::error::BackdropError;
use crate::source::{SourceDescriptor, SourceRegistry};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SourceInfo<'a> {
    #[serde(flatten)]
    descriptor: &'a SourceDescriptor,
    active: bool,
}

/// Prints every registered source, marking the configured one.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<(), BackdropError> {
    #[derive(Tabled)]
    struct SourceRow {
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Display Name")]
        display_name: String,
        #[tabled(rename = "Description")]
        description: String,
        #[tabled(rename = "Active")]
        active: String,
    }

    let registry = SourceRegistry::with_builtin();
    let active = &config::get_config().source;

    if json {
        let infos: Vec<SourceInfo<'_>> = registry
            .descriptors()
            .map(|descriptor| SourceInfo {
                descriptor,
                active: &descriptor.name == active,
            })
            .collect();
        output::print_json(&infos)?;
        return Ok(());
    }

    let rows: Vec<SourceRow> = registry
        .descriptors()
        .map(|descriptor| SourceRow {
            name: descriptor.name.clone(),
            display_name: descriptor.display_name.clone(),
            description: output::clip(&descriptor.description, 60),
            active: output::active_marker(&descriptor.name == active),
        })
        .collect();

    output::print_table(&format!("Sources ({})", rows.len()), rows, true);
    if !registry.contains(active) {
        println!("{} configured source '{active}' is not registered", "Warning:".yellow());
    }
    Ok(())
}
