//! `backdrop settings`: shows and edits per-source settings.
//!
//! Settings are read and written through the settings file, so edits made
//! here are picked up the next time the source is activated.

use clap::Subcommand;
use colored::Colorize;
use tabled::Tabled;

use crate::cli::output;
use crate::config;
use crate::config::store::{JsonSettingsStore, SettingsStore};
use crate::error::BackdropError;
use crate::metamodel::store::{load_from_store, save_to_store};
use crate::metamodel::{
    ConfigValue, EditableItem, ItemKind, SourceConfiguration, discover, persist,
    to_editable_items,
};
use crate::source::SourceRegistry;

/// Source settings subcommands.
#[derive(Subcommand, Debug)]
#[command(next_display_order = None)]
pub enum SettingsCommands {
    /// Show the settings of a source with their constraints.
    Show {
        /// Source name, as listed by `backdrop sources`.
        source: String,

        /// Print the settings as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Change one setting of a source.
    #[command(after_long_help = r#"Examples:
  backdrop settings set folder path ~/Pictures/Walls
  backdrop settings set folder recursive true
  backdrop settings set folder extensions jpg png
  backdrop settings set bing timeout 45"#)]
    Set {
        source: String,

        property: String,

        /// New value. Lists take several values; durations are given in the
        /// unit shown by `settings show`.
        #[arg(required = true, num_args = 1..)]
        values: Vec<String>,
    },

    /// Restore every setting of a source to its default.
    Reset { source: String },
}

/// Execute settings subcommands.
///
/// # Errors
///
/// Returns an error if the source is unknown or not configurable, the value
/// is rejected, or the settings file cannot be written.
pub fn execute(cmd: &SettingsCommands) -> Result<(), BackdropError> {
    let registry = SourceRegistry::with_builtin();
    let store = JsonSettingsStore::open(config::settings_path())?;

    match cmd {
        SettingsCommands::Show { source, json } => {
            let (_, items) = load_settings(&registry, &store, source)?;
            if *json {
                output::print_json(&items)?;
            } else {
                print_items(source, &items);
            }
        }
        SettingsCommands::Set { source, property, values } => {
            let item = set_property(&registry, &store, source, property, values)?;
            println!(
                "{} {} = {}",
                "Saved".green().bold(),
                item.descriptor.label,
                format_value(&item)
            );
        }
        SettingsCommands::Reset { source } => {
            reset(&registry, &store, source)?;
            println!("{} settings of '{source}' restored to defaults", "Reset".green().bold());
        }
    }
    Ok(())
}

/// Reads the stored settings of `source` onto a fresh configuration.
fn load_settings(
    registry: &SourceRegistry,
    store: &dyn SettingsStore,
    source: &str,
) -> Result<(Box<dyn SourceConfiguration>, Vec<EditableItem>), BackdropError> {
    let handle = registry.create(source)?;
    let mut configuration = handle.configuration().ok_or_else(|| {
        BackdropError::SettingsError(format!("Source '{source}' has no settings"))
    })?;

    load_from_store(source, &mut configuration, store)?;
    let meta = discover(configuration.as_ref())?;
    let items = to_editable_items(&meta, configuration.as_ref());
    Ok((configuration, items))
}

/// Validates one edit and writes the whole configuration back.
///
/// Returns the edited item.
pub(crate) fn set_property(
    registry: &SourceRegistry,
    store: &dyn SettingsStore,
    source: &str,
    property: &str,
    values: &[String],
) -> Result<EditableItem, BackdropError> {
    let (mut configuration, mut items) = load_settings(registry, store, source)?;

    let index = items.iter().position(|item| item.property == property).ok_or_else(|| {
        let known: Vec<&str> = items.iter().map(|item| item.property.as_str()).collect();
        BackdropError::InvalidArguments(format!(
            "Unknown setting '{property}' for '{source}'. Known settings: {}",
            known.join(", ")
        ))
    })?;

    let value = parse_value(&items[index], values)?;
    items[index] = items[index].with_value(value);

    persist(&items, &mut configuration)?;
    save_to_store(source, configuration.as_ref(), store)?;
    Ok(items.swap_remove(index))
}

/// Writes the declared defaults of every property of `source`.
pub(crate) fn reset(
    registry: &SourceRegistry,
    store: &dyn SettingsStore,
    source: &str,
) -> Result<(), BackdropError> {
    let (mut configuration, items) = load_settings(registry, store, source)?;
    let defaults: Vec<EditableItem> = items
        .iter()
        .map(|item| item.with_value(item.descriptor.kind.default_value()))
        .collect();

    persist(&defaults, &mut configuration)?;
    save_to_store(source, configuration.as_ref(), store)?;
    Ok(())
}

/// Turns command-line words into a value of the item's kind.
pub(crate) fn parse_value(item: &EditableItem, values: &[String]) -> Result<ConfigValue, BackdropError> {
    let joined = values.join(" ");
    let invalid = |expected: &str| {
        BackdropError::InvalidArguments(format!(
            "{} expects {expected}, got '{joined}'",
            item.descriptor.label
        ))
    };

    match &item.descriptor.kind {
        ItemKind::Switch { .. } => match joined.trim().to_lowercase().as_str() {
            "true" | "on" | "yes" | "1" => Ok(ConfigValue::Bool(true)),
            "false" | "off" | "no" | "0" => Ok(ConfigValue::Bool(false)),
            _ => Err(invalid("true or false")),
        },
        ItemKind::String { .. } | ItemKind::SingleChoice { .. } => Ok(ConfigValue::Text(joined)),
        ItemKind::Duration { unit, .. } => joined
            .trim()
            .parse::<u64>()
            .map(|units| ConfigValue::Duration(unit.to_duration(units)))
            .map_err(|_| invalid(&format!("a whole number of {}", unit.suffix()))),
        ItemKind::MultiChoice { .. } => Ok(ConfigValue::TextList(
            values
                .iter()
                .flat_map(|value| value.split(','))
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .collect(),
        )),
    }
}

fn format_value(item: &EditableItem) -> String {
    match (&item.descriptor.kind, &item.value) {
        (ItemKind::Duration { unit, .. }, ConfigValue::Duration(duration)) => {
            format!("{} {}", unit.from_duration(*duration), unit.suffix())
        }
        (_, value) => value.to_string(),
    }
}

fn describe_kind(kind: &ItemKind) -> String {
    match kind {
        ItemKind::Switch { .. } => "true | false".to_string(),
        ItemKind::String { max_length, required, .. } => {
            let required = if *required { ", required" } else { "" };
            format!("text, at most {max_length} chars{required}")
        }
        ItemKind::Duration { min, max, unit, .. } => {
            format!("{min}-{max} {}", unit.suffix())
        }
        ItemKind::SingleChoice { choices, .. } => format!("one of {}", choices.join(", ")),
        ItemKind::MultiChoice { choices, allow_other_choices, .. } => {
            let other = if *allow_other_choices { " (or others)" } else { "" };
            format!("any of {}{other}", choices.join(", "))
        }
    }
}

fn print_items(source: &str, items: &[EditableItem]) {
    #[derive(Tabled)]
    struct SettingRow {
        #[tabled(rename = "Setting")]
        property: String,
        #[tabled(rename = "Label")]
        label: String,
        #[tabled(rename = "Value")]
        value: String,
        #[tabled(rename = "Accepts")]
        accepts: String,
    }

    let rows: Vec<SettingRow> = items
        .iter()
        .map(|item| SettingRow {
            property: item.property.clone(),
            label: item.descriptor.label.clone(),
            value: output::clip(&format_value(item), 40),
            accepts: output::clip(&describe_kind(&item.descriptor.kind), 50),
        })
        .collect();

    output::print_table(&format!("Settings of '{source}'"), rows, false);
}
