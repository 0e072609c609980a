//! Round-trips a configuration through the flat settings store.
//!
//! Every property is stored as a raw string under `<provider>.<property>`:
//! switches as `true`/`false`, durations as whole seconds, texts verbatim and
//! text lists as a JSON array of strings.

use std::time::Duration;

use super::descriptor::ItemKind;
use super::model::{
    EditableItem, MetaModelError, SourceConfiguration, discover, persist, to_editable_items,
    validate,
};
use super::value::{ConfigValue, ValueType};
use crate::config::store::{SettingsStore, StoreError};

/// Builds the store key for one property of a provider.
#[must_use]
pub fn settings_key(provider: &str, property: &str) -> String { format!("{provider}.{property}") }

/// Encodes a value as the raw string written to the store.
#[must_use]
pub fn encode_value(value: &ConfigValue) -> String {
    match value {
        ConfigValue::Bool(value) => value.to_string(),
        ConfigValue::Text(value) => value.clone(),
        ConfigValue::Duration(value) => value.as_secs().to_string(),
        ConfigValue::TextList(values) => {
            serde_json::to_string(values).unwrap_or_else(|_| String::from("[]"))
        }
    }
}

/// Decodes a raw store value into the given type.
///
/// Returns `None` when the raw string cannot be coerced.
#[must_use]
pub fn decode_value(raw: &str, value_type: ValueType) -> Option<ConfigValue> {
    match value_type {
        ValueType::Bool => raw.trim().parse().ok().map(ConfigValue::Bool),
        ValueType::Text => Some(ConfigValue::Text(raw.to_string())),
        ValueType::Duration => {
            raw.trim().parse().ok().map(|secs| ConfigValue::Duration(Duration::from_secs(secs)))
        }
        ValueType::TextList => serde_json::from_str(raw).ok().map(ConfigValue::TextList),
    }
}

/// Pulls a loaded duration back into the declared range.
fn clamp_duration(kind: &ItemKind, value: ConfigValue) -> ConfigValue {
    match (kind, value) {
        (ItemKind::Duration { min, max, unit, .. }, ConfigValue::Duration(duration)) => {
            let lo = unit.to_duration(*min);
            let hi = unit.to_duration(*max);
            let units = unit.from_duration(duration.clamp(lo, hi));
            ConfigValue::Duration(unit.to_duration(units.clamp(*min, *max)))
        }
        (_, value) => value,
    }
}

/// Loads every stored property of `provider` onto `config`.
///
/// Values that cannot be coerced or fail validation are skipped with a
/// warning and the configuration keeps its current value for them.
/// Out-of-range durations are clamped instead of skipped.
///
/// Returns the number of properties read from the store.
///
/// # Errors
///
/// Returns [`MetaModelError::Schema`] if the configuration's declarations are
/// inconsistent, or the error of a rejected write.
pub fn load_from_store(
    provider: &str,
    config: &mut Box<dyn SourceConfiguration>,
    store: &dyn SettingsStore,
) -> Result<usize, MetaModelError> {
    let meta = discover(config.as_ref())?;
    let current = to_editable_items(&meta, config.as_ref());

    let mut loaded = 0;
    let items: Vec<EditableItem> = current
        .iter()
        .zip(meta.entries())
        .map(|(item, entry)| {
            let key = settings_key(provider, &item.property);
            let Some(raw) = store.get(&key) else {
                return item.clone();
            };

            let Some(value) = decode_value(&raw, entry.value_type) else {
                tracing::warn!(key = %key, raw = %raw, "ignoring stored setting with wrong type");
                return item.clone();
            };

            let candidate = item.with_value(clamp_duration(&item.descriptor.kind, value));
            if let Some(failure) = validate(std::slice::from_ref(&candidate)).into_iter().next() {
                tracing::warn!(key = %key, reason = %failure, "ignoring invalid stored setting");
                return item.clone();
            }

            loaded += 1;
            candidate
        })
        .collect();

    persist(&items, config)?;
    Ok(loaded)
}

/// Writes every property of `config` to the store under `provider`.
///
/// # Errors
///
/// Returns [`StoreError::Schema`] without writing anything if the
/// configuration's declarations are inconsistent, or the store's own error
/// if it rejects the write.
pub fn save_to_store(
    provider: &str,
    config: &dyn SourceConfiguration,
    store: &dyn SettingsStore,
) -> Result<(), StoreError> {
    let meta = discover(config).map_err(|source| StoreError::Schema {
        provider: provider.to_string(),
        source,
    })?;

    let values = to_editable_items(&meta, config)
        .into_iter()
        .map(|item| (settings_key(provider, &item.property), encode_value(&item.value)))
        .collect();

    store.set_many(values)
}
