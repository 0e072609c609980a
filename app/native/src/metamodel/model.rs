//! Schema discovery, validation and all-or-nothing persistence.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use super::descriptor::{ConfigurationItemDescriptor, ItemKind, PropertyDeclaration};
use super::value::{ConfigValue, ValueType};

/// A provider-owned configuration object.
///
/// Implementors declare their properties explicitly instead of relying on
/// runtime introspection; the metamodel operates purely on these
/// declarations plus `get`/`set`.
pub trait SourceConfiguration: fmt::Debug + Send + Sync {
    /// Declares every configurable property.
    fn declare(&self) -> Vec<PropertyDeclaration>;

    /// Reads the current value of `property`.
    fn get(&self, property: &str) -> Option<ConfigValue>;

    /// Writes `value` to `property`.
    ///
    /// # Errors
    ///
    /// Returns [`MetaModelError::UnknownProperty`] or
    /// [`MetaModelError::TypeMismatch`] when the write cannot be applied.
    fn set(&mut self, property: &str, value: ConfigValue) -> Result<(), MetaModelError>;

    /// Clones the configuration behind a box.
    fn clone_box(&self) -> Box<dyn SourceConfiguration>;
}

impl Clone for Box<dyn SourceConfiguration> {
    fn clone(&self) -> Self { self.clone_box() }
}

/// Errors raised by the configuration metamodel.
#[derive(Debug, Error)]
pub enum MetaModelError {
    /// A property declaration is malformed.
    #[error("Invalid configuration schema for '{property}': {reason}")]
    Schema { property: String, reason: String },

    /// One or more items violate their constraints.
    #[error("Invalid configuration: {}", format_failures(.0))]
    Validation(Vec<ValidationFailure>),

    /// The property is not declared by the configuration.
    #[error("Unknown configuration property: {0}")]
    UnknownProperty(String),

    /// The value type does not match the property.
    #[error("Property '{property}' expects {expected}, got {actual}")]
    TypeMismatch {
        property: String,
        expected: ValueType,
        actual: ValueType,
    },
}

impl MetaModelError {
    pub(crate) fn schema(property: &str, reason: impl Into<String>) -> Self {
        Self::Schema {
            property: property.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn type_mismatch(property: &str, expected: ValueType, actual: &ConfigValue) -> Self {
        Self::TypeMismatch {
            property: property.to_string(),
            expected,
            actual: actual.value_type(),
        }
    }
}

fn format_failures(failures: &[ValidationFailure]) -> String {
    failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Why a single item failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum ValidationReason {
    Required,
    TooLong { max_length: usize, length: usize },
    OutOfRange { min: u64, max: u64, value: u64 },
    NotAChoice { value: String },
    WrongType { expected: ValueType, actual: ValueType },
}

/// A constraint violation for one property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationFailure {
    pub property: String,
    pub label: String,
    #[serde(flatten)]
    pub reason: ValidationReason,
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            ValidationReason::Required => write!(f, "{} is required", self.label),
            ValidationReason::TooLong { max_length, length } => write!(
                f,
                "{} is too long ({length} characters, at most {max_length})",
                self.label
            ),
            ValidationReason::OutOfRange { min, max, value } => {
                write!(f, "{} must be between {min} and {max} (got {value})", self.label)
            }
            ValidationReason::NotAChoice { value } => {
                write!(f, "{} does not accept '{value}'", self.label)
            }
            ValidationReason::WrongType { expected, actual } => {
                write!(f, "{} expects {expected}, got {actual}", self.label)
            }
        }
    }
}

/// One discovered property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetaModelEntry {
    pub property: String,
    pub value_type: ValueType,
    pub descriptor: ConfigurationItemDescriptor,
}

/// Discovered schema of a configuration object, sorted by `(order, label)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigurationMetaModel {
    entries: Vec<MetaModelEntry>,
}

impl ConfigurationMetaModel {
    #[must_use]
    pub fn entries(&self) -> &[MetaModelEntry] { &self.entries }

    #[must_use]
    pub fn get(&self, property: &str) -> Option<&MetaModelEntry> {
        self.entries.iter().find(|entry| entry.property == property)
    }

    #[must_use]
    pub fn len(&self) -> usize { self.entries.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

/// A property paired with its current (or edited) value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditableItem {
    pub property: String,
    pub descriptor: ConfigurationItemDescriptor,
    pub value: ConfigValue,
}

impl EditableItem {
    /// Returns a copy of this item carrying `value`.
    #[must_use]
    pub fn with_value(&self, value: ConfigValue) -> Self {
        Self {
            value,
            ..self.clone()
        }
    }
}

/// Builds the metamodel of `config` from its declarations.
///
/// # Errors
///
/// Returns [`MetaModelError::Schema`] when a declaration is inconsistent:
/// its type is not allowed for its kind, the live value has another type,
/// the property is declared twice, or its constraints contradict each other.
pub fn discover(config: &dyn SourceConfiguration) -> Result<ConfigurationMetaModel, MetaModelError> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for declaration in config.declare() {
        let PropertyDeclaration { property, value_type, descriptor } = declaration;

        if !seen.insert(property.clone()) {
            return Err(MetaModelError::schema(&property, "declared more than once"));
        }

        if !descriptor.kind.accepts(value_type) {
            return Err(MetaModelError::schema(
                &property,
                format!("a {} item cannot hold a {value_type} value", descriptor.kind.name()),
            ));
        }

        match config.get(&property) {
            Some(value) if value.value_type() != value_type => {
                return Err(MetaModelError::schema(
                    &property,
                    format!("declared as {value_type} but holds {}", value.value_type()),
                ));
            }
            Some(_) => {}
            None => return Err(MetaModelError::schema(&property, "declared but not readable")),
        }

        check_constraints(&property, &descriptor.kind)?;

        entries.push(MetaModelEntry { property, value_type, descriptor });
    }

    entries.sort_by(|a, b| {
        a.descriptor.order.cmp(&b.descriptor.order).then_with(|| {
            a.descriptor.label.to_lowercase().cmp(&b.descriptor.label.to_lowercase())
        })
    });

    Ok(ConfigurationMetaModel { entries })
}

/// Rejects kinds whose constraints contradict each other.
fn check_constraints(property: &str, kind: &ItemKind) -> Result<(), MetaModelError> {
    match kind {
        ItemKind::Switch { .. } => Ok(()),
        ItemKind::String { max_length, default, .. } => {
            if *max_length == 0 {
                return Err(MetaModelError::schema(property, "max length must be positive"));
            }
            if default.chars().count() > *max_length {
                return Err(MetaModelError::schema(property, "default exceeds max length"));
            }
            Ok(())
        }
        ItemKind::Duration { min, max, default, .. } => {
            if min > max {
                return Err(MetaModelError::schema(property, format!("min {min} exceeds max {max}")));
            }
            if default < min || default > max {
                return Err(MetaModelError::schema(property, "default is outside [min, max]"));
            }
            Ok(())
        }
        ItemKind::SingleChoice { choices, default } => {
            if choices.is_empty() {
                return Err(MetaModelError::schema(property, "choice set is empty"));
            }
            if !choices.contains(default) {
                return Err(MetaModelError::schema(property, "default is not a choice"));
            }
            Ok(())
        }
        ItemKind::MultiChoice { choices, allow_other_choices, default } => {
            if !allow_other_choices && default.iter().any(|value| !choices.contains(value)) {
                return Err(MetaModelError::schema(property, "default contains unknown choices"));
            }
            Ok(())
        }
    }
}

/// Reads every discovered property off `config`, in metamodel order.
#[must_use]
pub fn to_editable_items(
    meta: &ConfigurationMetaModel,
    config: &dyn SourceConfiguration,
) -> Vec<EditableItem> {
    meta.entries
        .iter()
        .map(|entry| EditableItem {
            property: entry.property.clone(),
            descriptor: entry.descriptor.clone(),
            value: config
                .get(&entry.property)
                .unwrap_or_else(|| entry.descriptor.kind.default_value()),
        })
        .collect()
}

/// Checks every item against its constraints.
///
/// Returns the list of failures; an empty list means all items are valid.
#[must_use]
pub fn validate(items: &[EditableItem]) -> Vec<ValidationFailure> {
    items
        .iter()
        .filter_map(|item| {
            validate_item(item).map(|reason| ValidationFailure {
                property: item.property.clone(),
                label: item.descriptor.label.clone(),
                reason,
            })
        })
        .collect()
}

fn validate_item(item: &EditableItem) -> Option<ValidationReason> {
    let kind = &item.descriptor.kind;
    if !kind.accepts(item.value.value_type()) {
        return Some(ValidationReason::WrongType {
            expected: kind.allowed_types()[0],
            actual: item.value.value_type(),
        });
    }

    match (kind, &item.value) {
        (ItemKind::String { max_length, required, .. }, ConfigValue::Text(text)) => {
            if *required && text.trim().is_empty() {
                return Some(ValidationReason::Required);
            }
            let length = text.chars().count();
            (length > *max_length).then_some(ValidationReason::TooLong {
                max_length: *max_length,
                length,
            })
        }
        (ItemKind::Duration { min, max, unit, .. }, ConfigValue::Duration(duration)) => {
            let value = unit.from_duration(*duration);
            let exact = unit.to_duration(value) == *duration;
            (!exact || value < *min || value > *max).then_some(ValidationReason::OutOfRange {
                min: *min,
                max: *max,
                value,
            })
        }
        (ItemKind::SingleChoice { choices, .. }, ConfigValue::Text(text)) => {
            (!choices.contains(text)).then(|| ValidationReason::NotAChoice { value: text.clone() })
        }
        (
            ItemKind::MultiChoice { choices, allow_other_choices, .. },
            ConfigValue::TextList(values),
        ) => {
            if *allow_other_choices {
                return None;
            }
            values
                .iter()
                .find(|value| !choices.contains(value))
                .map(|value| ValidationReason::NotAChoice { value: value.clone() })
        }
        _ => None,
    }
}

/// Replaces each item's descriptor with the one `meta` discovered for its
/// property, keeping only the edited value.
///
/// Items coming from outside carry constraints that cannot be trusted;
/// binding them to the schema makes [`validate`] check the real ones.
///
/// # Errors
///
/// Returns [`MetaModelError::UnknownProperty`] for a property `meta` does
/// not declare.
pub fn bind_to_schema(
    meta: &ConfigurationMetaModel,
    items: &[EditableItem],
) -> Result<Vec<EditableItem>, MetaModelError> {
    items
        .iter()
        .map(|item| {
            let entry = meta
                .get(&item.property)
                .ok_or_else(|| MetaModelError::UnknownProperty(item.property.clone()))?;
            Ok(EditableItem {
                property: entry.property.clone(),
                descriptor: entry.descriptor.clone(),
                value: item.value.clone(),
            })
        })
        .collect()
}

/// Validates `items` and writes them onto `config`.
///
/// The writes are staged on a clone of `config`, which replaces the original
/// only after every value was applied. On any error `config` is untouched.
///
/// # Errors
///
/// Returns [`MetaModelError::Validation`] carrying every failure, or the
/// error of the first write the configuration rejected.
pub fn persist(
    items: &[EditableItem],
    config: &mut Box<dyn SourceConfiguration>,
) -> Result<(), MetaModelError> {
    let failures = validate(items);
    if !failures.is_empty() {
        return Err(MetaModelError::Validation(failures));
    }

    let mut staged = config.clone_box();
    for item in items {
        staged.set(&item.property, item.value.clone())?;
    }

    *config = staged;
    Ok(())
}

/// Copies every property `target` declares from `from` onto `target`.
///
/// Properties `from` does not expose keep their current value. Used by
/// providers to adopt a configuration handed back by the orchestrator
/// without knowing its concrete type.
///
/// # Errors
///
/// Returns the first write `target` rejects.
pub fn copy_values(
    target: &mut dyn SourceConfiguration,
    from: &dyn SourceConfiguration,
) -> Result<(), MetaModelError> {
    for declaration in target.declare() {
        if let Some(value) = from.get(&declaration.property) {
            target.set(&declaration.property, value)?;
        }
    }
    Ok(())
}
