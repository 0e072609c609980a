//! Declarative metadata describing one configurable property.
//!
//! Sources never expose their configuration types to the rest of the
//! application. Instead each property is declared with a
//! [`ConfigurationItemDescriptor`] carrying its label, ordering index and a
//! kind-specific set of constraints ([`ItemKind`]).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::value::{ConfigValue, ValueType};

/// Unit used to present and bound a duration property.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DurationUnit {
    #[default]
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl DurationUnit {
    /// Number of seconds in one unit.
    #[must_use]
    pub const fn multiplier(self) -> u64 {
        match self {
            Self::Seconds => 1,
            Self::Minutes => 60,
            Self::Hours => 60 * 60,
            Self::Days => 24 * 60 * 60,
        }
    }

    /// Short suffix used for display.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Seconds => "s",
            Self::Minutes => "min",
            Self::Hours => "h",
            Self::Days => "d",
        }
    }

    /// Converts a whole number of units into a duration.
    #[must_use]
    pub const fn to_duration(self, units: u64) -> Duration {
        Duration::from_secs(units.saturating_mul(self.multiplier()))
    }

    /// Converts a duration into whole units, rounding down.
    #[must_use]
    pub const fn from_duration(self, duration: Duration) -> u64 {
        duration.as_secs() / self.multiplier()
    }
}

/// The kind of a configuration item together with its constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ItemKind {
    /// On/off toggle.
    Switch { default: bool },

    /// Free text with an upper length bound.
    #[serde(rename_all = "camelCase")]
    String {
        max_length: usize,
        required: bool,
        default: String,
    },

    /// Time span bounded by `[min, max]`, expressed in `unit`s.
    Duration {
        min: u64,
        max: u64,
        unit: DurationUnit,
        default: u64,
    },

    /// Exactly one value out of a closed set.
    SingleChoice { choices: Vec<String>, default: String },

    /// Any subset of a closed set, optionally extended with free-form values.
    #[serde(rename_all = "camelCase")]
    MultiChoice {
        choices: Vec<String>,
        allow_other_choices: bool,
        default: Vec<String>,
    },
}

impl ItemKind {
    /// Short name of the kind, used in messages.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Switch { .. } => "switch",
            Self::String { .. } => "string",
            Self::Duration { .. } => "duration",
            Self::SingleChoice { .. } => "single choice",
            Self::MultiChoice { .. } => "multi choice",
        }
    }

    /// Value types a property of this kind may hold.
    #[must_use]
    pub const fn allowed_types(&self) -> &'static [ValueType] {
        match self {
            Self::Switch { .. } => &[ValueType::Bool],
            Self::String { .. } | Self::SingleChoice { .. } => &[ValueType::Text],
            Self::Duration { .. } => &[ValueType::Duration],
            Self::MultiChoice { .. } => &[ValueType::TextList],
        }
    }

    /// Returns `true` if `value_type` is allowed for this kind.
    #[must_use]
    pub fn accepts(&self, value_type: ValueType) -> bool {
        self.allowed_types().contains(&value_type)
    }

    /// The default value described by this kind.
    #[must_use]
    pub fn default_value(&self) -> ConfigValue {
        match self {
            Self::Switch { default } => ConfigValue::Bool(*default),
            Self::String { default, .. } | Self::SingleChoice { default, .. } => {
                ConfigValue::Text(default.clone())
            }
            Self::Duration { unit, default, .. } => ConfigValue::Duration(unit.to_duration(*default)),
            Self::MultiChoice { default, .. } => ConfigValue::TextList(default.clone()),
        }
    }
}

/// Metadata for a single configurable property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationItemDescriptor {
    /// Label shown to the user.
    pub label: String,
    /// Ordering index; ties are broken by label.
    pub order: i32,
    /// Optional help text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    /// Kind and constraints.
    #[serde(flatten)]
    pub kind: ItemKind,
}

impl ConfigurationItemDescriptor {
    #[must_use]
    pub fn new(label: impl Into<String>, order: i32, kind: ItemKind) -> Self {
        Self {
            label: label.into(),
            order,
            help: None,
            kind,
        }
    }

    #[must_use]
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn switch(label: impl Into<String>, order: i32, default: bool) -> Self {
        Self::new(label, order, ItemKind::Switch { default })
    }

    pub fn string(
        label: impl Into<String>,
        order: i32,
        max_length: usize,
        required: bool,
        default: impl Into<String>,
    ) -> Self {
        Self::new(
            label,
            order,
            ItemKind::String {
                max_length,
                required,
                default: default.into(),
            },
        )
    }

    pub fn duration(
        label: impl Into<String>,
        order: i32,
        (min, max): (u64, u64),
        unit: DurationUnit,
        default: u64,
    ) -> Self {
        Self::new(label, order, ItemKind::Duration { min, max, unit, default })
    }

    pub fn single_choice<S: Into<String>>(
        label: impl Into<String>,
        order: i32,
        choices: impl IntoIterator<Item = S>,
        default: impl Into<String>,
    ) -> Self {
        Self::new(
            label,
            order,
            ItemKind::SingleChoice {
                choices: choices.into_iter().map(Into::into).collect(),
                default: default.into(),
            },
        )
    }

    pub fn multi_choice<S: Into<String>>(
        label: impl Into<String>,
        order: i32,
        choices: impl IntoIterator<Item = S>,
        allow_other_choices: bool,
        default: Vec<String>,
    ) -> Self {
        Self::new(
            label,
            order,
            ItemKind::MultiChoice {
                choices: choices.into_iter().map(Into::into).collect(),
                allow_other_choices,
                default,
            },
        )
    }
}

/// Explicit registration of one property by a configuration type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDeclaration {
    /// Stable property identifier, used as the persistence key.
    pub property: String,
    /// Declared runtime type of the property.
    pub value_type: ValueType,
    /// Editor metadata.
    pub descriptor: ConfigurationItemDescriptor,
}

impl PropertyDeclaration {
    pub fn new(
        property: impl Into<String>,
        value_type: ValueType,
        descriptor: ConfigurationItemDescriptor,
    ) -> Self {
        Self {
            property: property.into(),
            value_type,
            descriptor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_unit_multipliers() {
        assert_eq!(DurationUnit::Seconds.multiplier(), 1);
        assert_eq!(DurationUnit::Minutes.multiplier(), 60);
        assert_eq!(DurationUnit::Hours.multiplier(), 3600);
        assert_eq!(DurationUnit::Days.multiplier(), 86_400);
    }

    #[test]
    fn test_duration_unit_round_trips_whole_units() {
        let unit = DurationUnit::Minutes;
        let duration = unit.to_duration(15);
        assert_eq!(duration, Duration::from_secs(900));
        assert_eq!(unit.from_duration(duration), 15);
        assert_eq!(unit.from_duration(Duration::from_secs(959)), 15);
    }

    #[test]
    fn test_allowed_types_per_kind() {
        let switch = ItemKind::Switch { default: false };
        assert!(switch.accepts(ValueType::Bool));
        assert!(!switch.accepts(ValueType::Text));

        let single = ItemKind::SingleChoice {
            choices: vec!["a".into()],
            default: "a".into(),
        };
        assert!(single.accepts(ValueType::Text));
        assert!(!single.accepts(ValueType::TextList));

        let multi = ItemKind::MultiChoice {
            choices: vec![],
            allow_other_choices: true,
            default: vec![],
        };
        assert!(multi.accepts(ValueType::TextList));
    }

    #[test]
    fn test_default_value_uses_unit() {
        let kind = ItemKind::Duration {
            min: 1,
            max: 10,
            unit: DurationUnit::Hours,
            default: 2,
        };
        assert_eq!(kind.default_value(), ConfigValue::Duration(Duration::from_secs(7200)));
    }

    #[test]
    fn test_descriptor_serializes_kind_inline() {
        let descriptor = ConfigurationItemDescriptor::string("Folder", 0, 64, true, "");
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["kind"], "string");
        assert_eq!(json["maxLength"], 64);
        assert_eq!(json["required"], true);
        assert_eq!(json["label"], "Folder");
    }
}
