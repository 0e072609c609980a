//! Typed configuration values.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The runtime type of a configuration property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueType {
    Bool,
    Text,
    Duration,
    TextList,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Text => "text",
            Self::Duration => "duration",
            Self::TextList => "text list",
        };
        f.write_str(name)
    }
}

/// A configuration value read from, or written to, a source configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum ConfigValue {
    Bool(bool),
    Text(String),
    Duration(Duration),
    TextList(Vec<String>),
}

impl ConfigValue {
    /// Returns the runtime type of this value.
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Bool,
            Self::Text(_) => ValueType::Text,
            Self::Duration(_) => ValueType::Duration,
            Self::TextList(_) => ValueType::TextList,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_duration(&self) -> Option<Duration> {
        match self {
            Self::Duration(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text_list(&self) -> Option<&[String]> {
        match self {
            Self::TextList(values) => Some(values),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
            Self::Duration(value) => write!(f, "{}s", value.as_secs()),
            Self::TextList(values) => write!(f, "[{}]", values.join(", ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_matches_variant() {
        assert_eq!(ConfigValue::Bool(true).value_type(), ValueType::Bool);
        assert_eq!(ConfigValue::Text("a".into()).value_type(), ValueType::Text);
        assert_eq!(
            ConfigValue::Duration(Duration::from_secs(3)).value_type(),
            ValueType::Duration
        );
        assert_eq!(ConfigValue::TextList(vec![]).value_type(), ValueType::TextList);
    }

    #[test]
    fn test_accessors_reject_other_variants() {
        let value = ConfigValue::Text("hello".into());
        assert_eq!(value.as_text(), Some("hello"));
        assert_eq!(value.as_bool(), None);
        assert_eq!(value.as_duration(), None);
        assert!(value.as_text_list().is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(ConfigValue::Duration(Duration::from_secs(90)).to_string(), "90s");
        assert_eq!(
            ConfigValue::TextList(vec!["jpg".into(), "png".into()]).to_string(),
            "[jpg, png]"
        );
    }
}
