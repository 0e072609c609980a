//! Configuration metamodel.
//!
//! Providers ship configuration shapes the rest of the application knows
//! nothing about. Each shape declares its properties through
//! [`SourceConfiguration::declare`], and the functions here discover a
//! schema from those declarations, read values for editing, validate edits,
//! and write them back all-or-nothing.
//!
//! The [`store`] submodule round-trips a configuration through the flat
//! key-value [`SettingsStore`](crate::config::store::SettingsStore).

mod descriptor;
mod model;
pub mod store;
mod value;

pub use descriptor::{ConfigurationItemDescriptor, DurationUnit, ItemKind, PropertyDeclaration};
pub use model::{
    ConfigurationMetaModel, EditableItem, MetaModelEntry, MetaModelError, SourceConfiguration,
    ValidationFailure, ValidationReason, bind_to_schema, copy_values, discover, persist,
    to_editable_items, validate,
};
pub use value::{ConfigValue, ValueType};
