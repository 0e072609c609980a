//! Name-keyed registry of source factories.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::providers::{BingSource, FolderSource};
use super::{ImageSource, SourceDescriptor, SourceHandle};

/// Builds a fresh provider instance.
pub type SourceFactory = Arc<dyn Fn() -> Arc<dyn ImageSource> + Send + Sync>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("A source named '{0}' is already registered")]
    Duplicate(String),

    #[error("Unknown source: {0}")]
    Unknown(String),
}

struct Entry {
    descriptor: SourceDescriptor,
    factory: SourceFactory,
}

/// Maps unique provider names to factories.
///
/// Registration is additive. Names are iterated in sorted order.
#[derive(Default)]
pub struct SourceRegistry {
    entries: BTreeMap<String, Entry>,
}

impl fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("names", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SourceRegistry {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Registry holding the providers shipped with the application.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        let builtin: [(&str, SourceFactory); 2] = [
            (
                FolderSource::NAME,
                Arc::new(|| -> Arc<dyn ImageSource> { Arc::new(FolderSource::new()) }),
            ),
            (
                BingSource::NAME,
                Arc::new(|| -> Arc<dyn ImageSource> { Arc::new(BingSource::new()) }),
            ),
        ];
        for (name, factory) in builtin {
            if let Err(err) = registry.register(name, factory) {
                tracing::error!(error = %err, "failed to register builtin source");
            }
        }
        registry
    }

    /// Registers `factory` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if the name is taken; the
    /// existing registration is kept.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: SourceFactory,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }

        let descriptor = factory().descriptor();
        tracing::debug!(source = %name, "registered source");
        self.entries.insert(name, Entry { descriptor, factory });
        Ok(())
    }

    /// Creates a new, uninitialized instance of the named source.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Unknown`] for unregistered names.
    pub fn create(&self, name: &str) -> Result<SourceHandle, RegistryError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| RegistryError::Unknown(name.to_string()))?;
        Ok(SourceHandle::new(name, (entry.factory)()))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool { self.entries.contains_key(name) }

    pub fn names(&self) -> impl Iterator<Item = &str> { self.entries.keys().map(String::as_str) }

    pub fn descriptors(&self) -> impl Iterator<Item = &SourceDescriptor> {
        self.entries.values().map(|entry| &entry.descriptor)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::metamodel::SourceConfiguration;
    use crate::source::{FetchError, FetchedImage, SourceError, SourceState};

    struct Stub;

    #[async_trait]
    impl ImageSource for Stub {
        fn descriptor(&self) -> SourceDescriptor { SourceDescriptor::new("stub", "Stub", "") }

        fn configuration(&self) -> Option<Box<dyn SourceConfiguration>> { None }

        fn configure(&self, _config: Box<dyn SourceConfiguration>) -> Result<(), SourceError> {
            Ok(())
        }

        async fn fetch_next(&self, _cancel: CancellationToken) -> Result<FetchedImage, FetchError> {
            Err(FetchError::new("Stub", "nothing to fetch"))
        }
    }

    fn stub_factory() -> SourceFactory { Arc::new(|| -> Arc<dyn ImageSource> { Arc::new(Stub) }) }

    #[test]
    fn test_register_and_create() {
        let mut registry = SourceRegistry::new();
        registry.register("stub", stub_factory()).unwrap();

        let handle = registry.create("stub").unwrap();
        assert_eq!(handle.name(), "stub");
        assert_eq!(handle.state(), SourceState::Uninitialized);
        assert_eq!(registry.descriptors().next().unwrap().display_name, "Stub");
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let mut registry = SourceRegistry::new();
        registry.register("stub", stub_factory()).unwrap();
        assert_eq!(
            registry.register("stub", stub_factory()),
            Err(RegistryError::Duplicate("stub".into()))
        );
    }

    #[test]
    fn test_unknown_name() {
        let registry = SourceRegistry::new();
        assert_eq!(registry.create("nope").unwrap_err(), RegistryError::Unknown("nope".into()));
    }

    #[test]
    fn test_builtin_sources_are_registered() {
        let registry = SourceRegistry::with_builtin();
        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, vec!["bing", "folder"]);
    }
}
