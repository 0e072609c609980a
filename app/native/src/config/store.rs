//! Flat key-value persistence for source settings.
//!
//! Keys are `<provider>.<property>`; values are raw strings whose meaning is
//! decided by the configuration metamodel when they are loaded back.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::metamodel::MetaModelError;

/// Errors raised while reading or writing persisted settings.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The configuration's declarations are inconsistent, so nothing was saved.
    #[error("Cannot save settings for '{provider}': {source}")]
    Schema {
        provider: String,
        #[source]
        source: MetaModelError,
    },
}

/// Opaque key-value store consumed by the orchestrator.
pub trait SettingsStore: Send + Sync {
    /// Returns the raw value stored under `key`.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be persisted.
    fn set(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Stores several values at once.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by [`Self::set`].
    fn set_many(&self, values: Vec<(String, String)>) -> Result<(), StoreError> {
        for (key, value) in values {
            self.set(&key, value)?;
        }
        Ok(())
    }
}

/// In-memory store, used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    values: RwLock<BTreeMap<String, String>>,
}

impl MemorySettingsStore {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Returns a copy of every stored entry.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, String> { self.values.read().clone() }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> Option<String> { self.values.read().get(key).cloned() }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.values.write().insert(key.to_string(), value);
        Ok(())
    }
}

/// Store backed by a JSON object on disk.
///
/// The whole file is rewritten through a temporary sibling on every change,
/// so a crash never leaves a truncated settings file behind.
#[derive(Debug)]
pub struct JsonSettingsStore {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
}

impl JsonSettingsStore {
    /// Opens the store at `path`. A missing file is an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content)
                .map_err(|source| StoreError::Parse { path: path.clone(), source })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        Ok(Self { path, values: RwLock::new(values) })
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path { &self.path }

    fn write_file(&self, values: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io { path: self.path.clone(), source };

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(io_err)?;

        let json = serde_json::to_string_pretty(values)
            .map_err(|source| StoreError::Parse { path: self.path.clone(), source })?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(json.as_bytes()).map_err(io_err)?;
        tmp.persist(&self.path).map_err(|err| io_err(err.error))?;
        Ok(())
    }
}

impl SettingsStore for JsonSettingsStore {
    fn get(&self, key: &str) -> Option<String> { self.values.read().get(key).cloned() }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.set_many(vec![(key.to_string(), value)])
    }

    fn set_many(&self, values: Vec<(String, String)>) -> Result<(), StoreError> {
        let mut guard = self.values.write();
        let mut next = guard.clone();
        next.extend(values);
        self.write_file(&next)?;
        *guard = next;
        Ok(())
    }
}
