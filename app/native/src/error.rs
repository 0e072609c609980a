//! Error types for Backdrop.
//!
//! Every module raises its own typed error; this module folds them into one
//! crate-level error for the CLI.

use serde::Serialize;
use thiserror::Error;

use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::config::store::StoreError;
use crate::desktop::DesktopError;
use crate::metamodel::MetaModelError;
use crate::orchestrator::{ActorError, OrchestratorError};
use crate::processing::ProcessingError;
use crate::source::{RegistryError, SourceError};

/// Errors that can occur during application execution.
///
/// Serializes as `{"kind": ..., "message": ...}` for `--json` output.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "kind", content = "message")]
pub enum BackdropError {
    /// Invalid command arguments.
    #[error("{0}")]
    InvalidArguments(String),
    /// Cache operation failed.
    #[error("Cache error: {0}")]
    CacheError(String),
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
    /// Source settings could not be read or written.
    #[error("Settings error: {0}")]
    SettingsError(String),
    /// Provider lookup, lifecycle or fetch failure.
    #[error("Source error: {0}")]
    SourceError(String),
    /// Post-processing or desktop publishing failed.
    #[error("Wallpaper error: {0}")]
    WallpaperError(String),
    /// The orchestrator stopped or did not answer.
    #[error("Orchestrator error: {0}")]
    OrchestratorError(String),
    /// IO error.
    #[error("IO error: {0}")]
    IoError(String),
    /// Generic command error.
    #[error("{0}")]
    CommandError(String),
}

impl From<std::io::Error> for BackdropError {
    fn from(err: std::io::Error) -> Self { Self::IoError(err.to_string()) }
}

impl From<serde_json::Error> for BackdropError {
    fn from(err: serde_json::Error) -> Self { Self::CommandError(err.to_string()) }
}

impl From<String> for BackdropError {
    fn from(msg: String) -> Self { Self::CommandError(msg) }
}

impl From<&str> for BackdropError {
    fn from(msg: &str) -> Self { Self::CommandError(msg.to_string()) }
}

impl From<CacheError> for BackdropError {
    fn from(err: CacheError) -> Self { Self::CacheError(err.to_string()) }
}

impl From<ConfigError> for BackdropError {
    fn from(err: ConfigError) -> Self { Self::ConfigError(err.to_string()) }
}

impl From<StoreError> for BackdropError {
    fn from(err: StoreError) -> Self { Self::SettingsError(err.to_string()) }
}

impl From<MetaModelError> for BackdropError {
    fn from(err: MetaModelError) -> Self { Self::SettingsError(err.to_string()) }
}

impl From<RegistryError> for BackdropError {
    fn from(err: RegistryError) -> Self { Self::SourceError(err.to_string()) }
}

impl From<SourceError> for BackdropError {
    fn from(err: SourceError) -> Self { Self::SourceError(err.to_string()) }
}

impl From<ProcessingError> for BackdropError {
    fn from(err: ProcessingError) -> Self { Self::WallpaperError(err.to_string()) }
}

impl From<DesktopError> for BackdropError {
    fn from(err: DesktopError) -> Self { Self::WallpaperError(err.to_string()) }
}

impl From<ActorError> for BackdropError {
    fn from(err: ActorError) -> Self { Self::OrchestratorError(err.to_string()) }
}

impl From<OrchestratorError> for BackdropError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Registry(err) => err.into(),
            OrchestratorError::Source(err) => err.into(),
            OrchestratorError::MetaModel(err) => err.into(),
            OrchestratorError::Store(err) => err.into(),
            OrchestratorError::Actor(err) => err.into(),
            other => Self::OrchestratorError(other.to_string()),
        }
    }
}
