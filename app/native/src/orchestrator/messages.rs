//! Message types for the orchestrator.
//!
//! All communication with the orchestrator happens through messages:
//! - `OrchestratorMessage` - triggers, completions and commands
//! - `OrchestratorQuery` - requests for state data (with response channel)
//! - `QueryResult` - responses from queries

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;

use super::handle::ActorError;
use super::session::SessionId;
use crate::cache::{CacheError, EvictionPolicy};
use crate::config::store::StoreError;
use crate::events::ProcessedWallpaper;
use crate::metamodel::{EditableItem, MetaModelError};
use crate::processing::{PostProcessParams, ProcessingError};
use crate::source::{FetchError, FetchedImage, RegistryError, SourceDescriptor, SourceError};

// ============================================================================
// Errors
// ============================================================================

/// Errors reported back to callers of orchestrator commands.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    MetaModel(#[from] MetaModelError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The source exposes no configuration.
    #[error("Source '{0}' has no settings")]
    NotConfigurable(String),

    /// The source's settings schema is broken, so editing is disabled.
    #[error("Settings editing is disabled for source '{0}'")]
    SettingsDisabled(String),

    #[error(transparent)]
    Actor(#[from] ActorError),
}

/// Why turning fetched bytes into a wallpaper failed.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Processing(#[from] ProcessingError),

    /// The blocking task running the pipeline died.
    #[error("Processing task failed: {0}")]
    Aborted(String),
}

// ============================================================================
// Orchestrator Messages
// ============================================================================

/// What caused a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchTrigger {
    Startup,
    Timer,
    Manual,
    Settings,
}

impl fmt::Display for FetchTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Startup => "startup",
            Self::Timer => "timer",
            Self::Manual => "manual",
            Self::Settings => "settings",
        };
        f.write_str(name)
    }
}

/// Configuration delivered while running.
#[derive(Debug)]
pub enum ConfigChange {
    /// New pipeline parameters, used from the next run on.
    Processing(PostProcessParams),

    /// New timer interval and fetch timeout. Zero disables either.
    Schedule { interval: Duration, fetch_timeout: Duration },

    /// New cache bounds.
    Eviction(EvictionPolicy),

    /// Edited settings of one source.
    SourceSettings {
        source: String,
        items: Vec<EditableItem>,
        respond_to: Option<oneshot::Sender<Result<(), OrchestratorError>>>,
    },
}

/// Messages sent to the orchestrator.
#[derive(Debug)]
pub enum OrchestratorMessage {
    /// Start a new fetch, superseding the current one.
    BeginFetch(FetchTrigger),

    /// A source delivered an image.
    FetchCompleted { session: SessionId, image: FetchedImage },

    /// A source gave up.
    FetchFailed { session: SessionId, error: FetchError },

    /// The pipeline finished for a fetched image.
    PostProcessCompleted {
        session: SessionId,
        outcome: Result<Box<ProcessedWallpaper>, PipelineError>,
    },

    ConfigChanged(ConfigChange),

    /// Replace the active source.
    ActivateSource {
        name: String,
        respond_to: Option<oneshot::Sender<Result<(), OrchestratorError>>>,
    },

    Query {
        query: OrchestratorQuery,
        respond_to: oneshot::Sender<QueryResult>,
    },

    /// Dispose the active source and stop.
    Shutdown,
}

impl OrchestratorMessage {
    /// Name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::BeginFetch(_) => "BeginFetch",
            Self::FetchCompleted { .. } => "FetchCompleted",
            Self::FetchFailed { .. } => "FetchFailed",
            Self::PostProcessCompleted { .. } => "PostProcessCompleted",
            Self::ConfigChanged(_) => "ConfigChanged",
            Self::ActivateSource { .. } => "ActivateSource",
            Self::Query { .. } => "Query",
            Self::Shutdown => "Shutdown",
        }
    }
}

// ============================================================================
// Queries
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorQuery {
    Status,
    /// Editable settings of the active source.
    Settings,
}

/// Point-in-time view of the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub source: Option<SourceDescriptor>,
    pub source_state: Option<String>,
    /// Session currently fetching or processing.
    pub in_flight: Option<SessionId>,
    pub last_session: Option<SessionId>,
    pub current: Option<ProcessedWallpaper>,
    pub params: PostProcessParams,
    pub interval_secs: u64,
    pub fetch_timeout_secs: u64,
    pub settings_editable: bool,
}

#[derive(Debug, Clone)]
pub enum QueryResult {
    Status(Box<StatusSnapshot>),
    /// `None` when there is no active source or its settings are not editable.
    Settings(Option<Vec<EditableItem>>),
}

impl QueryResult {
    #[must_use]
    pub fn into_status(self) -> Option<StatusSnapshot> {
        match self {
            Self::Status(status) => Some(*status),
            Self::Settings(_) => None,
        }
    }

    #[must_use]
    pub fn into_settings(self) -> Option<Option<Vec<EditableItem>>> {
        match self {
            Self::Settings(items) => Some(items),
            Self::Status(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_names() {
        assert_eq!(OrchestratorMessage::BeginFetch(FetchTrigger::Timer).name(), "BeginFetch");
        assert_eq!(OrchestratorMessage::Shutdown.name(), "Shutdown");
    }

    #[test]
    fn test_trigger_display() {
        assert_eq!(FetchTrigger::Manual.to_string(), "manual");
        assert_eq!(FetchTrigger::Settings.to_string(), "settings");
    }

    #[test]
    fn test_query_result_accessors() {
        let result = QueryResult::Settings(None);
        assert_eq!(result.clone().into_settings(), Some(None));
        assert!(result.into_status().is_none());
    }

    #[test]
    fn test_orchestrator_error_display() {
        let err = OrchestratorError::from(RegistryError::Unknown("flickr".into()));
        assert_eq!(err.to_string(), "Unknown source: flickr");
        assert_eq!(
            OrchestratorError::NotConfigurable("plain".into()).to_string(),
            "Source 'plain' has no settings"
        );
    }
}
