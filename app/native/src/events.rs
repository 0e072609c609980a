//! Wallpaper notifications.
//!
//! The orchestrator broadcasts every [`WallpaperEvent`] in processing order.
//! Each event also has a stable name of the form `backdrop://wallpaper/<event>`
//! used when events are printed or forwarded.

use std::path::PathBuf;

use serde::Serialize;

use crate::processing::Geometry;
use crate::source::FetchImage;

/// Stable event names.
pub mod names {
    /// A fetch was started.
    pub const CHANGING: &str = "backdrop://wallpaper/changing";

    /// A new wallpaper was published.
    pub const CHANGED: &str = "backdrop://wallpaper/changed";

    /// Fetching, processing or publishing failed.
    pub const ERROR: &str = "backdrop://wallpaper/error";
}

/// A wallpaper that went through the whole pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedWallpaper {
    /// Name of the source that produced it.
    pub source: String,
    /// Image metadata with both cache locations filled in.
    pub image: FetchImage,
    /// Processed file applied to the desktop.
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_path: Option<PathBuf>,
    pub geometry: Geometry,
    pub variant_key: String,
    /// Cache keys of every file backing this wallpaper.
    pub cache_keys: Vec<String>,
}

/// Notification emitted by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum WallpaperEvent {
    Changing,
    Changed(Box<ProcessedWallpaper>),
    Error { subject: String, message: String },
}

impl WallpaperEvent {
    pub fn error(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            subject: subject.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Changing => names::CHANGING,
            Self::Changed(_) => names::CHANGED,
            Self::Error { .. } => names::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_namespaced() {
        for name in [names::CHANGING, names::CHANGED, names::ERROR] {
            assert!(name.starts_with("backdrop://wallpaper/"), "bad name {name}");
        }
    }

    #[test]
    fn test_error_event_serialization() {
        let event = WallpaperEvent::error("Timed out", "no answer after 30s");
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event"], "error");
        assert_eq!(json["payload"]["subject"], "Timed out");
        assert_eq!(event.name(), names::ERROR);
    }

    #[test]
    fn test_changing_event_serialization() {
        let json = serde_json::to_string(&WallpaperEvent::Changing).unwrap();
        assert_eq!(json, r#"{"event":"changing"}"#);
    }
}
