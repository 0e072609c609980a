//! Data carried between providers and the orchestrator.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metamodel::MetaModelError;

/// Identity of a registered provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDescriptor {
    /// Unique registry name (e.g. `bing`).
    pub name: String,
    pub display_name: String,
    pub description: String,
    /// Icon reference understood by the presentation layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl SourceDescriptor {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            description: description.into(),
            icon: None,
        }
    }

    #[must_use]
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }
}

/// Licensing terms attached to an image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// One image produced by a provider.
///
/// The cache fills in `raw_location` and `processed_location` as the image
/// moves through the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchImage {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<License>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_location: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_location: Option<PathBuf>,
}

impl FetchImage {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_page_url(mut self, url: impl Into<String>) -> Self {
        self.page_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_license(mut self, license: License) -> Self {
        self.license = Some(license);
        self
    }

    /// Stable identity used to derive cache keys.
    ///
    /// Prefers the image URL, then the page URL, then the title.
    #[must_use]
    pub fn identity(&self) -> &str {
        self.image_url
            .as_deref()
            .or(self.page_url.as_deref())
            .unwrap_or(&self.title)
    }
}

/// A fetched image together with its undecoded bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub image: FetchImage,
    pub bytes: Vec<u8>,
}

impl FetchedImage {
    #[must_use]
    pub const fn new(image: FetchImage, bytes: Vec<u8>) -> Self { Self { image, bytes } }
}

impl fmt::Debug for FetchedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchedImage")
            .field("image", &self.image)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Failure reported by a provider for one fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{title}: {message}")]
pub struct FetchError {
    pub title: String,
    pub message: String,
}

impl FetchError {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn cancelled() -> Self { Self::new("Cancelled", "The fetch was cancelled") }

    #[must_use]
    pub fn timed_out(after: Duration) -> Self {
        Self::new("Timed out", format!("No image after {}s", after.as_secs()))
    }
}

/// Lifecycle errors of a source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Setup failed; the source cannot be used.
    #[error("Failed to initialize source '{name}': {message}")]
    Initialization { name: String, message: String },

    /// The operation is not legal in the current lifecycle state.
    #[error("Cannot {operation} source '{name}' while {state}")]
    InvalidState {
        name: String,
        operation: &'static str,
        state: String,
    },

    /// The handed-in configuration could not be adopted.
    #[error("Invalid configuration for source '{name}': {error}")]
    Configuration { name: String, error: MetaModelError },
}

impl SourceError {
    pub fn initialization(name: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Initialization {
            name: name.into(),
            message: message.to_string(),
        }
    }

    pub fn configuration(name: impl Into<String>, error: MetaModelError) -> Self {
        Self::Configuration { name: name.into(), error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_prefers_image_url() {
        let image = FetchImage::new("Dunes")
            .with_page_url("https://example.com/page")
            .with_image_url("https://example.com/dunes.jpg");
        assert_eq!(image.identity(), "https://example.com/dunes.jpg");
    }

    #[test]
    fn test_identity_falls_back_to_page_then_title() {
        let image = FetchImage::new("Dunes").with_page_url("https://example.com/page");
        assert_eq!(image.identity(), "https://example.com/page");
        assert_eq!(FetchImage::new("Dunes").identity(), "Dunes");
    }

    #[test]
    fn test_fetch_error_display() {
        let err = FetchError::new("Network", "connection reset");
        assert_eq!(err.to_string(), "Network: connection reset");
        assert_eq!(FetchError::timed_out(Duration::from_secs(30)).title, "Timed out");
    }

    #[test]
    fn test_fetched_image_debug_hides_bytes() {
        let fetched = FetchedImage::new(FetchImage::new("x"), vec![0; 2048]);
        let debug = format!("{fetched:?}");
        assert!(debug.contains("2048"));
        assert!(!debug.contains("0, 0, 0"));
    }

    #[test]
    fn test_source_error_display() {
        let err = SourceError::InvalidState {
            name: "bing".into(),
            operation: "fetch",
            state: "disposed".into(),
        };
        assert_eq!(err.to_string(), "Cannot fetch source 'bing' while disposed");
    }
}
