//! Configuration types for Backdrop.
//!
//! This module provides the configuration types and loading functionality.
//! The configuration file supports JSONC format (JSON with comments).
//! Both single-line (`//`) and multi-line (`/* */`) comments are allowed.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::cache::{EvictionPolicy, ImageCache};
use crate::constants::{APP_NAME, CONFIG_FILE_NAMES, SETTINGS_FILE_NAME};
use crate::orchestrator::OrchestratorSettings;
use crate::platform::path::{expand, expand_relative_to};
use crate::processing::{PostProcessParams, ScreenSize};

/// Output dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ScreenConfig {
    pub width: u32,
    pub height: u32,
}

impl From<ScreenConfig> for ScreenSize {
    fn from(screen: ScreenConfig) -> Self { Self::new(screen.width, screen.height) }
}

/// Image post-processing applied before a wallpaper is published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct ProcessingConfig {
    /// Blur radius in pixels (0 = no blur).
    pub blur: u32,

    /// Darkening in percent, 0-100.
    pub darken: u8,

    /// Desaturation in percent, 0-100.
    pub desaturate: u8,

    /// Output size. Defaults to 2560x1440.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen: Option<ScreenConfig>,

    /// Size of an additional low-resolution preview; omitted = no preview.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<ScreenConfig>,

    /// Crop the image to fill the screen. When false, the whole image is
    /// shown with black bars.
    pub optimize_layout: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            blur: 0,
            darken: 0,
            desaturate: 0,
            screen: None,
            preview: None,
            optimize_layout: true,
        }
    }
}

impl ProcessingConfig {
    /// Pipeline parameters; percentages above 100 are clamped.
    #[must_use]
    pub fn to_params(&self) -> PostProcessParams {
        PostProcessParams {
            blur: self.blur,
            darken: self.darken.min(100),
            desaturate: self.desaturate.min(100),
            screen: self.screen.map_or_else(ScreenSize::default_2k, Into::into),
            preview: self.preview.map(Into::into),
            optimize_layout: self.optimize_layout,
        }
    }
}

/// Local image cache limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Cache directory. Empty = the platform cache directory.
    pub path: String,

    /// Maximum cache size in megabytes (0 = unlimited).
    pub max_size_mb: u64,

    /// Remove entries not used for this many days (0 = keep forever).
    pub max_age_days: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            max_size_mb: 512,
            max_age_days: 0,
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn policy(&self) -> EvictionPolicy {
        EvictionPolicy {
            max_bytes: (self.max_size_mb > 0).then(|| self.max_size_mb.saturating_mul(1024 * 1024)),
            max_age: (self.max_age_days > 0)
                .then(|| Duration::from_secs(self.max_age_days.saturating_mul(24 * 60 * 60))),
        }
    }

    #[must_use]
    pub fn cache(&self) -> ImageCache {
        if self.path.trim().is_empty() {
            ImageCache::default()
        } else {
            ImageCache::new(expand(&self.path))
        }
    }
}

/// Root configuration for Backdrop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct BackdropConfig {
    /// Image source activated on start, e.g. "bing" or "folder".
    pub source: String,

    /// Time in seconds between wallpaper changes (0 = never change on a timer).
    pub interval: u64,

    /// Seconds a single fetch may take before it is abandoned (0 = no limit).
    pub fetch_timeout: u64,

    /// Post-processing options.
    pub processing: ProcessingConfig,

    /// Cache options.
    pub cache: CacheConfig,

    /// File holding per-source settings. Relative paths are resolved against
    /// the directory of this configuration file.
    pub settings_file: String,
}

impl Default for BackdropConfig {
    fn default() -> Self {
        Self {
            source: "bing".to_string(),
            interval: 30 * 60,
            fetch_timeout: 60,
            processing: ProcessingConfig::default(),
            cache: CacheConfig::default(),
            settings_file: SETTINGS_FILE_NAME.to_string(),
        }
    }
}

impl BackdropConfig {
    #[must_use]
    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            interval: Duration::from_secs(self.interval),
            fetch_timeout: Duration::from_secs(self.fetch_timeout),
            params: self.processing.to_params(),
            eviction: self.cache.policy(),
        }
    }

    /// Location of the settings file for a configuration loaded from
    /// `config_path` (or from the default location when `None`).
    #[must_use]
    pub fn settings_path(&self, config_path: Option<&Path>) -> PathBuf {
        let base = config_path
            .and_then(Path::parent)
            .map_or_else(default_config_dir, Path::to_path_buf);
        expand_relative_to(&self.settings_file, &base)
    }
}

/// Errors that can occur when loading the configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// No configuration file was found in any of the expected locations.
    NotFound,
    /// The configuration file exists but could not be read.
    IoError(std::io::Error),
    /// The configuration file contains invalid JSON.
    ParseError(serde_json::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(
                f,
                "No configuration file found. Expected at ~/.config/{APP_NAME}/config.jsonc \
                or config.json"
            ),
            Self::IoError(err) => write!(f, "Failed to read configuration file: {err}"),
            Self::ParseError(err) => write!(f, "Failed to parse configuration file: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::IoError(err) => Some(err),
            Self::ParseError(err) => Some(err),
            Self::NotFound => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self { Self::IoError(err) }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self { Self::ParseError(err) }
}

/// Preferred configuration directory: `$XDG_CONFIG_HOME/backdrop`, else
/// `~/.config/backdrop`.
#[must_use]
pub fn default_config_dir() -> PathBuf {
    std::env::var_os("XDG_CONFIG_HOME")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
}

/// Returns the possible configuration file paths in priority order.
///
/// The function checks the following locations (both `.jsonc` and `.json`
/// variants):
/// 1. `$XDG_CONFIG_HOME/backdrop/` or `~/.config/backdrop/`
/// 2. the platform config directory (`~/Library/Application Support/backdrop/`
///    on macOS)
#[must_use]
pub fn config_paths() -> Vec<PathBuf> {
    let mut dirs_to_check = vec![default_config_dir()];
    if let Some(platform_dir) = dirs::config_dir()
        .map(|dir| dir.join(APP_NAME))
        .filter(|dir| !dirs_to_check.contains(dir))
    {
        dirs_to_check.push(platform_dir);
    }

    dirs_to_check
        .iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .collect()
}

/// Parses a configuration from a JSONC reader.
///
/// # Errors
///
/// Returns `ConfigError::ParseError` if the content is not valid.
pub fn parse_config(reader: impl std::io::Read) -> Result<BackdropConfig, ConfigError> {
    // Strip comments from JSONC before parsing
    let reader = json_comments::StripComments::new(reader);
    Ok(serde_json::from_reader(reader)?)
}

/// Loads the configuration from a specific file.
///
/// # Errors
///
/// Returns `ConfigError::NotFound` if the file does not exist, or an I/O or
/// parse error.
pub fn load_config_from_path(path: &Path) -> Result<(BackdropConfig, PathBuf), ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound);
    }
    let file = fs::File::open(path)?;
    Ok((parse_config(file)?, path.to_path_buf()))
}

/// Loads the configuration from the first existing file in [`config_paths`].
///
/// # Errors
///
/// Returns `ConfigError::NotFound` if no configuration file exists in any of
/// the expected locations, or an I/O or parse error for the first file found.
pub fn load_config() -> Result<(BackdropConfig, PathBuf), ConfigError> {
    config_paths()
        .into_iter()
        .find(|path| path.exists())
        .map_or(Err(ConfigError::NotFound), |path| load_config_from_path(&path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BackdropConfig::default();
        assert_eq!(config.source, "bing");
        assert_eq!(config.interval, 1800);
        assert!(config.processing.optimize_layout);
        assert_eq!(config.settings_file, "settings.json");
    }

    #[test]
    fn test_parse_jsonc_with_comments() {
        let json = r#"{
            // Rotate every ten minutes
            "source": "folder",
            "interval": 600,
            /* Dim and soften */
            "processing": { "darken": 20, "blur": 8, "screen": { "width": 1920, "height": 1080 } }
        }"#;

        let config = parse_config(json.as_bytes()).unwrap();
        assert_eq!(config.source, "folder");
        assert_eq!(config.interval, 600);
        assert_eq!(config.fetch_timeout, 60);
        assert_eq!(config.processing.darken, 20);
        assert_eq!(config.processing.to_params().screen, ScreenSize::new(1920, 1080));
    }

    #[test]
    fn test_parse_rejects_invalid_json() {
        let err = parse_config(r#"{ "interval": "soon" }"#.as_bytes()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_processing_params_are_clamped() {
        let processing = ProcessingConfig {
            darken: 150,
            desaturate: 101,
            ..ProcessingConfig::default()
        };
        let params = processing.to_params();

        assert_eq!(params.darken, 100);
        assert_eq!(params.desaturate, 100);
        assert_eq!(params.screen, ScreenSize::default_2k());
        assert!(params.preview.is_none());
    }

    #[test]
    fn test_cache_policy() {
        let unbounded = CacheConfig {
            max_size_mb: 0,
            ..CacheConfig::default()
        };
        assert!(unbounded.policy().is_unbounded());

        let bounded = CacheConfig {
            max_size_mb: 2,
            max_age_days: 1,
            ..CacheConfig::default()
        };
        let policy = bounded.policy();
        assert_eq!(policy.max_bytes, Some(2 * 1024 * 1024));
        assert_eq!(policy.max_age, Some(Duration::from_secs(86_400)));
    }

    #[test]
    fn test_orchestrator_settings() {
        let config = BackdropConfig {
            interval: 0,
            fetch_timeout: 15,
            ..BackdropConfig::default()
        };
        let settings = config.orchestrator_settings();

        assert!(settings.interval.is_zero());
        assert_eq!(settings.fetch_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_settings_path_is_relative_to_config_file() {
        let config = BackdropConfig::default();
        let path = config.settings_path(Some(Path::new("/etc/backdrop/config.jsonc")));
        assert_eq!(path, PathBuf::from("/etc/backdrop/settings.json"));

        let absolute = BackdropConfig {
            settings_file: "/var/lib/backdrop.json".into(),
            ..BackdropConfig::default()
        };
        assert_eq!(absolute.settings_path(None), PathBuf::from("/var/lib/backdrop.json"));
    }

    #[test]
    fn test_load_config_from_missing_path() {
        let err = load_config_from_path(Path::new("/nonexistent/backdrop.jsonc")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound));
    }

    #[test]
    fn test_load_config_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.jsonc");
        fs::write(&path, r#"{ "source": "folder" } // trailing comment"#).unwrap();

        let (config, loaded_from) = load_config_from_path(&path).unwrap();
        assert_eq!(config.source, "folder");
        assert_eq!(loaded_from, path);
    }

    #[test]
    fn test_config_paths_use_known_names() {
        let paths = config_paths();
        assert!(!paths.is_empty());
        assert!(paths.iter().all(|p| {
            p.file_name().is_some_and(|name| CONFIG_FILE_NAMES.iter().any(|n| name == *n))
        }));
    }

    #[test]
    fn test_config_error_display() {
        assert!(ConfigError::NotFound.to_string().contains("No configuration file found"));
    }
}
