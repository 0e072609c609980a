//! Configuration template generation.
//!
//! Generates a commented configuration template with all available options.

use std::fs;
use std::path::Path;

/// Generates a configuration template with all options commented out.
#[must_use]
pub fn generate_config_template() -> String {
    r##"// Backdrop Configuration File
// ===========================
// This file uses JSONC format (JSON with comments).
// All options below are commented out and show their default values.
// Uncomment and modify the options you want to configure.
//
// Source settings (folder path, Bing market, ...) live in a separate file
// and are edited with `backdrop settings`.

{
  // Image source activated on start: "bing" or "folder"
  // "source": "bing",

  // Interval in seconds between wallpaper changes (0 = no rotation)
  // "interval": 1800,

  // Seconds a single fetch may take before it is abandoned (0 = no limit)
  // "fetchTimeout": 60,

  // ============================================================================
  // Post-processing
  // ============================================================================
  // "processing": {
  //   // Blur radius in pixels (0 = no blur)
  //   "blur": 0,
  //
  //   // Darken by this percentage (0-100)
  //   "darken": 0,
  //
  //   // Desaturate by this percentage (0-100)
  //   "desaturate": 0,
  //
  //   // Output size in pixels
  //   "screen": { "width": 2560, "height": 1440 },
  //
  //   // Optional low-resolution preview
  //   // "preview": { "width": 320, "height": 180 },
  //
  //   // Crop to fill the screen (false = letterbox with black bars)
  //   "optimizeLayout": true
  // },

  // ============================================================================
  // Image Cache
  // ============================================================================
  // "cache": {
  //   // Cache directory (empty = platform cache directory)
  //   "path": "",
  //
  //   // Maximum cache size in megabytes (0 = unlimited)
  //   "maxSizeMb": 512,
  //
  //   // Remove images not used for this many days (0 = keep forever)
  //   "maxAgeDays": 0
  // },

  // File holding per-source settings, relative to this file
  // "settingsFile": "settings.json"
}
"##
    .to_string()
}

/// Creates a configuration file with the template at the specified path.
///
/// Creates parent directories if they don't exist.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn create_config_file(path: &Path) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(path, generate_config_template())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{BackdropConfig, parse_config};

    #[test]
    fn test_template_parses_to_defaults() {
        let template = generate_config_template();
        let config = parse_config(template.as_bytes()).unwrap();
        assert_eq!(config, BackdropConfig::default());
    }

    #[test]
    fn test_template_mentions_every_section() {
        let template = generate_config_template();
        for key in ["source", "interval", "fetchTimeout", "processing", "cache", "settingsFile"] {
            assert!(template.contains(&format!("\"{key}\"")), "missing {key}");
        }
    }

    #[test]
    fn test_create_config_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.jsonc");

        create_config_file(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), generate_config_template());
    }
}
