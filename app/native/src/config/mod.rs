//! Configuration module for Backdrop.
//!
//! This module provides configuration types, loading functionality, file
//! watching for hot-reloading, and the key-value store that holds per-source
//! settings.
//!
//! The configuration file supports JSONC format (JSON with comments).
//! Both single-line (`//`) and multi-line (`/* */`) comments are allowed.

pub mod store;
pub mod template;
pub mod types;
mod watcher;

use std::path::PathBuf;
use std::sync::OnceLock;

pub use types::{
    BackdropConfig, CacheConfig, ConfigError, ProcessingConfig, ScreenConfig, config_paths,
    default_config_dir, load_config as load_config_default, load_config_from_path, parse_config,
};
pub use watcher::{config_changes, watch_config_file};

/// Global configuration instance, loaded once at startup.
static CONFIG: OnceLock<BackdropConfig> = OnceLock::new();

/// Path to the currently loaded configuration file.
static CONFIG_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Custom config path override (set via CLI --config flag).
static CUSTOM_CONFIG_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Sets a custom configuration file path to use instead of the default search paths.
///
/// This must be called before `init()` or `get_config()` to take effect.
///
/// Returns `true` if the path was set successfully, `false` if a path was already set.
pub fn set_custom_config_path(path: PathBuf) -> bool { CUSTOM_CONFIG_PATH.set(path).is_ok() }

/// Loads the configuration from disk.
///
/// Returns the loaded configuration, or a default configuration if loading fails.
/// If no configuration file exists, creates a template configuration file.
fn load_or_default() -> BackdropConfig {
    let result = CUSTOM_CONFIG_PATH
        .get()
        .map_or_else(load_config_default, |path| load_config_from_path(path));

    match result {
        Ok((config, path)) => {
            let _ = CONFIG_PATH.set(path);
            config
        }
        Err(ConfigError::NotFound) => {
            create_default_config_file();
            BackdropConfig::default()
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to load configuration, using defaults");
            BackdropConfig::default()
        }
    }
}

/// Creates a template configuration file at the custom path, or else at the
/// preferred default location.
fn create_default_config_file() {
    let Some(config_path) = CUSTOM_CONFIG_PATH
        .get()
        .cloned()
        .or_else(|| config_paths().into_iter().next())
    else {
        tracing::debug!("no config path available for creating template");
        return;
    };

    if config_path.exists() {
        return;
    }

    match template::create_config_file(&config_path) {
        Ok(()) => {
            let _ = CONFIG_PATH.set(config_path.clone());
            tracing::info!(path = %config_path.display(), "created default configuration file");
        }
        Err(err) => {
            tracing::debug!(
                error = %err,
                path = %config_path.display(),
                "failed to create default configuration file"
            );
        }
    }
}

/// Initializes and returns the global configuration instance.
///
/// This function is idempotent - calling it multiple times will return
/// the same configuration instance.
pub fn init() -> &'static BackdropConfig { CONFIG.get_or_init(load_or_default) }

/// Returns the global configuration instance, initializing it if necessary.
pub fn get_config() -> &'static BackdropConfig { CONFIG.get_or_init(load_or_default) }

/// Returns the path to the loaded configuration file, if any.
pub fn get_config_path() -> Option<&'static PathBuf> { CONFIG_PATH.get() }

/// Location of the per-source settings file for the loaded configuration.
pub fn settings_path() -> PathBuf {
    get_config().settings_path(get_config_path().map(PathBuf::as_path))
}
