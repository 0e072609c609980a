//! Application-wide constants.

/// Name used for the config, cache and data directories.
pub const APP_NAME: &str = "backdrop";

/// Config file names, in lookup order.
pub const CONFIG_FILE_NAMES: [&str; 2] = ["config.jsonc", "config.json"];

/// Default name of the source settings file, next to the config file.
pub const SETTINGS_FILE_NAME: &str = "settings.json";
