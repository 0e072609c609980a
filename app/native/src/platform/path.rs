//! Shell-like path expansion for paths coming from configuration.

use std::path::{Path, PathBuf};

/// Expands a leading `~` to the home directory.
///
/// Surrounding whitespace is ignored; a blank input yields an empty path.
#[must_use]
pub fn expand(path: &str) -> PathBuf {
    let path = path.trim();
    if path.is_empty() {
        return PathBuf::new();
    }
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

/// Like [`expand`], but relative paths are anchored at `base_dir`.
///
/// Used for paths inside the config file, which are relative to the file.
#[must_use]
pub fn expand_relative_to(path: &str, base_dir: &Path) -> PathBuf {
    let expanded = expand(path);
    if expanded.as_os_str().is_empty() || expanded.is_absolute() {
        expanded
    } else {
        base_dir.join(expanded)
    }
}
