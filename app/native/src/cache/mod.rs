//! On-disk image cache.
//!
//! Raw downloads and processed variants live under the application's cache
//! directory (`~/.cache/backdrop/images` on Linux, `~/Library/Caches/...` on
//! macOS), falling back to the system temp directory when no cache directory
//! is known.
//!
//! Entries are written once through a temporary file and renamed into place;
//! they are never edited afterwards. Eviction only ever deletes whole files.

mod eviction;
mod store;

use std::path::PathBuf;

pub use eviction::{EvictionPolicy, EvictionReport};
pub use store::{ArtifactKind, CachedArtifact, ImageCache};
use thiserror::Error;

use crate::constants::APP_NAME;

/// Errors raised by cache I/O.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

/// Root cache directory of the application.
#[must_use]
pub fn get_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
}

/// A named subdirectory of [`get_cache_dir`].
#[must_use]
pub fn get_cache_subdir(subdir: &str) -> PathBuf { get_cache_dir().join(subdir) }

/// Formats a byte count for humans, e.g. `1.50 MB`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{bytes} bytes");
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}
