//! Desktop background publishing.
//!
//! The orchestrator only knows [`DesktopPublisher`]; the platform call lives
//! behind [`SystemDesktop`].

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

/// Errors that can occur when setting the desktop background.
#[derive(Debug)]
pub enum DesktopError {
    /// The image file does not exist.
    FileNotFound(PathBuf),
    /// The platform refused the new background.
    SetFailed(String),
}

impl std::fmt::Display for DesktopError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FileNotFound(path) => write!(f, "Wallpaper file not found: {}", path.display()),
            Self::SetFailed(msg) => write!(f, "Failed to set wallpaper: {msg}"),
        }
    }
}

impl std::error::Error for DesktopError {}

/// Sets an image file as the desktop background.
pub trait DesktopPublisher: Send + Sync {
    /// Applies `path` on every screen.
    ///
    /// # Errors
    ///
    /// Returns [`DesktopError`] if the file is missing or the platform call
    /// fails.
    fn apply(&self, path: &Path) -> Result<(), DesktopError>;
}

/// Uses the operating system's wallpaper setting.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDesktop;

impl DesktopPublisher for SystemDesktop {
    fn apply(&self, path: &Path) -> Result<(), DesktopError> {
        if !path.exists() {
            return Err(DesktopError::FileNotFound(path.to_path_buf()));
        }

        let path_str = path.display().to_string();
        wallpaper::set_from_path(&path_str).map_err(|e| DesktopError::SetFailed(e.to_string()))?;
        tracing::debug!(path = %path_str, "desktop background updated");
        Ok(())
    }
}

/// Dry-run publisher that only remembers what it was asked to apply.
#[derive(Debug, Default)]
pub struct NoopDesktop {
    applied: Mutex<Vec<PathBuf>>,
}

impl NoopDesktop {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Every path passed to [`DesktopPublisher::apply`], oldest first.
    #[must_use]
    pub fn applied(&self) -> Vec<PathBuf> { self.applied.lock().clone() }
}

impl DesktopPublisher for NoopDesktop {
    fn apply(&self, path: &Path) -> Result<(), DesktopError> {
        tracing::info!(path = %path.display(), "dry run, not changing the desktop background");
        self.applied.lock().push(path.to_path_buf());
        Ok(())
    }
}
