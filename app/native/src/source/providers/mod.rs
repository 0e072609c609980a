//! Providers shipped with the application.

mod bing;
mod folder;

pub use bing::{BingSettings, BingSource};
pub use folder::{DEFAULT_EXTENSIONS, FolderMode, FolderSettings, FolderSource, list_images};
