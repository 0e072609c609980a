//! Local folder provider.
//!
//! Serves images from a directory on disk, either in natural filename order
//! or at random.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use natord::compare;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::metamodel::{
    ConfigValue, ConfigurationItemDescriptor, MetaModelError, PropertyDeclaration,
    SourceConfiguration, ValidationFailure, ValidationReason, ValueType, copy_values,
};
use crate::platform::path::expand;
use crate::source::{
    FetchError, FetchImage, FetchedImage, ImageSource, SourceDescriptor, SourceError,
};

/// Extensions picked up by default.
pub const DEFAULT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

const MAX_PATH_LENGTH: usize = 1024;

/// Order in which images are served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FolderMode {
    #[default]
    Random,
    Sequential,
}

impl FolderMode {
    const CHOICES: [&'static str; 2] = ["random", "sequential"];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::Sequential => "sequential",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "random" => Some(Self::Random),
            "sequential" => Some(Self::Sequential),
            _ => None,
        }
    }
}

/// Settings of the folder provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderSettings {
    pub path: String,
    pub mode: FolderMode,
    pub extensions: Vec<String>,
    pub recursive: bool,
}

impl Default for FolderSettings {
    fn default() -> Self {
        Self {
            path: String::from("~/Pictures"),
            mode: FolderMode::Random,
            extensions: DEFAULT_EXTENSIONS.iter().map(|ext| (*ext).to_string()).collect(),
            recursive: false,
        }
    }
}

impl SourceConfiguration for FolderSettings {
    fn declare(&self) -> Vec<PropertyDeclaration> {
        vec![
            PropertyDeclaration::new(
                "path",
                ValueType::Text,
                ConfigurationItemDescriptor::string("Folder", 0, MAX_PATH_LENGTH, true, "~/Pictures")
                    .with_help("Directory to pick images from. `~` expands to your home."),
            ),
            PropertyDeclaration::new(
                "mode",
                ValueType::Text,
                ConfigurationItemDescriptor::single_choice(
                    "Order",
                    1,
                    FolderMode::CHOICES,
                    FolderMode::Random.as_str(),
                ),
            ),
            PropertyDeclaration::new(
                "extensions",
                ValueType::TextList,
                ConfigurationItemDescriptor::multi_choice(
                    "File types",
                    2,
                    DEFAULT_EXTENSIONS.iter().copied(),
                    true,
                    DEFAULT_EXTENSIONS.iter().map(|ext| (*ext).to_string()).collect(),
                ),
            ),
            PropertyDeclaration::new(
                "recursive",
                ValueType::Bool,
                ConfigurationItemDescriptor::switch("Include subfolders", 3, false),
            ),
        ]
    }

    fn get(&self, property: &str) -> Option<ConfigValue> {
        match property {
            "path" => Some(ConfigValue::Text(self.path.clone())),
            "mode" => Some(ConfigValue::Text(self.mode.as_str().to_string())),
            "extensions" => Some(ConfigValue::TextList(self.extensions.clone())),
            "recursive" => Some(ConfigValue::Bool(self.recursive)),
            _ => None,
        }
    }

    fn set(&mut self, property: &str, value: ConfigValue) -> Result<(), MetaModelError> {
        match (property, value) {
            ("path", ConfigValue::Text(path)) => self.path = path,
            ("mode", ConfigValue::Text(mode)) => {
                self.mode = FolderMode::parse(&mode).ok_or_else(|| {
                    MetaModelError::Validation(vec![ValidationFailure {
                        property: "mode".into(),
                        label: "Order".into(),
                        reason: ValidationReason::NotAChoice { value: mode.clone() },
                    }])
                })?;
            }
            ("extensions", ConfigValue::TextList(extensions)) => {
                self.extensions = extensions
                    .into_iter()
                    .map(|ext| ext.trim_start_matches('.').to_lowercase())
                    .filter(|ext| !ext.is_empty())
                    .collect();
            }
            ("recursive", ConfigValue::Bool(recursive)) => self.recursive = recursive,
            ("path" | "mode" | "extensions" | "recursive", other) => {
                let expected = self.declare().into_iter().find(|d| d.property == property);
                return Err(MetaModelError::type_mismatch(
                    property,
                    expected.map_or(ValueType::Text, |d| d.value_type),
                    &other,
                ));
            }
            (unknown, _) => return Err(MetaModelError::UnknownProperty(unknown.to_string())),
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn SourceConfiguration> { Box::new(self.clone()) }
}

/// Checks if a file has one of the given extensions, ignoring case.
fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
}

/// Lists matching image files under `dir`, naturally sorted by path.
pub fn list_images(dir: &Path, extensions: &[String], recursive: bool) -> Vec<PathBuf> {
    fn walk(dir: &Path, extensions: &[String], recursive: bool, out: &mut Vec<PathBuf>) {
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if recursive {
                    walk(&path, extensions, recursive, out);
                }
            } else if path.is_file() && has_extension(&path, extensions) {
                out.push(path);
            }
        }
    }

    let mut images = Vec::new();
    if dir.is_dir() {
        walk(dir, extensions, recursive, &mut images);
    }
    images.sort_by(|a, b| compare(a.to_string_lossy().as_ref(), b.to_string_lossy().as_ref()));
    images
}

/// Serves images from a local directory.
#[derive(Debug, Default)]
pub struct FolderSource {
    settings: RwLock<FolderSettings>,
    last: Mutex<Option<PathBuf>>,
}

impl FolderSource {
    pub const NAME: &'static str = "folder";

    #[must_use]
    pub fn new() -> Self { Self::default() }

    #[must_use]
    pub fn with_settings(settings: FolderSettings) -> Self {
        Self {
            settings: RwLock::new(settings),
            last: Mutex::new(None),
        }
    }

    /// Picks the next file according to the configured mode.
    fn pick(&self, images: &[PathBuf], mode: FolderMode) -> Option<PathBuf> {
        if images.is_empty() {
            return None;
        }

        let mut last = self.last.lock();
        let previous = last.as_ref().and_then(|prev| images.iter().position(|p| p == prev));

        let index = match mode {
            FolderMode::Sequential => previous.map_or(0, |i| (i + 1) % images.len()),
            FolderMode::Random => {
                let mut rng = rand::rng();
                let mut index = rng.random_range(0..images.len());
                // Avoid serving the same file twice in a row.
                if images.len() > 1 && Some(index) == previous {
                    index = (index + 1 + rng.random_range(0..images.len() - 1)) % images.len();
                }
                index
            }
        };

        let chosen = images[index].clone();
        *last = Some(chosen.clone());
        Some(chosen)
    }
}

fn file_title(path: &Path) -> String {
    path.file_stem()
        .map_or_else(|| path.display().to_string(), |stem| stem.to_string_lossy().into_owned())
}

#[async_trait]
impl ImageSource for FolderSource {
    fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor::new(Self::NAME, "Local folder", "Images from a directory on this computer")
            .with_icon("folder")
    }

    async fn initialize(&self) -> Result<(), SourceError> {
        let path = self.settings.read().path.clone();
        if !expand(&path).is_dir() {
            tracing::warn!(path = %path, "folder source points to a missing directory");
        }
        Ok(())
    }

    fn configuration(&self) -> Option<Box<dyn SourceConfiguration>> {
        Some(self.settings.read().clone_box())
    }

    fn configure(&self, config: Box<dyn SourceConfiguration>) -> Result<(), SourceError> {
        let mut next = self.settings.read().clone();
        copy_values(&mut next, config.as_ref())
            .map_err(|err| SourceError::configuration(Self::NAME, err))?;
        *self.settings.write() = next;
        Ok(())
    }

    async fn fetch_next(&self, cancel: CancellationToken) -> Result<FetchedImage, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::cancelled());
        }

        let settings = self.settings.read().clone();
        let dir = expand(&settings.path);

        if !dir.is_dir() {
            return Err(FetchError::new(
                "Folder not found",
                format!("{} is not a directory", settings.path),
            ));
        }

        let listing = {
            let dir = dir.clone();
            let extensions = settings.extensions.clone();
            tokio::task::spawn_blocking(move || list_images(&dir, &extensions, settings.recursive))
        };
        let images = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(FetchError::cancelled()),
            joined = listing => joined.map_err(|err| FetchError::new("Folder", err.to_string()))?,
        };

        let Some(path) = self.pick(&images, settings.mode) else {
            return Err(FetchError::new(
                "No images",
                format!("No supported images in {}", settings.path),
            ));
        };

        let read = {
            let path = path.clone();
            tokio::task::spawn_blocking(move || fs::read(path))
        };
        let bytes = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(FetchError::cancelled()),
            joined = read => joined
                .map_err(|err| FetchError::new("Folder", err.to_string()))?
                .map_err(|err| FetchError::new("Unreadable image", format!("{}: {err}", path.display())))?,
        };

        tracing::debug!(path = %path.display(), bytes = bytes.len(), "picked image from folder");

        let image = FetchImage::new(file_title(&path))
            .with_image_url(format!("file://{}", path.display()));
        Ok(FetchedImage::new(image, bytes))
    }
}
