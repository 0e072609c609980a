//! Content-keyed artifact store.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use super::{CacheError, get_cache_subdir};
use crate::source::FetchImage;

const RAW_DIR: &str = "raw";
const PROCESSED_DIR: &str = "processed";

/// Whether an artifact holds downloaded or post-processed bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Raw,
    Processed,
}

impl ArtifactKind {
    const fn dir(self) -> &'static str {
        match self {
            Self::Raw => RAW_DIR,
            Self::Processed => PROCESSED_DIR,
        }
    }
}

/// One cached file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedArtifact {
    /// Cache key, unique across both kinds.
    pub key: String,
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub size: u64,
    /// Last write or cache hit.
    #[serde(skip)]
    pub accessed: SystemTime,
}

/// Store for raw and processed images.
///
/// Raw keys are `<sha256(identity)>.<ext>`, with one raw entry per identity
/// whatever the extension; processed keys are
/// `<sha256(identity)>_<variant>.jpg`, so every distinct set of processing
/// parameters gets its own file.
#[derive(Debug, Clone)]
pub struct ImageCache {
    root: PathBuf,
}

impl Default for ImageCache {
    fn default() -> Self { Self::new(get_cache_subdir("images")) }
}

impl ImageCache {
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

    #[must_use]
    pub fn root(&self) -> &Path { &self.root }

    /// Hex SHA-256 of the image identity.
    #[must_use]
    pub fn base_key(image: &FetchImage) -> String {
        hex::encode(Sha256::digest(image.identity().as_bytes()))
    }

    /// Key under which new raw bytes of `image` would be stored.
    #[must_use]
    pub fn raw_key(image: &FetchImage, bytes: &[u8]) -> String {
        format!("{}.{}", Self::base_key(image), sniff_extension(bytes))
    }

    /// Key under which a processed variant of `image` is stored.
    #[must_use]
    pub fn processed_key(image: &FetchImage, variant_key: &str) -> String {
        format!("{}_{variant_key}.jpg", Self::base_key(image))
    }

    /// Stores the original bytes of `image`.
    ///
    /// Storing the same identity again returns the existing entry without
    /// writing, even when the new bytes are in another format.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] if the file cannot be written.
    pub fn store_raw(&self, image: &FetchImage, bytes: &[u8]) -> Result<CachedArtifact, CacheError> {
        if let Some(existing) = self.find_raw(&Self::base_key(image)) {
            tracing::trace!(key = %existing.key, "raw entry already present");
            return Ok(existing);
        }
        self.store(ArtifactKind::Raw, &Self::raw_key(image, bytes), bytes)
    }

    /// The raw entry stored for `base_key`, whatever its extension.
    fn find_raw(&self, base_key: &str) -> Option<CachedArtifact> {
        let dir = self.root.join(RAW_DIR);
        let prefix = format!("{base_key}.");
        fs::read_dir(&dir).ok()?.flatten().find_map(|entry| {
            let path = entry.path();
            let key = path.file_name()?.to_str()?;
            if key.starts_with(&prefix) {
                artifact_at(ArtifactKind::Raw, key, &path)
            } else {
                None
            }
        })
    }

    /// Stores a processed variant of `image`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] if the file cannot be written.
    pub fn store_processed(
        &self,
        image: &FetchImage,
        bytes: &[u8],
        variant_key: &str,
    ) -> Result<CachedArtifact, CacheError> {
        self.store(ArtifactKind::Processed, &Self::processed_key(image, variant_key), bytes)
    }

    fn store(&self, kind: ArtifactKind, key: &str, bytes: &[u8]) -> Result<CachedArtifact, CacheError> {
        let dir = self.root.join(kind.dir());
        let path = dir.join(key);

        if let Some(existing) = artifact_at(kind, key, &path) {
            tracing::trace!(key = %key, "cache entry already present");
            return Ok(existing);
        }

        fs::create_dir_all(&dir).map_err(|err| CacheError::io(&dir, err))?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|err| CacheError::io(&dir, err))?;
        tmp.write_all(bytes).map_err(|err| CacheError::io(tmp.path(), err))?;
        tmp.as_file().sync_all().map_err(|err| CacheError::io(tmp.path(), err))?;
        tmp.persist(&path).map_err(|err| CacheError::io(&path, err.error))?;

        tracing::debug!(key = %key, bytes = bytes.len(), "stored cache entry");
        artifact_at(kind, key, &path).ok_or_else(|| {
            CacheError::io(&path, std::io::Error::from(std::io::ErrorKind::NotFound))
        })
    }

    /// Looks up an entry by key. A miss is `None`, never an error.
    ///
    /// A hit counts as an access for eviction purposes.
    #[must_use]
    pub fn fetch_or_null(&self, key: &str) -> Option<CachedArtifact> {
        if !is_plain_key(key) {
            return None;
        }

        [ArtifactKind::Raw, ArtifactKind::Processed].into_iter().find_map(|kind| {
            let path = self.root.join(kind.dir()).join(key);
            let artifact = artifact_at(kind, key, &path)?;
            Some(touch(artifact))
        })
    }

    /// Lists every entry, oldest access first.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] if a cache directory cannot be read.
    pub fn entries(&self) -> Result<Vec<CachedArtifact>, CacheError> {
        let mut entries = Vec::new();

        for kind in [ArtifactKind::Raw, ArtifactKind::Processed] {
            let dir = self.root.join(kind.dir());
            let listing = match fs::read_dir(&dir) {
                Ok(listing) => listing,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(CacheError::io(&dir, err)),
            };

            for entry in listing.flatten() {
                let path = entry.path();
                let Some(key) = path.file_name().and_then(|name| name.to_str()) else {
                    continue;
                };
                // Skip in-flight temporary files.
                if key.starts_with('.') {
                    continue;
                }
                if let Some(artifact) = artifact_at(kind, key, &path) {
                    entries.push(artifact);
                }
            }
        }

        entries.sort_by(|a, b| a.accessed.cmp(&b.accessed).then_with(|| a.key.cmp(&b.key)));
        Ok(entries)
    }

    /// Deletes the entry with `key`. Returns whether something was removed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] if the file exists but cannot be deleted.
    pub fn remove(&self, key: &str) -> Result<bool, CacheError> {
        if !is_plain_key(key) {
            return Ok(false);
        }

        let mut removed = false;
        for kind in [ArtifactKind::Raw, ArtifactKind::Processed] {
            let path = self.root.join(kind.dir()).join(key);
            match fs::remove_file(&path) {
                Ok(()) => removed = true,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(CacheError::io(&path, err)),
            }
        }
        Ok(removed)
    }

    /// Total size of all entries in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] if the cache cannot be listed.
    pub fn total_size(&self) -> Result<u64, CacheError> {
        Ok(self.entries()?.iter().map(|entry| entry.size).sum())
    }

    /// Removes the whole cache directory and returns the bytes freed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] if the directory cannot be removed.
    pub fn clear(&self) -> Result<u64, CacheError> {
        if !self.root.exists() {
            return Ok(0);
        }

        let freed = self.total_size()?;
        fs::remove_dir_all(&self.root).map_err(|err| CacheError::io(&self.root, err))?;
        Ok(freed)
    }
}

/// Keys are bare file names; anything that could escape the cache is a miss.
fn is_plain_key(key: &str) -> bool {
    !key.is_empty() && !key.starts_with('.') && !key.contains(['/', '\\'])
}

fn artifact_at(kind: ArtifactKind, key: &str, path: &Path) -> Option<CachedArtifact> {
    let metadata = fs::metadata(path).ok().filter(fs::Metadata::is_file)?;
    Some(CachedArtifact {
        key: key.to_string(),
        kind,
        path: path.to_path_buf(),
        size: metadata.len(),
        accessed: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
    })
}

/// Refreshes the access time of a hit.
fn touch(mut artifact: CachedArtifact) -> CachedArtifact {
    let now = SystemTime::now();
    let touched = File::options()
        .append(true)
        .open(&artifact.path)
        .and_then(|file| file.set_modified(now));

    match touched {
        Ok(()) => artifact.accessed = now,
        Err(err) => {
            tracing::debug!(key = %artifact.key, error = %err, "failed to refresh cache entry");
        }
    }
    artifact
}

/// File extension matching the encoded format of `bytes`.
fn sniff_extension(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Jpeg) => "jpg",
        Ok(image::ImageFormat::Png) => "png",
        Ok(image::ImageFormat::WebP) => "webp",
        _ => "img",
    }
}
