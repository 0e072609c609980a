//! Pluggable image sources.
//!
//! Every provider implements [`ImageSource`]. The orchestrator never talks to
//! a provider directly; it goes through a [`SourceHandle`], which enforces the
//! lifecycle and runs fetches as background tasks that report back through a
//! channel.

mod handle;
pub mod providers;
mod registry;
mod types;

use async_trait::async_trait;
pub use handle::{FetchOutcome, SourceHandle, SourceState};
pub use registry::{RegistryError, SourceFactory, SourceRegistry};
use tokio_util::sync::CancellationToken;
pub use types::{FetchError, FetchImage, FetchedImage, License, SourceDescriptor, SourceError};

use crate::metamodel::SourceConfiguration;

/// Contract implemented by every image provider.
///
/// All methods take `&self`; providers keep their mutable state behind
/// locks so a fetch can run concurrently with `configure`.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Identity of this provider.
    fn descriptor(&self) -> SourceDescriptor;

    /// One-time setup, called before any fetch.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Initialization`] when the provider cannot work.
    async fn initialize(&self) -> Result<(), SourceError> { Ok(()) }

    /// Snapshot of the current configuration; `None` when not configurable.
    fn configuration(&self) -> Option<Box<dyn SourceConfiguration>>;

    /// Replaces the active configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Configuration`] when the configuration cannot
    /// be adopted. The previous configuration stays active in that case.
    fn configure(&self, config: Box<dyn SourceConfiguration>) -> Result<(), SourceError>;

    /// Fetches exactly one image.
    ///
    /// Implementations should stop early once `cancel` fires.
    async fn fetch_next(&self, cancel: CancellationToken) -> Result<FetchedImage, FetchError>;

    /// Best-effort request to abandon the in-flight fetch.
    fn cancel_fetch(&self) {}

    /// Releases resources. Nothing else is called afterwards.
    async fn dispose(&self) {}
}
