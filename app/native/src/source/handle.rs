//! Lifecycle wrapper around a provider.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{FetchError, FetchedImage, ImageSource, SourceDescriptor, SourceError};
use crate::metamodel::SourceConfiguration;

/// Result of one fetch as seen by the orchestrator.
pub type FetchOutcome = Result<FetchedImage, FetchError>;

/// Lifecycle state of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Uninitialized,
    Idle,
    /// A fetch is running; the number identifies it within this handle.
    Fetching(u64),
    Disposed,
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => f.write_str("uninitialized"),
            Self::Idle => f.write_str("idle"),
            Self::Fetching(_) => f.write_str("fetching"),
            Self::Disposed => f.write_str("disposed"),
        }
    }
}

#[derive(Debug)]
struct Lifecycle {
    state: SourceState,
    next_fetch: u64,
}

/// Owns one provider instance and enforces
/// `Uninitialized -> Idle <-> Fetching -> Disposed`.
#[derive(Clone)]
pub struct SourceHandle {
    name: String,
    source: Arc<dyn ImageSource>,
    lifecycle: Arc<Mutex<Lifecycle>>,
}

impl fmt::Debug for SourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceHandle")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SourceHandle {
    pub fn new(name: impl Into<String>, source: Arc<dyn ImageSource>) -> Self {
        Self {
            name: name.into(),
            source,
            lifecycle: Arc::new(Mutex::new(Lifecycle {
                state: SourceState::Uninitialized,
                next_fetch: 0,
            })),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str { &self.name }

    #[must_use]
    pub fn descriptor(&self) -> SourceDescriptor { self.source.descriptor() }

    #[must_use]
    pub fn state(&self) -> SourceState { self.lifecycle.lock().state }

    fn invalid(&self, operation: &'static str, state: SourceState) -> SourceError {
        SourceError::InvalidState {
            name: self.name.clone(),
            operation,
            state: state.to_string(),
        }
    }

    /// Runs the provider's one-time setup.
    ///
    /// # Errors
    ///
    /// Returns the provider's initialization error, or
    /// [`SourceError::InvalidState`] if the source was already initialized.
    pub async fn initialize(&self) -> Result<(), SourceError> {
        let state = self.state();
        if state != SourceState::Uninitialized {
            return Err(self.invalid("initialize", state));
        }

        self.source.initialize().await?;

        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state == SourceState::Uninitialized {
            lifecycle.state = SourceState::Idle;
        }
        Ok(())
    }

    /// Snapshot of the provider's configuration. Disposed sources have none.
    #[must_use]
    pub fn configuration(&self) -> Option<Box<dyn SourceConfiguration>> {
        if self.state() == SourceState::Disposed {
            return None;
        }
        self.source.configuration()
    }

    /// Hands a new configuration to the provider.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidState`] once disposed, or the provider's
    /// own error if it rejects the configuration.
    pub fn configure(&self, config: Box<dyn SourceConfiguration>) -> Result<(), SourceError> {
        let state = self.state();
        if state == SourceState::Disposed {
            return Err(self.invalid("configure", state));
        }
        self.source.configure(config)
    }

    /// Starts one fetch in the background and returns immediately.
    ///
    /// The outcome is wrapped by `wrap` and posted to `reply`. A panicking
    /// provider is reported as a failed fetch. When `timeout` elapses first,
    /// `cancel` is fired and the fetch is reported as timed out.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidState`] unless the source is idle.
    pub fn begin_fetch_next<M, F>(
        &self,
        cancel: CancellationToken,
        timeout: Option<Duration>,
        reply: mpsc::Sender<M>,
        wrap: F,
    ) -> Result<(), SourceError>
    where
        M: Send + 'static,
        F: FnOnce(FetchOutcome) -> M + Send + 'static,
    {
        let fetch_id = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state != SourceState::Idle {
                return Err(self.invalid("fetch", lifecycle.state));
            }
            lifecycle.next_fetch += 1;
            lifecycle.state = SourceState::Fetching(lifecycle.next_fetch);
            lifecycle.next_fetch
        };

        let source = Arc::clone(&self.source);
        let lifecycle = Arc::clone(&self.lifecycle);
        let name = self.name.clone();

        tokio::spawn(async move {
            let outcome = run_fetch(source, cancel, timeout, &name).await;

            {
                let mut lifecycle = lifecycle.lock();
                if lifecycle.state == SourceState::Fetching(fetch_id) {
                    lifecycle.state = SourceState::Idle;
                }
            }

            if reply.send(wrap(outcome)).await.is_err() {
                tracing::debug!(source = %name, "fetch finished after the receiver closed");
            }
        });

        Ok(())
    }

    /// Asks the provider to abandon the running fetch.
    ///
    /// The source is idle again right away; whatever the abandoned fetch
    /// still reports is the caller's to ignore.
    pub fn cancel_fetch(&self) {
        let was_fetching = {
            let mut lifecycle = self.lifecycle.lock();
            if matches!(lifecycle.state, SourceState::Fetching(_)) {
                lifecycle.state = SourceState::Idle;
                true
            } else {
                false
            }
        };

        if was_fetching {
            self.source.cancel_fetch();
        }
    }

    /// Disposes the provider. Calling it twice is a no-op.
    pub async fn dispose(&self) {
        let previous = {
            let mut lifecycle = self.lifecycle.lock();
            std::mem::replace(&mut lifecycle.state, SourceState::Disposed)
        };

        match previous {
            SourceState::Disposed => {}
            SourceState::Fetching(_) => {
                self.source.cancel_fetch();
                self.source.dispose().await;
            }
            SourceState::Uninitialized | SourceState::Idle => self.source.dispose().await,
        }
    }
}

async fn run_fetch(
    source: Arc<dyn ImageSource>,
    cancel: CancellationToken,
    timeout: Option<Duration>,
    name: &str,
) -> FetchOutcome {
    let fetch = AssertUnwindSafe(source.fetch_next(cancel.clone())).catch_unwind();
    let deadline = async {
        match timeout {
            Some(after) => tokio::time::sleep(after).await,
            None => futures::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = fetch => match result {
            Ok(outcome) => outcome,
            Err(panic_info) => {
                let panic_msg = panic_info
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic_info.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(source = %name, panic = %panic_msg, "source panicked while fetching");
                Err(FetchError::new("Source failed", panic_msg))
            }
        },
        () = deadline => {
            cancel.cancel();
            let after = timeout.unwrap_or_default();
            tracing::warn!(source = %name, seconds = after.as_secs(), "fetch timed out");
            Err(FetchError::timed_out(after))
        }
    }
}
