//! Wallpaper orchestrator.
//!
//! The orchestrator is an actor that owns the active source, the current
//! fetch session, the pipeline parameters and the pending per-source
//! settings. It processes one message at a time, so none of that state needs
//! locking.
//!
//! A fetch moves through the actor as a chain of messages:
//!
//! ```text
//! BeginFetch -> FetchCompleted -> PostProcessCompleted -> publish
//!            \-> FetchFailed
//! ```
//!
//! Every completion carries the id of the session that started it. Starting
//! a new fetch supersedes the current session, and results of superseded
//! sessions are dropped when they arrive, so only the most recently issued
//! fetch can change the wallpaper.
//!
//! # Panic Recovery
//!
//! A panicking handler is caught and logged, and the actor keeps processing
//! subsequent messages.

mod handle;
mod messages;
mod session;

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
pub use handle::{ActorError, OrchestratorHandle};
pub use messages::{
    ConfigChange, FetchTrigger, OrchestratorError, OrchestratorMessage, OrchestratorQuery,
    PipelineError, QueryResult, StatusSnapshot,
};
pub use session::{FetchSession, SessionId, SessionTracker};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use crate::cache::{EvictionPolicy, ImageCache};
use crate::config::store::SettingsStore;
use crate::desktop::DesktopPublisher;
use crate::events::{ProcessedWallpaper, WallpaperEvent};
use crate::metamodel::store::{load_from_store, save_to_store};
use crate::metamodel::{
    ConfigurationMetaModel, EditableItem, SourceConfiguration, bind_to_schema, discover, persist,
    to_editable_items,
};
use crate::processing::{PostProcessParams, PostProcessor};
use crate::source::{FetchError, FetchedImage, SourceHandle, SourceRegistry};

/// Channel buffer size for the orchestrator inbox.
const CHANNEL_BUFFER_SIZE: usize = 64;

/// Number of events a slow subscriber may lag behind.
const EVENT_BUFFER_SIZE: usize = 64;

/// Runtime knobs, all changeable through [`ConfigChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Time between timer-driven fetches; zero disables the timer.
    pub interval: Duration,
    /// Longest a single fetch may take; zero disables the limit.
    pub fetch_timeout: Duration,
    pub params: PostProcessParams,
    pub eviction: EvictionPolicy,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30 * 60),
            fetch_timeout: Duration::from_secs(60),
            params: PostProcessParams::default(),
            eviction: EvictionPolicy::default(),
        }
    }
}

/// Collaborators the orchestrator works with.
#[derive(Clone)]
pub struct OrchestratorContext {
    pub registry: Arc<SourceRegistry>,
    pub cache: ImageCache,
    pub desktop: Arc<dyn DesktopPublisher>,
    pub store: Arc<dyn SettingsStore>,
    pub pipeline: Arc<dyn PostProcessor>,
}

struct ActiveSource {
    handle: SourceHandle,
    /// `None` when the source has no settings or their schema is broken.
    meta: Option<ConfigurationMetaModel>,
}

/// The orchestrator actor. Use [`Orchestrator::spawn`] to start one.
pub struct Orchestrator {
    ctx: OrchestratorContext,
    settings: OrchestratorSettings,
    active: Option<ActiveSource>,
    sessions: SessionTracker,
    /// Edited settings of sources that are not active yet.
    pending: HashMap<String, Box<dyn SourceConfiguration>>,
    current: Option<ProcessedWallpaper>,
    next_tick: Option<Instant>,
    events: broadcast::Sender<WallpaperEvent>,
    /// Weak, so dropping every handle closes the inbox.
    inbox: mpsc::WeakSender<OrchestratorMessage>,
    receiver: mpsc::Receiver<OrchestratorMessage>,
}

impl Orchestrator {
    /// Spawns the orchestrator on the current tokio runtime.
    ///
    /// No source is active until [`OrchestratorHandle::activate_source`]
    /// is called.
    #[must_use]
    pub fn spawn(ctx: OrchestratorContext, settings: OrchestratorSettings) -> OrchestratorHandle {
        tracing::debug!("orchestrator: spawning");
        let (sender, receiver) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let (events, _) = broadcast::channel(EVENT_BUFFER_SIZE);

        let mut actor = Self {
            ctx,
            settings,
            active: None,
            sessions: SessionTracker::new(),
            pending: HashMap::new(),
            current: None,
            next_tick: None,
            events: events.clone(),
            inbox: sender.downgrade(),
            receiver,
        };
        actor.reset_timer();

        tokio::spawn(actor.run());

        OrchestratorHandle::new(sender, events)
    }

    async fn run(mut self) {
        tracing::trace!("orchestrator: message loop starting");

        loop {
            let msg = tokio::select! {
                msg = self.receiver.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
                () = sleep_until(self.next_tick) => OrchestratorMessage::BeginFetch(FetchTrigger::Timer),
            };

            if matches!(msg, OrchestratorMessage::Shutdown) {
                tracing::debug!("orchestrator: received shutdown message");
                break;
            }

            let msg_name = msg.name();
            let result = AssertUnwindSafe(self.handle_message(msg)).catch_unwind().await;

            if let Err(panic_info) = result {
                let panic_msg = panic_info
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic_info.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());

                tracing::error!(message = msg_name, panic = %panic_msg, "orchestrator: handler panicked");
            }
        }

        self.sessions.cancel();
        if let Some(active) = self.active.take() {
            active.handle.dispose().await;
        }
        tracing::debug!("orchestrator: stopped");
    }

    async fn handle_message(&mut self, msg: OrchestratorMessage) {
        match msg {
            OrchestratorMessage::BeginFetch(trigger) => self.on_begin_fetch(trigger),
            OrchestratorMessage::FetchCompleted { session, image } => {
                self.on_fetch_completed(session, image);
            }
            OrchestratorMessage::FetchFailed { session, error } => {
                self.on_fetch_failed(session, error);
            }
            OrchestratorMessage::PostProcessCompleted { session, outcome } => {
                self.on_post_process_completed(session, outcome).await;
            }
            OrchestratorMessage::ConfigChanged(change) => self.on_config_changed(change),
            OrchestratorMessage::ActivateSource { name, respond_to } => {
                let result = self.on_activate_source(&name).await;
                if let Some(tx) = respond_to {
                    let _ = tx.send(result);
                }
            }
            OrchestratorMessage::Query { query, respond_to } => {
                let _ = respond_to.send(self.on_query(query));
            }
            OrchestratorMessage::Shutdown => {}
        }
    }

    fn emit(&self, event: WallpaperEvent) {
        tracing::trace!(event = event.name(), "orchestrator: emitting event");
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    fn reset_timer(&mut self) {
        let interval = self.settings.interval;
        self.next_tick = (!interval.is_zero()).then(|| Instant::now() + interval);
    }

    // ========================================================================
    // Fetch lifecycle
    // ========================================================================

    fn on_begin_fetch(&mut self, trigger: FetchTrigger) {
        self.reset_timer();

        let Some(handle) = self.active.as_ref().map(|active| active.handle.clone()) else {
            tracing::warn!(%trigger, "orchestrator: no active source, not fetching");
            self.emit(WallpaperEvent::error("No source", "No wallpaper source is active"));
            return;
        };

        let (session, superseded) = self.sessions.begin(handle.name());
        if let Some(old) = superseded {
            tracing::debug!(session = %old.id, source = %old.source, "orchestrator: superseding fetch");
            handle.cancel_fetch();
        }

        let Some(inbox) = self.inbox.upgrade() else {
            return;
        };

        let id = session.id;
        let timeout = Some(self.settings.fetch_timeout).filter(|t| !t.is_zero());
        let started = handle.begin_fetch_next(session.cancel, timeout, inbox, move |outcome| {
            match outcome {
                Ok(image) => OrchestratorMessage::FetchCompleted { session: id, image },
                Err(error) => OrchestratorMessage::FetchFailed { session: id, error },
            }
        });

        match started {
            Ok(()) => {
                tracing::info!(source = %handle.name(), session = %id, %trigger, "fetching wallpaper");
                self.emit(WallpaperEvent::Changing);
            }
            Err(err) => {
                self.sessions.finish(id);
                tracing::warn!(error = %err, "orchestrator: could not start fetch");
                self.emit(WallpaperEvent::error("Fetch failed", err.to_string()));
            }
        }
    }

    fn on_fetch_completed(&self, session: SessionId, fetched: FetchedImage) {
        let Some(current) = self.sessions.current().filter(|s| s.id == session) else {
            tracing::debug!(session = %session, "orchestrator: dropping stale fetch result");
            return;
        };
        let Some(inbox) = self.inbox.upgrade() else {
            return;
        };

        tracing::debug!(session = %session, title = %fetched.image.title, "orchestrator: image fetched");

        let source = current.source.clone();
        let cache = self.ctx.cache.clone();
        let pipeline = Arc::clone(&self.ctx.pipeline);
        let params = self.settings.params;

        tokio::spawn(async move {
            let outcome = tokio::task::spawn_blocking(move || {
                build_wallpaper(&cache, pipeline.as_ref(), source, fetched, &params)
            })
            .await
            .unwrap_or_else(|err| Err(PipelineError::Aborted(err.to_string())));

            let msg = OrchestratorMessage::PostProcessCompleted {
                session,
                outcome: outcome.map(Box::new),
            };
            if inbox.send(msg).await.is_err() {
                tracing::debug!(session = %session, "pipeline finished after the orchestrator stopped");
            }
        });
    }

    fn on_fetch_failed(&mut self, session: SessionId, error: FetchError) {
        if !self.sessions.is_current(session) {
            tracing::debug!(session = %session, "orchestrator: dropping stale fetch failure");
            return;
        }
        self.sessions.finish(session);

        tracing::warn!(session = %session, error = %error, "fetch failed");
        self.emit(WallpaperEvent::Error {
            subject: error.title,
            message: error.message,
        });
    }

    async fn on_post_process_completed(
        &mut self,
        session: SessionId,
        outcome: Result<Box<ProcessedWallpaper>, PipelineError>,
    ) {
        if !self.sessions.is_current(session) {
            tracing::debug!(session = %session, "orchestrator: dropping stale processed image");
            return;
        }
        self.sessions.finish(session);

        let wallpaper = match outcome {
            Ok(wallpaper) => wallpaper,
            Err(err) => {
                tracing::warn!(session = %session, error = %err, "processing failed, keeping current wallpaper");
                self.emit(WallpaperEvent::error("Processing failed", err.to_string()));
                return;
            }
        };

        tracing::info!(
            title = %wallpaper.image.title,
            path = %wallpaper.path.display(),
            "publishing wallpaper"
        );
        self.emit(WallpaperEvent::Changed(wallpaper.clone()));

        let desktop = Arc::clone(&self.ctx.desktop);
        let path = wallpaper.path.clone();
        let applied = tokio::task::spawn_blocking(move || desktop.apply(&path))
            .await
            .map_err(|err| err.to_string())
            .and_then(|result| result.map_err(|err| err.to_string()));
        if let Err(message) = applied {
            tracing::warn!(error = %message, "could not set desktop background");
            self.emit(WallpaperEvent::error("Could not set wallpaper", message));
        }

        self.current = Some(*wallpaper);
        self.evict();
    }

    /// Applies the eviction policy in the background, sparing the current
    /// wallpaper's files.
    fn evict(&self) {
        let policy = self.settings.eviction;
        if policy.is_unbounded() {
            return;
        }

        let cache = self.ctx.cache.clone();
        let protected: HashSet<String> = self
            .current
            .iter()
            .flat_map(|wallpaper| wallpaper.cache_keys.iter().cloned())
            .collect();

        tokio::task::spawn_blocking(move || {
            if let Err(err) = cache.evict(&policy, &protected) {
                tracing::warn!(error = %err, "cache eviction failed");
            }
        });
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    fn on_config_changed(&mut self, change: ConfigChange) {
        match change {
            ConfigChange::Processing(params) => {
                tracing::debug!(variant = %params.variant_key(), "orchestrator: processing parameters updated");
                self.settings.params = params;
            }
            ConfigChange::Schedule { interval, fetch_timeout } => {
                self.settings.interval = interval;
                self.settings.fetch_timeout = fetch_timeout;
                self.reset_timer();
            }
            ConfigChange::Eviction(policy) => self.settings.eviction = policy,
            ConfigChange::SourceSettings { source, items, respond_to } => {
                let result = self.apply_source_settings(&source, &items);
                if let Err(err) = &result {
                    tracing::warn!(source = %source, error = %err, "rejected settings change");
                }
                if let Some(tx) = respond_to {
                    let _ = tx.send(result);
                }
            }
        }
    }

    fn apply_source_settings(
        &mut self,
        source: &str,
        items: &[EditableItem],
    ) -> Result<(), OrchestratorError> {
        let active = self.active.as_ref().filter(|active| active.handle.name() == source);

        if let Some(active) = active {
            let Some(meta) = active.meta.as_ref() else {
                return Err(OrchestratorError::SettingsDisabled(source.to_string()));
            };
            let mut config = active
                .handle
                .configuration()
                .ok_or_else(|| OrchestratorError::NotConfigurable(source.to_string()))?;

            let items = bind_to_schema(meta, items)?;
            persist(&items, &mut config)?;
            save_to_store(source, config.as_ref(), self.ctx.store.as_ref())?;
            active.handle.configure(config)?;

            tracing::info!(source = %source, "settings updated");
            self.on_begin_fetch(FetchTrigger::Settings);
            return Ok(());
        }

        let mut config = match self.pending.get(source) {
            Some(config) => config.clone_box(),
            None => self.stored_configuration(source)?,
        };
        let items = bind_to_schema(&discover(config.as_ref())?, items)?;
        persist(&items, &mut config)?;
        save_to_store(source, config.as_ref(), self.ctx.store.as_ref())?;

        tracing::info!(source = %source, "settings saved for later activation");
        self.pending.insert(source.to_string(), config);
        Ok(())
    }

    /// Configuration of an inactive source as currently persisted.
    fn stored_configuration(&self, source: &str) -> Result<Box<dyn SourceConfiguration>, OrchestratorError> {
        let handle = self.ctx.registry.create(source)?;
        let mut config = handle
            .configuration()
            .ok_or_else(|| OrchestratorError::NotConfigurable(source.to_string()))?;
        load_from_store(source, &mut config, self.ctx.store.as_ref())?;
        Ok(config)
    }

    // ========================================================================
    // Source activation
    // ========================================================================

    async fn on_activate_source(&mut self, name: &str) -> Result<(), OrchestratorError> {
        if let Some(old) = self.sessions.cancel() {
            tracing::debug!(session = %old.id, "orchestrator: cancelling fetch for source change");
        }
        if let Some(previous) = self.active.take() {
            tracing::debug!(source = %previous.handle.name(), "orchestrator: disposing source");
            previous.handle.dispose().await;
        }

        let handle = match self.ctx.registry.create(name) {
            Ok(handle) => handle,
            Err(err) => {
                self.emit(WallpaperEvent::error("Unknown source", err.to_string()));
                return Err(err.into());
            }
        };

        if let Err(err) = handle.initialize().await {
            tracing::error!(source = %name, error = %err, "source failed to initialize");
            self.emit(WallpaperEvent::error(
                format!("{} unavailable", handle.descriptor().display_name),
                err.to_string(),
            ));
            handle.dispose().await;
            return Err(err.into());
        }

        let meta = self.restore_settings(&handle);
        tracing::info!(source = %name, editable = meta.is_some(), "source activated");
        self.active = Some(ActiveSource { handle, meta });
        Ok(())
    }

    /// Hands pending or stored settings to `handle` and discovers their
    /// schema. A broken schema only disables editing.
    fn restore_settings(&mut self, handle: &SourceHandle) -> Option<ConfigurationMetaModel> {
        let name = handle.name().to_string();
        let mut config = handle.configuration()?;

        if let Some(pending) = self.pending.remove(&name) {
            config = pending;
        } else if let Err(err) = load_from_store(&name, &mut config, self.ctx.store.as_ref()) {
            tracing::warn!(source = %name, error = %err, "could not restore stored settings");
        }

        if let Err(err) = handle.configure(config.clone_box()) {
            tracing::warn!(source = %name, error = %err, "source rejected restored settings");
        }

        match discover(config.as_ref()) {
            Ok(meta) => Some(meta),
            Err(err) => {
                tracing::warn!(source = %name, error = %err, "settings editing disabled");
                None
            }
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    fn on_query(&self, query: OrchestratorQuery) -> QueryResult {
        match query {
            OrchestratorQuery::Status => QueryResult::Status(Box::new(self.status())),
            OrchestratorQuery::Settings => QueryResult::Settings(self.editable_items()),
        }
    }

    fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            source: self.active.as_ref().map(|active| active.handle.descriptor()),
            source_state: self.active.as_ref().map(|active| active.handle.state().to_string()),
            in_flight: self.sessions.current().map(|session| session.id),
            last_session: self.sessions.last_id(),
            current: self.current.clone(),
            params: self.settings.params,
            interval_secs: self.settings.interval.as_secs(),
            fetch_timeout_secs: self.settings.fetch_timeout.as_secs(),
            settings_editable: self.active.as_ref().is_some_and(|active| active.meta.is_some()),
        }
    }

    fn editable_items(&self) -> Option<Vec<EditableItem>> {
        let active = self.active.as_ref()?;
        let meta = active.meta.as_ref()?;
        let config = active.handle.configuration()?;
        Some(to_editable_items(meta, config.as_ref()))
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => futures::future::pending::<()>().await,
    }
}

/// Caches the raw bytes, runs the pipeline and caches its output.
///
/// Runs on the blocking pool.
fn build_wallpaper(
    cache: &ImageCache,
    pipeline: &dyn PostProcessor,
    source: String,
    fetched: FetchedImage,
    params: &PostProcessParams,
) -> Result<ProcessedWallpaper, PipelineError> {
    let FetchedImage { mut image, bytes } = fetched;

    let raw = cache.store_raw(&image, &bytes)?;
    image.raw_location = Some(raw.path.clone());

    let artifact = pipeline.process(&bytes, params)?;
    let processed = cache.store_processed(&image, &artifact.bytes, &artifact.variant_key)?;
    image.processed_location = Some(processed.path.clone());

    let mut cache_keys = vec![raw.key, processed.key];
    let preview_path = match &artifact.preview {
        Some(preview) => {
            let stored = cache.store_processed(&image, preview, &format!("{}-preview", artifact.variant_key))?;
            cache_keys.push(stored.key);
            Some(stored.path)
        }
        None => None,
    };

    Ok(ProcessedWallpaper {
        source,
        image,
        path: processed.path,
        preview_path,
        geometry: artifact.geometry,
        variant_key: artifact.variant_key,
        cache_keys,
    })
}
