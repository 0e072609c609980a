//! End-to-end tests for the orchestrator.
//!
//! Every test drives a real orchestrator against a scripted in-memory
//! source, an in-memory settings store, a temporary image cache and a
//! dry-run desktop, and observes it only through its public handle and
//! event stream.

use std::collections::{BTreeMap, VecDeque};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::time::Duration;

use async_trait::async_trait;
use backdrop_lib::cache::{EvictionPolicy, ImageCache};
use backdrop_lib::config::store::{MemorySettingsStore, SettingsStore, StoreError};
use backdrop_lib::desktop::NoopDesktop;
use backdrop_lib::events::WallpaperEvent;
use backdrop_lib::metamodel::{
    ConfigValue, ConfigurationItemDescriptor, MetaModelError, PropertyDeclaration,
    SourceConfiguration, ValueType, discover, to_editable_items,
};
use backdrop_lib::orchestrator::{
    FetchTrigger, Orchestrator, OrchestratorContext, OrchestratorError, OrchestratorHandle,
    OrchestratorSettings,
};
use backdrop_lib::processing::{
    ImagePipeline, PostProcessParams, PostProcessor, ProcessedArtifact, ProcessingError, ScreenSize,
};
use backdrop_lib::source::{
    FetchError, FetchImage, FetchedImage, ImageSource, SourceDescriptor, SourceError,
    SourceRegistry,
};
use image::{ImageFormat, Rgb, RgbImage};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Scripted source
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
struct Caption {
    caption: String,
}

impl Default for Caption {
    fn default() -> Self { Self { caption: "first".into() } }
}

impl SourceConfiguration for Caption {
    fn declare(&self) -> Vec<PropertyDeclaration> {
        vec![PropertyDeclaration::new(
            "caption",
            ValueType::Text,
            ConfigurationItemDescriptor::string("Caption", 0, 16, true, "first"),
        )]
    }

    fn get(&self, property: &str) -> Option<ConfigValue> {
        (property == "caption").then(|| ConfigValue::Text(self.caption.clone()))
    }

    fn set(&mut self, property: &str, value: ConfigValue) -> Result<(), MetaModelError> {
        match (property, value) {
            ("caption", ConfigValue::Text(caption)) => {
                self.caption = caption;
                Ok(())
            }
            (property, _) => Err(MetaModelError::UnknownProperty(property.to_string())),
        }
    }

    fn clone_box(&self) -> Box<dyn SourceConfiguration> { Box::new(self.clone()) }
}

/// What the next call to `fetch_next` does.
enum Step {
    /// Resolves once the test sends an image.
    Gate(oneshot::Receiver<FetchedImage>),
    /// Fails once the test sends an error.
    FailGate(oneshot::Receiver<FetchError>),
    Image(FetchedImage),
    /// Never resolves and ignores cancellation.
    Hang,
    Panic,
}

#[derive(Default)]
struct ScriptedSource {
    config: Mutex<Caption>,
    script: Mutex<VecDeque<Step>>,
    fail_init: bool,
    fetches: AtomicUsize,
}

impl ScriptedSource {
    fn with_script(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: Mutex::new(steps.into_iter().collect()),
            ..Self::default()
        }
    }

    fn caption(&self) -> String { self.config.lock().caption.clone() }
}

#[async_trait]
impl ImageSource for ScriptedSource {
    fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor::new("scripted", "Scripted", "Images handed in by the test")
    }

    async fn initialize(&self) -> Result<(), SourceError> {
        if self.fail_init {
            return Err(SourceError::initialization("scripted", "no images today"));
        }
        Ok(())
    }

    fn configuration(&self) -> Option<Box<dyn SourceConfiguration>> {
        Some(self.config.lock().clone_box())
    }

    fn configure(&self, config: Box<dyn SourceConfiguration>) -> Result<(), SourceError> {
        if let Some(ConfigValue::Text(caption)) = config.get("caption") {
            self.config.lock().caption = caption;
        }
        Ok(())
    }

    async fn fetch_next(&self, _cancel: CancellationToken) -> Result<FetchedImage, FetchError> {
        let count = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        let step = self.script.lock().pop_front();

        match step {
            Some(Step::Gate(rx)) => rx.await.map_err(|_| FetchError::new("Gate", "dropped")),
            Some(Step::FailGate(rx)) => {
                Err(rx.await.unwrap_or_else(|_| FetchError::new("Gate", "dropped")))
            }
            Some(Step::Image(image)) => Ok(image),
            Some(Step::Hang) => futures::future::pending().await,
            Some(Step::Panic) => panic!("scripted source exploded"),
            None => Ok(fetched(&format!("image {count}"), [0, 128, 0])),
        }
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Settings store whose writes can be switched off.
#[derive(Default)]
struct FlakyStore {
    inner: MemorySettingsStore,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    fn snapshot(&self) -> BTreeMap<String, String> { self.inner.snapshot() }

    fn fail_writes(&self) { self.fail_writes.store(true, Ordering::SeqCst); }
}

impl SettingsStore for FlakyStore {
    fn get(&self, key: &str) -> Option<String> { self.inner.get(key) }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io {
                path: PathBuf::from("settings.json"),
                source: std::io::Error::other("disk full"),
            });
        }
        self.inner.set(key, value)
    }
}

/// Pipeline whose first run blocks until the test releases it.
struct HeldPipeline {
    entered: Mutex<Option<oneshot::Sender<()>>>,
    release: Mutex<Option<mpsc::Receiver<()>>>,
}

impl HeldPipeline {
    fn new() -> (Arc<Self>, oneshot::Receiver<()>, mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let pipeline = Arc::new(Self {
            entered: Mutex::new(Some(entered_tx)),
            release: Mutex::new(Some(release_rx)),
        });
        (pipeline, entered_rx, release_tx)
    }
}

impl PostProcessor for HeldPipeline {
    fn process(&self, bytes: &[u8], params: &PostProcessParams) -> Result<ProcessedArtifact, ProcessingError> {
        let release = self.release.lock().take();
        if let Some(release) = release {
            if let Some(entered) = self.entered.lock().take() {
                let _ = entered.send(());
            }
            let _ = release.recv();
        }
        ImagePipeline.process(bytes, params)
    }
}

struct Harness {
    handle: OrchestratorHandle,
    source: Arc<ScriptedSource>,
    desktop: Arc<NoopDesktop>,
    store: Arc<FlakyStore>,
    cache: ImageCache,
    _cache_dir: TempDir,
}

fn png(color: [u8; 3]) -> Vec<u8> {
    let image = RgbImage::from_pixel(32, 16, Rgb(color));
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png).unwrap();
    bytes.into_inner()
}

fn fetched(title: &str, color: [u8; 3]) -> FetchedImage {
    let image = FetchImage::new(title).with_image_url(format!("https://example.com/{title}.png"));
    FetchedImage::new(image, png(color))
}

fn quiet_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        interval: Duration::ZERO,
        fetch_timeout: Duration::ZERO,
        params: PostProcessParams {
            screen: ScreenSize { width: 64, height: 36 },
            preview: None,
            ..PostProcessParams::default()
        },
        eviction: EvictionPolicy::default(),
    }
}

fn harness(source: ScriptedSource, settings: OrchestratorSettings) -> Harness {
    harness_with_pipeline(source, settings, Arc::new(ImagePipeline))
}

fn harness_with_pipeline(
    source: ScriptedSource,
    settings: OrchestratorSettings,
    pipeline: Arc<dyn PostProcessor>,
) -> Harness {
    let source = Arc::new(source);
    let factory_source = Arc::clone(&source);

    let mut registry = SourceRegistry::new();
    registry
        .register(
            "scripted",
            Arc::new(move || -> Arc<dyn ImageSource> { factory_source.clone() }),
        )
        .unwrap();

    let cache_dir = tempfile::tempdir().unwrap();
    let cache = ImageCache::new(cache_dir.path());
    let desktop = Arc::new(NoopDesktop::new());
    let store = Arc::new(FlakyStore::default());

    let ctx = OrchestratorContext {
        registry: Arc::new(registry),
        cache: cache.clone(),
        desktop: desktop.clone(),
        store: store.clone(),
        pipeline,
    };

    Harness {
        handle: Orchestrator::spawn(ctx, settings),
        source,
        desktop,
        store,
        cache,
        _cache_dir: cache_dir,
    }
}

async fn next_event(events: &mut broadcast::Receiver<WallpaperEvent>) -> WallpaperEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("no event within 5s")
        .expect("event channel closed")
}

async fn assert_quiet(events: &mut broadcast::Receiver<WallpaperEvent>) {
    let waited = tokio::time::timeout(Duration::from_millis(300), events.recv()).await;
    assert!(waited.is_err(), "unexpected event: {waited:?}");
}

/// Polls the cache until it holds exactly `keys` (or gives up), returning
/// the sorted keys found last.
async fn wait_for_cache_keys(cache: &ImageCache, keys: &[String]) -> Vec<String> {
    let mut found = Vec::new();
    for _ in 0..50 {
        found = cache.entries().unwrap().into_iter().map(|entry| entry.key).collect::<Vec<_>>();
        found.sort();
        if keys.is_empty() || found.len() == keys.len() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    found
}

fn changed_title(event: &WallpaperEvent) -> &str {
    match event {
        WallpaperEvent::Changed(wallpaper) => &wallpaper.image.title,
        other => panic!("expected Changed, got {other:?}"),
    }
}

// ============================================================================
// Supersession
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_superseded_fetch_never_publishes() {
    let (first_tx, first_rx) = oneshot::channel();
    let (second_tx, second_rx) = oneshot::channel();
    let h = harness(
        ScriptedSource::with_script([Step::Gate(first_rx), Step::Gate(second_rx)]),
        quiet_settings(),
    );
    let mut events = h.handle.subscribe();
    h.handle.activate_source("scripted").await.unwrap();

    h.handle.fetch_now(FetchTrigger::Manual).await.unwrap();
    assert_eq!(next_event(&mut events).await, WallpaperEvent::Changing);

    // Editing the active source's settings starts the second fetch.
    let mut items = h.handle.settings().await.unwrap().unwrap();
    items[0] = items[0].with_value(ConfigValue::Text("second".into()));
    h.handle.update_source_settings("scripted", items).await.unwrap();
    assert_eq!(next_event(&mut events).await, WallpaperEvent::Changing);

    first_tx.send(fetched("first", [255, 0, 0])).unwrap();
    assert_quiet(&mut events).await;

    second_tx.send(fetched("second", [0, 0, 255])).unwrap();
    assert_eq!(changed_title(&next_event(&mut events).await), "second");
    assert_quiet(&mut events).await;

    assert_eq!(h.desktop.applied().len(), 1);
    assert_eq!(h.source.caption(), "second");
    h.handle.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_manual_fetch_supersedes_manual_fetch() {
    let (first_tx, first_rx) = oneshot::channel();
    let h = harness(
        ScriptedSource::with_script([
            Step::Gate(first_rx),
            Step::Image(fetched("replacement", [9, 9, 9])),
        ]),
        quiet_settings(),
    );
    let mut events = h.handle.subscribe();
    h.handle.activate_source("scripted").await.unwrap();

    h.handle.fetch_now(FetchTrigger::Manual).await.unwrap();
    h.handle.fetch_now(FetchTrigger::Manual).await.unwrap();

    assert_eq!(next_event(&mut events).await, WallpaperEvent::Changing);
    assert_eq!(next_event(&mut events).await, WallpaperEvent::Changing);
    assert_eq!(changed_title(&next_event(&mut events).await), "replacement");

    let _ = first_tx.send(fetched("late", [1, 1, 1]));
    assert_quiet(&mut events).await;

    let status = h.handle.status().await.unwrap();
    assert_eq!(status.current.unwrap().image.title, "replacement");
    assert!(status.in_flight.is_none());
    h.handle.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_superseded_fetch_failure_is_silent() {
    let (first_tx, first_rx) = oneshot::channel();
    let (second_tx, second_rx) = oneshot::channel();
    let h = harness(
        ScriptedSource::with_script([Step::FailGate(first_rx), Step::Gate(second_rx)]),
        quiet_settings(),
    );
    let mut events = h.handle.subscribe();
    h.handle.activate_source("scripted").await.unwrap();

    h.handle.fetch_now(FetchTrigger::Manual).await.unwrap();
    assert_eq!(next_event(&mut events).await, WallpaperEvent::Changing);
    h.handle.fetch_now(FetchTrigger::Manual).await.unwrap();
    assert_eq!(next_event(&mut events).await, WallpaperEvent::Changing);

    first_tx.send(FetchError::new("Offline", "network unreachable")).unwrap();
    assert_quiet(&mut events).await;
    assert!(h.handle.status().await.unwrap().in_flight.is_some());

    second_tx.send(fetched("second", [0, 0, 255])).unwrap();
    assert_eq!(changed_title(&next_event(&mut events).await), "second");
    assert_quiet(&mut events).await;
    assert_eq!(h.desktop.applied().len(), 1);
    h.handle.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fetch_superseded_while_processing_never_publishes() {
    let (pipeline, entered, release) = HeldPipeline::new();
    let h = harness_with_pipeline(
        ScriptedSource::with_script([
            Step::Image(fetched("first", [255, 0, 0])),
            Step::Image(fetched("second", [0, 0, 255])),
        ]),
        quiet_settings(),
        pipeline,
    );
    let mut events = h.handle.subscribe();
    h.handle.activate_source("scripted").await.unwrap();

    h.handle.fetch_now(FetchTrigger::Manual).await.unwrap();
    assert_eq!(next_event(&mut events).await, WallpaperEvent::Changing);
    tokio::time::timeout(Duration::from_secs(5), entered)
        .await
        .expect("pipeline never started")
        .unwrap();

    h.handle.fetch_now(FetchTrigger::Manual).await.unwrap();
    assert_eq!(next_event(&mut events).await, WallpaperEvent::Changing);
    assert_eq!(changed_title(&next_event(&mut events).await), "second");

    release.send(()).unwrap();
    assert_quiet(&mut events).await;

    let applied = h.desktop.applied();
    assert_eq!(applied.len(), 1);
    let current = h.handle.status().await.unwrap().current.unwrap();
    assert_eq!(current.image.title, "second");
    assert_eq!(applied[0], current.path);
    h.handle.shutdown().await;
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fetch_timeout_reports_error() {
    let settings = OrchestratorSettings {
        fetch_timeout: Duration::from_millis(100),
        ..quiet_settings()
    };
    let h = harness(ScriptedSource::with_script([Step::Hang]), settings);
    let mut events = h.handle.subscribe();
    h.handle.activate_source("scripted").await.unwrap();

    h.handle.fetch_now(FetchTrigger::Manual).await.unwrap();
    assert_eq!(next_event(&mut events).await, WallpaperEvent::Changing);
    match next_event(&mut events).await {
        WallpaperEvent::Error { subject, .. } => assert_eq!(subject, "Timed out"),
        other => panic!("expected timeout error, got {other:?}"),
    }
    assert!(h.desktop.applied().is_empty());
    h.handle.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_panicking_source_is_contained() {
    let h = harness(ScriptedSource::with_script([Step::Panic]), quiet_settings());
    let mut events = h.handle.subscribe();
    h.handle.activate_source("scripted").await.unwrap();

    h.handle.fetch_now(FetchTrigger::Manual).await.unwrap();
    assert_eq!(next_event(&mut events).await, WallpaperEvent::Changing);
    match next_event(&mut events).await {
        WallpaperEvent::Error { message, .. } => assert!(message.contains("exploded")),
        other => panic!("expected error, got {other:?}"),
    }

    // The next fetch works normally.
    h.handle.fetch_now(FetchTrigger::Manual).await.unwrap();
    assert_eq!(next_event(&mut events).await, WallpaperEvent::Changing);
    assert_eq!(changed_title(&next_event(&mut events).await), "image 2");
    h.handle.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_undecodable_image_keeps_current_wallpaper() {
    let broken = FetchedImage::new(FetchImage::new("broken"), b"not an image".to_vec());
    let h = harness(ScriptedSource::with_script([Step::Image(broken)]), quiet_settings());
    let mut events = h.handle.subscribe();
    h.handle.activate_source("scripted").await.unwrap();

    h.handle.fetch_now(FetchTrigger::Manual).await.unwrap();
    assert_eq!(next_event(&mut events).await, WallpaperEvent::Changing);
    match next_event(&mut events).await {
        WallpaperEvent::Error { subject, .. } => assert_eq!(subject, "Processing failed"),
        other => panic!("expected processing error, got {other:?}"),
    }
    assert!(h.handle.status().await.unwrap().current.is_none());
    h.handle.shutdown().await;
}

#[tokio::test]
async fn test_unknown_source_is_reported() {
    let h = harness(ScriptedSource::default(), quiet_settings());
    let mut events = h.handle.subscribe();

    let err = h.handle.activate_source("flickr").await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Registry(_)));
    match next_event(&mut events).await {
        WallpaperEvent::Error { subject, .. } => assert_eq!(subject, "Unknown source"),
        other => panic!("expected error, got {other:?}"),
    }

    h.handle.fetch_now(FetchTrigger::Manual).await.unwrap();
    match next_event(&mut events).await {
        WallpaperEvent::Error { subject, .. } => assert_eq!(subject, "No source"),
        other => panic!("expected error, got {other:?}"),
    }
    h.handle.shutdown().await;
}

#[tokio::test]
async fn test_failed_initialization_leaves_no_active_source() {
    let source = ScriptedSource {
        fail_init: true,
        ..ScriptedSource::default()
    };
    let h = harness(source, quiet_settings());
    let mut events = h.handle.subscribe();

    let err = h.handle.activate_source("scripted").await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Source(SourceError::Initialization { .. })));
    match next_event(&mut events).await {
        WallpaperEvent::Error { subject, .. } => assert_eq!(subject, "Scripted unavailable"),
        other => panic!("expected error, got {other:?}"),
    }
    assert!(h.handle.status().await.unwrap().source.is_none());
    h.handle.shutdown().await;
}

// ============================================================================
// Settings
// ============================================================================

#[tokio::test]
async fn test_settings_for_inactive_source_apply_on_activation() {
    let h = harness(ScriptedSource::default(), quiet_settings());

    let config = Caption::default();
    let meta = discover(&config).unwrap();
    let mut items = to_editable_items(&meta, &config);
    items[0] = items[0].with_value(ConfigValue::Text("later".into()));

    h.handle.update_source_settings("scripted", items).await.unwrap();
    assert_eq!(h.store.get("scripted.caption").as_deref(), Some("later"));
    assert_eq!(h.source.caption(), "first");

    h.handle.activate_source("scripted").await.unwrap();
    assert_eq!(h.source.caption(), "later");

    let items = h.handle.settings().await.unwrap().unwrap();
    assert_eq!(items[0].value, ConfigValue::Text("later".into()));
    h.handle.shutdown().await;
}

#[tokio::test]
async fn test_invalid_settings_are_rejected_without_writes() {
    let h = harness(ScriptedSource::default(), quiet_settings());
    h.handle.activate_source("scripted").await.unwrap();

    let mut items = h.handle.settings().await.unwrap().unwrap();
    items[0] = items[0].with_value(ConfigValue::Text("this is too long for sure".into()));

    let err = h.handle.update_source_settings("scripted", items).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::MetaModel(MetaModelError::Validation(_))));
    assert!(h.store.snapshot().is_empty());
    assert_eq!(h.source.caption(), "first");
    h.handle.shutdown().await;
}

#[tokio::test]
async fn test_loosened_constraints_are_ignored() {
    let h = harness(ScriptedSource::default(), quiet_settings());
    h.handle.activate_source("scripted").await.unwrap();

    let mut items = h.handle.settings().await.unwrap().unwrap();
    items[0].descriptor = ConfigurationItemDescriptor::string("Caption", 0, 1000, false, "first");
    items[0].value = ConfigValue::Text("this is too long for sure".into());

    let err = h.handle.update_source_settings("scripted", items).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::MetaModel(MetaModelError::Validation(_))));
    assert!(h.store.snapshot().is_empty());
    assert_eq!(h.source.caption(), "first");
    h.handle.shutdown().await;
}

#[tokio::test]
async fn test_loosened_constraints_are_ignored_for_inactive_source() {
    let h = harness(ScriptedSource::default(), quiet_settings());

    let config = Caption::default();
    let mut items = to_editable_items(&discover(&config).unwrap(), &config);
    items[0].descriptor = ConfigurationItemDescriptor::string("Caption", 0, 1000, false, "first");
    items[0].value = ConfigValue::Text("   ".into());

    let err = h.handle.update_source_settings("scripted", items).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::MetaModel(MetaModelError::Validation(_))));
    assert!(h.store.snapshot().is_empty());
    h.handle.shutdown().await;
}

#[tokio::test]
async fn test_undeclared_property_is_rejected() {
    let h = harness(ScriptedSource::default(), quiet_settings());
    h.handle.activate_source("scripted").await.unwrap();

    let mut items = h.handle.settings().await.unwrap().unwrap();
    let mut extra = items[0].clone();
    extra.property = "volume".into();
    items.push(extra);

    let err = h.handle.update_source_settings("scripted", items).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::MetaModel(MetaModelError::UnknownProperty(ref property)) if property == "volume"
    ));
    assert!(h.store.snapshot().is_empty());
    h.handle.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_settings_save_leaves_source_untouched() {
    let h = harness(ScriptedSource::default(), quiet_settings());
    let mut events = h.handle.subscribe();
    h.handle.activate_source("scripted").await.unwrap();
    h.store.fail_writes();

    let mut items = h.handle.settings().await.unwrap().unwrap();
    items[0] = items[0].with_value(ConfigValue::Text("second".into()));

    let err = h.handle.update_source_settings("scripted", items).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Store(_)));
    assert_eq!(h.source.caption(), "first");
    assert_quiet(&mut events).await;
    h.handle.shutdown().await;
}

#[tokio::test]
async fn test_stored_settings_restore_on_activation() {
    let h = harness(ScriptedSource::default(), quiet_settings());
    h.store.set("scripted.caption", "restored".into()).unwrap();

    h.handle.activate_source("scripted").await.unwrap();
    assert_eq!(h.source.caption(), "restored");
    assert!(h.handle.status().await.unwrap().settings_editable);
    h.handle.shutdown().await;
}

// ============================================================================
// Timer and cache
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timer_triggers_fetches() {
    let settings = OrchestratorSettings {
        interval: Duration::from_millis(150),
        ..quiet_settings()
    };
    let h = harness(ScriptedSource::default(), settings);
    let mut events = h.handle.subscribe();
    h.handle.activate_source("scripted").await.unwrap();

    assert_eq!(next_event(&mut events).await, WallpaperEvent::Changing);
    assert_eq!(changed_title(&next_event(&mut events).await), "image 1");
    h.handle.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_eviction_spares_current_wallpaper() {
    let settings = OrchestratorSettings {
        eviction: EvictionPolicy {
            max_bytes: Some(1),
            max_age: None,
        },
        ..quiet_settings()
    };
    let h = harness(ScriptedSource::default(), settings);
    let mut events = h.handle.subscribe();
    h.handle.activate_source("scripted").await.unwrap();

    let mut first_keys = Vec::new();
    for round in 0..2 {
        h.handle.fetch_now(FetchTrigger::Manual).await.unwrap();
        assert_eq!(next_event(&mut events).await, WallpaperEvent::Changing);
        changed_title(&next_event(&mut events).await);

        let current = h.handle.status().await.unwrap().current.unwrap();
        let keys = wait_for_cache_keys(&h.cache, &current.cache_keys).await;
        let mut expected = current.cache_keys.clone();
        expected.sort();
        assert_eq!(keys, expected);

        if round == 0 {
            first_keys = expected;
        }
    }

    let remaining = wait_for_cache_keys(&h.cache, &[]).await;
    assert!(first_keys.iter().all(|key| !remaining.contains(key)));
    h.handle.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_processing_change_applies_to_next_fetch_only() {
    let h = harness(ScriptedSource::default(), quiet_settings());
    let mut events = h.handle.subscribe();
    h.handle.activate_source("scripted").await.unwrap();

    h.handle.fetch_now(FetchTrigger::Manual).await.unwrap();
    assert_eq!(next_event(&mut events).await, WallpaperEvent::Changing);
    let WallpaperEvent::Changed(first) = next_event(&mut events).await else {
        panic!("expected a published wallpaper");
    };

    let darker = PostProcessParams {
        darken: 40,
        ..quiet_settings().params
    };
    h.handle.set_processing(darker).await.unwrap();
    assert_quiet(&mut events).await;
    assert_eq!(h.handle.status().await.unwrap().params, darker);

    h.handle.fetch_now(FetchTrigger::Manual).await.unwrap();
    assert_eq!(next_event(&mut events).await, WallpaperEvent::Changing);
    let WallpaperEvent::Changed(second) = next_event(&mut events).await else {
        panic!("expected a published wallpaper");
    };
    assert_ne!(first.variant_key, second.variant_key);
    assert_eq!(second.variant_key, darker.variant_key());
    h.handle.shutdown().await;
}
