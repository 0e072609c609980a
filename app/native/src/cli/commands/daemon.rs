//! Commands that host an orchestrator: `run` and `fetch`.

use std::sync::Arc;

use colored::Colorize;
use tokio::sync::broadcast::error::RecvError;

use crate::cli::output;
use crate::config::store::JsonSettingsStore;
use crate::config::{self, BackdropConfig};
use crate::desktop::{DesktopPublisher, NoopDesktop, SystemDesktop};
use crate::error::BackdropError;
use crate::events::{ProcessedWallpaper, WallpaperEvent};
use crate::orchestrator::{
    FetchTrigger, Orchestrator, OrchestratorContext, OrchestratorHandle, OrchestratorSettings,
};
use crate::processing::ImagePipeline;
use crate::source::SourceRegistry;

fn build_runtime() -> Result<tokio::runtime::Runtime, BackdropError> {
    Ok(tokio::runtime::Builder::new_multi_thread().enable_all().build()?)
}

fn build_context(
    config: &BackdropConfig,
    desktop: Arc<dyn DesktopPublisher>,
) -> Result<OrchestratorContext, BackdropError> {
    let store = JsonSettingsStore::open(config::settings_path())?;
    Ok(OrchestratorContext {
        registry: Arc::new(SourceRegistry::with_builtin()),
        cache: config.cache.cache(),
        desktop,
        store: Arc::new(store),
        pipeline: Arc::new(ImagePipeline),
    })
}

fn log_event(event: &WallpaperEvent) {
    match event {
        WallpaperEvent::Changing => tracing::debug!(event = event.name(), "fetching wallpaper"),
        WallpaperEvent::Changed(wallpaper) => tracing::info!(
            event = event.name(),
            source = %wallpaper.source,
            title = %wallpaper.image.title,
            path = %wallpaper.path.display(),
            "wallpaper changed"
        ),
        WallpaperEvent::Error { subject, message } => {
            tracing::warn!(event = event.name(), subject = %subject, "{message}");
        }
    }
}

/// Runs the orchestrator until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the runtime, the settings file or the orchestrator
/// cannot be set up. Source failures are logged and do not stop the loop.
pub fn run() -> Result<(), BackdropError> {
    let config = config::get_config().clone();
    let runtime = build_runtime()?;

    runtime.block_on(async move {
        let ctx = build_context(&config, Arc::new(SystemDesktop))?;
        let handle = Orchestrator::spawn(ctx, config.orchestrator_settings());
        let mut events = handle.subscribe();

        if let Err(err) = handle.activate_source(&config.source).await {
            tracing::warn!(source = %config.source, error = %err, "could not activate source");
        }
        handle.fetch_now(FetchTrigger::Startup).await?;

        if let Some(path) = config::get_config_path() {
            config::watch_config_file(path.clone(), config.clone(), handle.clone());
        }

        tracing::info!(source = %config.source, interval = config.interval, "backdrop running");

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutting down");
                    break;
                }
                event = events.recv() => match event {
                    Ok(event) => log_event(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event listener lagged behind");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        handle.shutdown().await;
        Ok(())
    })
}

/// Waits for the outcome of the fetch started after subscribing.
async fn wait_for_wallpaper(
    handle: &OrchestratorHandle,
) -> Result<ProcessedWallpaper, BackdropError> {
    let mut events = handle.subscribe();
    handle.fetch_now(FetchTrigger::Manual).await?;

    loop {
        match events.recv().await {
            Ok(WallpaperEvent::Changing) => tracing::debug!("fetch started"),
            Ok(WallpaperEvent::Changed(wallpaper)) => return Ok(*wallpaper),
            Ok(WallpaperEvent::Error { subject, message }) => {
                return Err(BackdropError::WallpaperError(format!("{subject}: {message}")));
            }
            Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => {
                return Err(BackdropError::OrchestratorError(
                    "orchestrator stopped before the fetch finished".to_string(),
                ));
            }
        }
    }
}

fn print_wallpaper(wallpaper: &ProcessedWallpaper, dry_run: bool) {
    let verb = if dry_run { "Processed" } else { "Applied" };
    println!("{} {}", format!("{verb}:").green().bold(), wallpaper.image.title);
    if let Some(description) = &wallpaper.image.description {
        println!("  {}", output::clip(description, 100).dimmed());
    }
    println!("  {} {}", "Source:".bold(), wallpaper.source);
    println!("  {} {}", "File:".bold(), wallpaper.path.display());
    if let Some(preview) = &wallpaper.preview_path {
        println!("  {} {}", "Preview:".bold(), preview.display());
    }
    if let Some(url) = &wallpaper.image.page_url {
        println!("  {} {}", "Page:".bold(), url);
    }
}

/// Fetches and applies exactly one wallpaper.
///
/// # Errors
///
/// Returns an error if the source cannot be activated or the fetch,
/// processing or publishing fails.
pub fn fetch_once(source: Option<&str>, dry_run: bool, json: bool) -> Result<(), BackdropError> {
    let config = config::get_config().clone();
    let source = source.unwrap_or(&config.source).to_string();
    let runtime = build_runtime()?;

    let wallpaper = runtime.block_on(async {
        let desktop: Arc<dyn DesktopPublisher> =
            if dry_run { Arc::new(NoopDesktop::new()) } else { Arc::new(SystemDesktop) };
        let ctx = build_context(&config, desktop)?;
        let settings = OrchestratorSettings {
            interval: std::time::Duration::ZERO,
            ..config.orchestrator_settings()
        };
        let handle = Orchestrator::spawn(ctx, settings);

        let result = match handle.activate_source(&source).await {
            Ok(()) => wait_for_wallpaper(&handle).await,
            Err(err) => Err(err.into()),
        };
        handle.shutdown().await;
        result
    })?;

    if json {
        output::print_json(&wallpaper)?;
    } else {
        print_wallpaper(&wallpaper, dry_run);
    }
    Ok(())
}
