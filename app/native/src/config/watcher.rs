//! Configuration file watcher for hot-reloading.
//!
//! Watches the configuration file and forwards every effective change to the
//! orchestrator as [`ConfigChange`] messages, so edits apply without a
//! restart.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use super::types::{BackdropConfig, load_config_from_path};
use crate::orchestrator::{ConfigChange, FetchTrigger, OrchestratorHandle, OrchestratorMessage};

/// Debounce duration for config file changes.
/// Some editors trigger multiple events per save (write to temp, rename, etc.).
const CONFIG_DEBOUNCE_MS: u64 = 200;

/// Messages that move the orchestrator from `old` to `new`.
#[must_use]
pub fn config_changes(old: &BackdropConfig, new: &BackdropConfig) -> Vec<OrchestratorMessage> {
    let mut messages = Vec::new();
    let (old_settings, new_settings) = (old.orchestrator_settings(), new.orchestrator_settings());

    if old_settings.params != new_settings.params {
        messages.push(OrchestratorMessage::ConfigChanged(ConfigChange::Processing(
            new_settings.params,
        )));
    }

    if old_settings.interval != new_settings.interval
        || old_settings.fetch_timeout != new_settings.fetch_timeout
    {
        messages.push(OrchestratorMessage::ConfigChanged(ConfigChange::Schedule {
            interval: new_settings.interval,
            fetch_timeout: new_settings.fetch_timeout,
        }));
    }

    if old_settings.eviction != new_settings.eviction {
        messages.push(OrchestratorMessage::ConfigChanged(ConfigChange::Eviction(
            new_settings.eviction,
        )));
    }

    if old.source != new.source {
        messages.push(OrchestratorMessage::ActivateSource {
            name: new.source.clone(),
            respond_to: None,
        });
        messages.push(OrchestratorMessage::BeginFetch(FetchTrigger::Settings));
    }

    messages
}

/// Starts watching `config_path` in a background thread.
///
/// `current` is the configuration the orchestrator was started with; each
/// reload is compared against the last applied configuration. A file that
/// fails to parse is reported and ignored.
pub fn watch_config_file(config_path: PathBuf, current: BackdropConfig, handle: OrchestratorHandle) {
    let config_filename =
        config_path.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();

    let spawned = std::thread::Builder::new()
        .name("backdrop-config-watcher".to_string())
        .spawn(move || {
            let (tx, rx) = std::sync::mpsc::channel();

            let mut watcher: RecommendedWatcher = match notify::recommended_watcher(tx) {
                Ok(w) => w,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to create config watcher");
                    return;
                }
            };

            // Watch the parent directory to catch editors that save by renaming.
            let watch_path = config_path.parent().unwrap_or(&config_path);
            if let Err(err) = watcher.watch(watch_path, RecursiveMode::NonRecursive) {
                tracing::warn!(error = %err, path = %watch_path.display(), "failed to watch config file");
                return;
            }

            let mut applied = current;
            let mut last_event_time: Option<Instant> = None;
            let debounce_duration = Duration::from_millis(CONFIG_DEBOUNCE_MS);

            loop {
                match rx.recv() {
                    Ok(Ok(event)) => {
                        let affects_config = event
                            .paths
                            .iter()
                            .any(|p| p.file_name().is_some_and(|name| name == config_filename));
                        if !affects_config {
                            continue;
                        }

                        let now = Instant::now();
                        if last_event_time.is_some_and(|t| now.duration_since(t) < debounce_duration) {
                            continue;
                        }
                        last_event_time = Some(now);

                        let reloaded = match load_config_from_path(&config_path) {
                            Ok((config, _)) => config,
                            Err(err) => {
                                tracing::warn!(error = %err, "ignoring invalid configuration change");
                                continue;
                            }
                        };

                        let messages = config_changes(&applied, &reloaded);
                        if messages.is_empty() {
                            continue;
                        }

                        tracing::info!(changes = messages.len(), "configuration reloaded");
                        for msg in messages {
                            if let Err(err) = handle.send(msg) {
                                tracing::warn!(error = %err, "could not deliver configuration change");
                            }
                        }
                        applied = reloaded;
                    }
                    Ok(Err(err)) => {
                        tracing::warn!(error = %err, "config watch error");
                    }
                    Err(_) => break,
                }
            }
        });

    if let Err(err) = spawned {
        tracing::error!(error = %err, "failed to spawn config watcher thread");
    }
}
