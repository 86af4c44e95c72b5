//! Config hot-reload watcher.
//!
//! Watches the engine's TOML config file for modifications and invokes a
//! callback with the freshly parsed and validated [`StrataConfig`] after
//! a debounce window. Documents that fail schema validation are logged
//! and dropped — the callback is never invoked for them, so the
//! previously active configuration stays in force.

use crate::config::StrataConfig;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;
use strata_core::{StrataError, StrataResult};

/// Watches a config file on disk and calls back on every (debounced)
/// valid change.
///
/// The watcher is kept alive as long as this struct is alive; dropping
/// it stops the background thread and releases the file-system watch.
pub struct ConfigWatcher {
    /// Stored to prevent the watcher from being dropped (which would
    /// stop watching the file).
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    /// Start watching `config_path` for modifications.
    ///
    /// * `debounce_ms` — minimum milliseconds between two successive
    ///   reload callbacks. Use `500` as a sensible default.
    /// * `on_reload` — called on a background thread each time the
    ///   config file is modified and passes validation. Parse and
    ///   validation errors are logged via `tracing::warn` and do **not**
    ///   invoke the callback.
    pub fn start<F>(config_path: PathBuf, debounce_ms: u64, on_reload: F) -> StrataResult<Self>
    where
        F: Fn(StrataConfig) + Send + Sync + 'static,
    {
        let (tx, rx) = std_mpsc::channel();

        let mut watcher =
            notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        let _ = tx.send(());
                    }
                }
            })
            .map_err(|e| StrataError::Config(format!("Failed to create file watcher: {e}")))?;

        watcher
            .watch(config_path.as_ref(), RecursiveMode::NonRecursive)
            .map_err(|e| StrataError::Config(format!("Failed to watch config file: {e}")))?;

        let path = config_path.clone();
        std::thread::spawn(move || {
            let mut last_reload = std::time::Instant::now();
            let debounce = std::time::Duration::from_millis(debounce_ms);

            while rx.recv().is_ok() {
                // Drain additional events that arrived during the
                // debounce window so a burst of writes reloads once.
                while rx.try_recv().is_ok() {}

                let now = std::time::Instant::now();
                if now.duration_since(last_reload) < debounce {
                    std::thread::sleep(debounce - now.duration_since(last_reload));
                }

                last_reload = std::time::Instant::now();

                match StrataConfig::load(&path) {
                    Ok(config) => {
                        tracing::info!(path = %path.display(), "Config reloaded");
                        on_reload(config);
                    }
                    Err(e) => tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Rejected invalid config, previous config remains active"
                    ),
                }
            }
        });

        Ok(Self { _watcher: watcher })
    }
}
