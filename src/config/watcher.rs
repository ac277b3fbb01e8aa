//! Configuration file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::ProxyConfig;

/// Monitors the configuration file and forwards every valid, changed
/// configuration through a channel.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<ProxyConfig>,
    current: Option<ProxyConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for configuration updates.
    ///
    /// `current` is the configuration already running; reloads equal to it
    /// are not forwarded.
    pub fn new(path: &Path, current: Option<ProxyConfig>) -> (Self, mpsc::UnboundedReceiver<ProxyConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            update_tx,
            current,
        };
        (watcher, update_rx)
    }

    /// Start watching the file in a background thread.
    ///
    /// The returned watcher must be kept alive for events to keep flowing.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self {
            path,
            update_tx,
            current,
        } = self;
        let last_sent = Mutex::new(current);
        let watched = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    let new_config = match load_config(&watched) {
                        Ok(config) => config,
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
                            return;
                        }
                    };

                    let mut last = last_sent.lock().unwrap_or_else(PoisonError::into_inner);
                    if last.as_ref() == Some(&new_config) {
                        tracing::debug!(path = ?watched, "Config file touched without changes");
                        return;
                    }

                    tracing::info!(path = ?watched, backends = new_config.backends.len(), "Config reloaded");
                    if update_tx.send(new_config.clone()).is_ok() {
                        *last = Some(new_config);
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "Config watcher started");
        Ok(watcher)
    }
}
