//! Configuration file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::GatewayConfig;

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<GatewayConfig>,
    last: Arc<Mutex<Option<GatewayConfig>>>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// `current` is the configuration already in effect; identical reloads
    /// are not forwarded. Returns the watcher and a receiver for updates.
    pub fn new(path: &Path, current: GatewayConfig) -> (Self, mpsc::UnboundedReceiver<GatewayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
                last: Arc::new(Mutex::new(Some(current))),
            },
            update_rx,
        )
    }

    /// Re-read the file now and forward it if it changed.
    pub fn reload(&self) {
        reload(&self.path, &self.last, &self.update_tx);
    }

    /// Start watching the file in a background thread.
    ///
    /// The returned watcher must be kept alive for events to flow.
    pub fn run(&self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();
        let last = Arc::clone(&self.last);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!("Config file change detected, reloading...");
                        reload(&path, &last, &tx);
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

fn reload(
    path: &Path,
    last: &Mutex<Option<GatewayConfig>>,
    tx: &mpsc::UnboundedSender<GatewayConfig>,
) {
    match load_config(path) {
        Ok(new_config) => {
            let mut last = last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if last.as_ref() == Some(&new_config) {
                tracing::debug!("Config unchanged, ignoring");
                return;
            }
            *last = Some(new_config.clone());
            let _ = tx.send(new_config);
        }
        Err(e) => {
            tracing::error!("Failed to reload config: {}. Keeping current configuration.", e);
        }
    }
}
