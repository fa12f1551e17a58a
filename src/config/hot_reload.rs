//! Config Hot-Reload — Swap Payout Tables and Search Settings Live
//!
//! Periodically re-reads config.toml and, when its contents change
//! and still validate, publishes the new config on a
//! `tokio::sync::watch` channel. The refresh loop reads the latest
//! value at the start of every cycle, so a new board takes effect on
//! the next cycle without a restart.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, instrument, warn};

use super::AppConfig;

/// Polls config.toml and broadcasts validated updates.
pub struct ConfigWatcher {
    /// Path to config.toml.
    config_path: String,
    /// How often the file is checked.
    interval: Duration,
    /// Watch channel sender for config updates.
    config_tx: watch::Sender<AppConfig>,
    /// Hash of the last file contents that were applied.
    last_hash: Option<u64>,
}

impl ConfigWatcher {
    /// Create a watcher seeded with the config loaded at startup.
    pub fn new(
        config_path: &str,
        initial_config: AppConfig,
        interval: Duration,
    ) -> (Self, watch::Receiver<AppConfig>) {
        let (config_tx, config_rx) = watch::channel(initial_config);

        let watcher = Self {
            config_path: config_path.to_string(),
            interval,
            config_tx,
            last_hash: None,
        };

        (watcher, config_rx)
    }

    /// Run until shutdown, checking the file every `interval`.
    #[instrument(skip(self, shutdown_rx), fields(path = %self.config_path))]
    pub async fn run(&mut self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!(interval_s = self.interval.as_secs(), "Config watcher started");

        self.last_hash = self.compute_hash().await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Config watcher shutting down");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.interval) => {
                    self.reload_if_changed().await;
                }
            }
        }
    }

    /// Reload and publish if the file changed. Returns whether a new
    /// config was published.
    pub async fn reload_if_changed(&mut self) -> bool {
        let new_hash = self.compute_hash().await;

        if new_hash == self.last_hash {
            debug!("Config unchanged");
            return false;
        }

        match super::loader::load_config(&self.config_path) {
            Ok(new_config) => {
                self.last_hash = new_hash;
                self.config_tx.send_replace(new_config);
                info!("Config reloaded, applies from next cycle");
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to reload config — keeping current");
                false
            }
        }
    }

    async fn compute_hash(&self) -> Option<u64> {
        let content = tokio::fs::read_to_string(&self.config_path).await.ok()?;

        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        Some(hasher.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "[app]\nname = \"board\"\n\n[feed]\nkind = \"file\"\npath = \"props.json\"\n";

    fn temp_path(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "prop-ev-{}-{}.toml",
            tag,
            uuid::Uuid::new_v4()
        ))
    }

    #[tokio::test]
    async fn test_publishes_changed_config() {
        let path = temp_path("reload");
        std::fs::write(&path, BASE).unwrap();
        let path_str = path.to_str().unwrap();

        let initial = super::super::loader::load_config(path_str).unwrap();
        let (mut watcher, rx) = ConfigWatcher::new(path_str, initial, Duration::from_secs(60));
        watcher.last_hash = watcher.compute_hash().await;
        assert!(!watcher.reload_if_changed().await);

        std::fs::write(&path, format!("{BASE}\n[search]\npool_size = 12\n")).unwrap();
        assert!(watcher.reload_if_changed().await);
        assert_eq!(rx.borrow().search.pool_size, 12);

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_invalid_update_keeps_current() {
        let path = temp_path("invalid");
        std::fs::write(&path, BASE).unwrap();
        let path_str = path.to_str().unwrap();

        let initial = super::super::loader::load_config(path_str).unwrap();
        let (mut watcher, rx) = ConfigWatcher::new(path_str, initial, Duration::from_secs(60));
        watcher.last_hash = watcher.compute_hash().await;

        std::fs::write(&path, format!("{BASE}\n[search]\npool_size = 0\n")).unwrap();
        assert!(!watcher.reload_if_changed().await);
        assert_eq!(rx.borrow().search.pool_size, 32);

        std::fs::remove_file(&path).ok();
    }
}
