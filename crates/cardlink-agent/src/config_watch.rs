//! Configuration reload.
//!
//! The reader is assigned from the backend, which rewrites `config.json`
//! while the agent runs. [`ConfigWatcher`] re-reads the file on a fixed
//! interval and publishes the device identity on a `watch` channel only
//! when it actually changed, so the reader reconnects once per change.

use cardlink_core::constants::{CONFIG_POLL_INTERVAL_MS, CONFIG_WATCH_STOP_TIMEOUT_MS};
use cardlink_core::{AgentConfig, ConfigStore, DeviceIdentity};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Periodic `config.json` reloader.
#[derive(Debug)]
pub struct ConfigWatcher {
    store: ConfigStore,
    interval: Duration,
    stop_timeout: Duration,
    identity: Arc<watch::Sender<Option<DeviceIdentity>>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ConfigWatcher {
    /// Watcher seeded with the identity from `initial`.
    pub fn new(store: ConfigStore, initial: &AgentConfig) -> Self {
        let (identity, _) = watch::channel(initial.device_identity());
        Self {
            store,
            interval: Duration::from_millis(CONFIG_POLL_INTERVAL_MS),
            stop_timeout: Duration::from_millis(CONFIG_WATCH_STOP_TIMEOUT_MS),
            identity: Arc::new(identity),
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// Override the reload interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Returns `true` while the polling task is alive.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Device identity updates.
    pub fn subscribe(&self) -> watch::Receiver<Option<DeviceIdentity>> {
        self.identity.subscribe()
    }

    /// Identity currently published.
    pub fn current(&self) -> Option<DeviceIdentity> {
        self.identity.borrow().clone()
    }

    /// Re-read configuration once. Returns `true` if the identity changed.
    pub fn reload(&self) -> bool {
        reload(&self.store, &self.identity)
    }

    /// Start polling. Does nothing if already running.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }

        let store = self.store.clone();
        let identity = Arc::clone(&self.identity);
        let cancel = self.cancel.clone();
        let interval = self.interval;

        self.task = Some(tokio::spawn(async move {
            debug!(path = %store.config_path().display(), "Watching configuration");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        reload(&store, &identity);
                    }
                }
            }
        }));
    }

    /// Stop polling. Waits up to `stop_timeout`, then aborts the task.
    pub async fn stop(&mut self) {
        self.cancel.cancel();

        let Some(mut task) = self.task.take() else {
            return;
        };

        match tokio::time::timeout(self.stop_timeout, &mut task).await {
            Ok(Ok(())) => debug!("Configuration watcher stopped"),
            Ok(Err(e)) => warn!(error = %e, "Configuration watcher task failed"),
            Err(_) => {
                warn!(
                    timeout_ms = self.stop_timeout.as_millis() as u64,
                    "Configuration watcher did not stop in time, aborting"
                );
                task.abort();
            }
        }
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn reload(store: &ConfigStore, identity: &watch::Sender<Option<DeviceIdentity>>) -> bool {
    let latest = store.load_config().device_identity();
    identity.send_if_modified(|current| {
        if *current == latest {
            return false;
        }
        match &latest {
            Some(next) => info!(identity = %next, "Card reader assignment changed"),
            None => info!("Card reader assignment removed"),
        }
        *current = latest.clone();
        true
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn identity(vendor_id: u16) -> DeviceIdentity {
        DeviceIdentity::new()
            .with_vendor_id(vendor_id)
            .with_product_id(0x0035)
    }

    fn store_with(identity: Option<DeviceIdentity>) -> (TempDir, ConfigStore, AgentConfig) {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path());
        let config = AgentConfig {
            rfid_device: identity,
            ..AgentConfig::default()
        };
        store.save_config(&config).unwrap();
        (dir, store, config)
    }

    #[test]
    fn test_reload_detects_change_once() {
        let (_dir, store, config) = store_with(None);
        let watcher = ConfigWatcher::new(store.clone(), &config);
        assert_eq!(watcher.current(), None);
        assert!(!watcher.reload());

        let updated = AgentConfig {
            rfid_device: Some(identity(0xFFFF)),
            ..config
        };
        store.save_config(&updated).unwrap();

        assert!(watcher.reload());
        assert!(!watcher.reload());
        assert_eq!(watcher.current().and_then(|id| id.vendor_id), Some(0xFFFF));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watcher_publishes_changes() {
        let (_dir, store, config) = store_with(Some(identity(0x1111)));
        let mut watcher = ConfigWatcher::new(store.clone(), &config);
        let mut updates = watcher.subscribe();
        watcher.start();

        let updated = AgentConfig {
            rfid_device: Some(identity(0x2222)),
            ..config.clone()
        };
        store.save_config(&updated).unwrap();

        tokio::time::timeout(Duration::from_secs(30), updates.changed())
            .await
            .unwrap()
            .unwrap();
        let current = updates.borrow_and_update().clone();
        assert_eq!(current.and_then(|id| id.vendor_id), Some(0x2222));

        store.save_config(&AgentConfig { rfid_device: None, ..config }).unwrap();
        tokio::time::timeout(Duration::from_secs(30), updates.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*updates.borrow(), None);

        watcher.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_bounded_and_restartable() {
        let (_dir, store, config) = store_with(None);
        let mut watcher = ConfigWatcher::new(store.clone(), &config);

        watcher.stop().await;
        assert!(!watcher.is_running());

        watcher.start();
        assert!(watcher.is_running());
        tokio::time::timeout(Duration::from_secs(2), watcher.stop())
            .await
            .expect("watcher stop was not bounded");
        assert!(!watcher.is_running());

        let mut updates = watcher.subscribe();
        watcher.start();
        store
            .save_config(&AgentConfig {
                rfid_device: Some(identity(0x3333)),
                ..config
            })
            .unwrap();
        tokio::time::timeout(Duration::from_secs(30), updates.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(watcher.current().and_then(|id| id.vendor_id), Some(0x3333));

        watcher.stop().await;
    }
}
