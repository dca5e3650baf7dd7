//! Local agent configuration.
//!
//! The agent keeps two JSON documents in its configuration directory:
//!
//! - `config.json`: broker location, backend URL and the identity of the
//!   card reader assigned to this terminal ([`AgentConfig`]).
//! - `credentials.json`: the terminal registration issued by the backend
//!   ([`Credentials`]).
//!
//! Both files are written by the registration flow, which lives outside
//! this crate. The agent only reads them, and re-reads `config.json`
//! periodically so a reader assigned after startup is picked up.

use crate::constants::{
    CONFIG_DIR_NAME, CONFIG_FILE_NAME, CREDENTIALS_FILE_NAME, DEFAULT_BACKEND_URL,
    DEFAULT_BAUD_RATE, DEFAULT_BROKER_HOST, DEFAULT_BROKER_PORT, DEFAULT_BROKER_VHOST,
    TERMINAL_QUEUE_PREFIX,
};
use crate::error::{Error, Result};
use crate::types::DeviceIdentity;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Agent configuration as stored in `config.json`.
///
/// Every field has a default, so a partial or missing file still yields a
/// usable configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Backend base URL, probed for reachability.
    pub backend_url: String,

    /// AMQP broker host.
    pub rabbitmq_host: String,

    /// AMQP broker port.
    pub rabbitmq_port: u16,

    /// AMQP user name.
    pub rabbitmq_user: String,

    /// AMQP password.
    pub rabbitmq_pass: String,

    /// AMQP virtual host.
    pub rabbitmq_vhost: String,

    /// Card reader assigned to this terminal, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rfid_device: Option<DeviceIdentity>,

    /// Rate hint used when the assigned device does not carry one.
    pub rfid_baudrate: u32,

    /// Give up on an unanswered scan request after this many seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_timeout_secs: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            rabbitmq_host: DEFAULT_BROKER_HOST.to_string(),
            rabbitmq_port: DEFAULT_BROKER_PORT,
            rabbitmq_user: "guest".to_string(),
            rabbitmq_pass: "guest".to_string(),
            rabbitmq_vhost: DEFAULT_BROKER_VHOST.to_string(),
            rfid_device: None,
            rfid_baudrate: DEFAULT_BAUD_RATE,
            scan_timeout_secs: None,
        }
    }
}

impl AgentConfig {
    /// The assigned device identity, if one with usable hints is present.
    ///
    /// An empty `rfid_device` object counts as "no device configured".
    #[must_use]
    pub fn device_identity(&self) -> Option<DeviceIdentity> {
        self.rfid_device
            .as_ref()
            .filter(|identity| identity.is_specified())
            .map(|identity| {
                let mut identity = identity.clone();
                identity.baud_rate.get_or_insert(self.rfid_baudrate);
                identity
            })
    }

    /// Optional scan timeout as a duration.
    #[must_use]
    pub fn scan_timeout(&self) -> Option<Duration> {
        self.scan_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Terminal registration as stored in `credentials.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Backend-assigned terminal id.
    pub terminal_id: u64,

    /// Token attached to every published result.
    pub auth_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shop_id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shop_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_name: Option<String>,

    /// Queue carrying commands for this terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rabbitmq_queue: Option<String>,
}

impl Credentials {
    /// Create credentials with the required fields.
    pub fn new(terminal_id: u64, auth_token: impl Into<String>) -> Self {
        Self {
            terminal_id,
            auth_token: auth_token.into(),
            shop_id: None,
            shop_name: None,
            terminal_name: None,
            rabbitmq_queue: None,
        }
    }

    /// Set the terminal queue name.
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.rabbitmq_queue = Some(queue.into());
        self
    }

    /// Name of the durable per-terminal command queue.
    ///
    /// # Examples
    ///
    /// ```
    /// use cardlink_core::Credentials;
    ///
    /// assert_eq!(Credentials::new(7, "t").queue_name(), "terminal_7");
    /// assert_eq!(Credentials::new(7, "t").with_queue("kiosk-a").queue_name(), "kiosk-a");
    /// ```
    #[must_use]
    pub fn queue_name(&self) -> String {
        match self.rabbitmq_queue.as_deref().map(str::trim) {
            Some(queue) if !queue.is_empty() => queue.to_string(),
            _ => format!("{TERMINAL_QUEUE_PREFIX}{}", self.terminal_id),
        }
    }
}

/// Directory-backed store for `config.json` and `credentials.json`.
///
/// # Examples
///
/// ```no_run
/// use cardlink_core::ConfigStore;
///
/// # fn example() -> cardlink_core::Result<()> {
/// let store = ConfigStore::default_location()?;
/// let config = store.load_config();
/// println!("broker at {}:{}", config.rabbitmq_host, config.rabbitmq_port);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    /// Store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted at `~/.cardlink`.
    ///
    /// # Errors
    /// Returns `Error::Config` if the home directory cannot be determined.
    pub fn default_location() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Cannot determine home directory".to_string()))?;
        Ok(Self::new(home.join(CONFIG_DIR_NAME)))
    }

    /// Configuration directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of `config.json`.
    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE_NAME)
    }

    /// Path of `credentials.json`.
    pub fn credentials_path(&self) -> PathBuf {
        self.dir.join(CREDENTIALS_FILE_NAME)
    }

    /// Load the agent configuration, falling back to defaults.
    ///
    /// A missing file is normal before the first registration. An
    /// unreadable or malformed file is logged and replaced by defaults so
    /// the agent keeps running.
    pub fn load_config(&self) -> AgentConfig {
        let path = self.config_path();
        match read_json::<AgentConfig>(&path) {
            Ok(Some(config)) => config,
            Ok(None) => {
                debug!("No configuration at {:?}, using defaults", path);
                AgentConfig::default()
            }
            Err(e) => {
                warn!("Ignoring unreadable configuration {:?}: {}", path, e);
                AgentConfig::default()
            }
        }
    }

    /// Write the agent configuration.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub fn save_config(&self, config: &AgentConfig) -> Result<()> {
        write_json(&self.dir, &self.config_path(), config)
    }

    /// Load saved credentials, if any.
    ///
    /// Malformed credentials are logged and treated as absent.
    pub fn load_credentials(&self) -> Option<Credentials> {
        let path = self.credentials_path();
        match read_json::<Credentials>(&path) {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!("Ignoring unreadable credentials {:?}: {}", path, e);
                None
            }
        }
    }

    /// Write credentials.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save_credentials(&self, credentials: &Credentials) -> Result<()> {
        write_json(&self.dir, &self.credentials_path(), credentials)
    }

    /// Remove saved credentials. Succeeds if none were saved.
    ///
    /// # Errors
    /// Returns an error if an existing file cannot be removed.
    pub fn clear_credentials(&self) -> Result<()> {
        match std::fs::remove_file(self.credentials_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_str(&text)?))
}

fn write_json<T: Serialize>(dir: &Path, path: &Path, value: &T) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let text = serde_json::to_string_pretty(value)?;
    std::fs::write(path, text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_files_yield_defaults() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path());

        assert_eq!(store.load_config(), AgentConfig::default());
        assert!(store.load_credentials().is_none());
    }

    #[test]
    fn test_partial_config_is_merged_with_defaults() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path());
        std::fs::write(
            store.config_path(),
            r#"{"rabbitmq_host": "mq.local", "rfid_device": {"vendor_id": "0xFFFF"}}"#,
        )
        .unwrap();

        let config = store.load_config();
        assert_eq!(config.rabbitmq_host, "mq.local");
        assert_eq!(config.rabbitmq_port, DEFAULT_BROKER_PORT);

        let identity = config.device_identity().unwrap();
        assert_eq!(identity.vendor_id, Some(0xFFFF));
        assert_eq!(identity.baud_rate, Some(DEFAULT_BAUD_RATE));
    }

    #[test]
    fn test_malformed_config_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path());
        std::fs::write(store.config_path(), "{ not json").unwrap();

        assert_eq!(store.load_config(), AgentConfig::default());
    }

    #[test]
    fn test_empty_device_object_means_unconfigured() {
        let config: AgentConfig = serde_json::from_str(r#"{"rfid_device": {}}"#).unwrap();
        assert!(config.rfid_device.is_some());
        assert!(config.device_identity().is_none());
    }

    #[test]
    fn test_config_round_trip_through_store() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path().join("nested"));

        let config = AgentConfig {
            rfid_device: Some(DeviceIdentity::new().with_vendor_id(0x1234)),
            scan_timeout_secs: Some(30),
            ..AgentConfig::default()
        };
        store.save_config(&config).unwrap();

        let loaded = store.load_config();
        assert_eq!(loaded, config);
        assert_eq!(loaded.scan_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_zero_scan_timeout_is_disabled() {
        let config = AgentConfig {
            scan_timeout_secs: Some(0),
            ..AgentConfig::default()
        };
        assert_eq!(config.scan_timeout(), None);
    }

    #[test]
    fn test_credentials_lifecycle() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path());

        let credentials = Credentials::new(12, "secret").with_queue("terminal_12");
        store.save_credentials(&credentials).unwrap();
        assert_eq!(store.load_credentials(), Some(credentials));

        store.clear_credentials().unwrap();
        assert!(store.load_credentials().is_none());

        // Clearing twice is fine
        store.clear_credentials().unwrap();
    }

    #[test]
    fn test_queue_name_falls_back_to_terminal_id() {
        let blank = Credentials::new(3, "t").with_queue("  ");
        assert_eq!(blank.queue_name(), "terminal_3");
    }
}
