//! Integration tests for agent shutdown
//!
//! The queue client points at a closed local port; the reader runs on the
//! mock keyboard.

use cardlink_agent::{
    AgentObserver, BackendStatus, ConfigWatcher, Orchestrator, OrchestratorConfig,
    ReachabilityProbe, Services,
};
use cardlink_core::{AgentConfig, ConfigStore, Credentials, DeviceIdentity, ResultMessage};
use cardlink_hardware::mock::MockKeyboard;
use cardlink_hardware::mock::keyboard::{MOCK_PRODUCT_ID, MOCK_VENDOR_ID};
use cardlink_hardware::{CardReader, InputBackend, ReaderConfig};
use cardlink_queue::{BrokerSettings, BrokerStatus, QueueClient, QueueClientConfig, ResultPublisher};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::timeout;

struct NullPublisher;

impl ResultPublisher for NullPublisher {
    async fn publish(&self, _message: &ResultMessage) -> cardlink_queue::Result<()> {
        Ok(())
    }
}

struct StaticProbe;

impl ReachabilityProbe for StaticProbe {
    async fn probe(&self) -> BackendStatus {
        BackendStatus::reachable("Backend reachable")
    }
}

#[derive(Default)]
struct BrokerLog {
    messages: Mutex<Vec<String>>,
}

impl BrokerLog {
    fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl AgentObserver for BrokerLog {
    fn on_broker_status(&self, status: &BrokerStatus) {
        self.messages.lock().unwrap().push(status.message.clone());
    }
}

/// The orchestrator is still listening when the consumer winds down, so
/// the consumer's final state reaches the observer.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_stops_consumer_before_orchestrator() {
    let dir = TempDir::new().unwrap();
    let identity = DeviceIdentity::new()
        .with_vendor_id(MOCK_VENDOR_ID)
        .with_product_id(MOCK_PRODUCT_ID);
    let config = AgentConfig {
        rfid_device: Some(identity),
        rabbitmq_host: "127.0.0.1".to_string(),
        rabbitmq_port: 1,
        ..AgentConfig::default()
    };
    let store = ConfigStore::new(dir.path());
    store.save_config(&config).unwrap();

    let mut watcher = ConfigWatcher::new(store, &config);
    watcher.start();

    let (keyboard, _keys) = MockKeyboard::new();
    let mut reader = CardReader::new(
        InputBackend::Mock(keyboard),
        watcher.subscribe(),
        ReaderConfig::default(),
    );
    reader.start();

    let settings = BrokerSettings::from_config(&config, &Credentials::new(7, "token"));
    let (commands_tx, commands_rx) = mpsc::channel(8);
    let mut queue = QueueClient::new(
        settings,
        commands_tx,
        QueueClientConfig {
            retry_delay: Duration::from_millis(50),
            ..QueueClientConfig::default()
        },
    );

    let log = Arc::new(BrokerLog::default());
    let mut orchestrator = Orchestrator::new(
        reader.handle(),
        NullPublisher,
        StaticProbe,
        log.clone(),
        OrchestratorConfig::new("token"),
    );
    orchestrator.start(commands_rx, queue.subscribe_status());
    queue.start();

    let mut status = queue.subscribe_status();
    timeout(
        Duration::from_secs(10),
        status.wait_for(|s| s.message.starts_with("Broker unavailable")),
    )
    .await
    .expect("broker never reported unavailable")
    .expect("status channel closed");

    let services = Services {
        watcher,
        reader,
        queue,
        orchestrator,
    };
    timeout(Duration::from_secs(20), services.shutdown(Duration::from_secs(3)))
        .await
        .expect("shutdown did not finish");

    assert_eq!(
        log.messages().last().map(String::as_str),
        Some("Queue client stopped")
    );
}
