//! Integration tests for the Orchestrator
//!
//! The reader runs against the mock keyboard, the broker side is replaced
//! by a command channel and a recording publisher. Time is paused.

use cardlink_agent::{
    AgentObserver, BackendStatus, Orchestrator, OrchestratorConfig, ReachabilityProbe,
    SCAN_TIMEOUT_ERROR,
};
use cardlink_core::{CardId, DeviceIdentity, ResultMessage, ScanId, ScanStatus};
use cardlink_hardware::mock::keyboard::{MOCK_PRODUCT_ID, MOCK_VENDOR_ID};
use cardlink_hardware::mock::{MockKeyboard, MockKeyboardHandle};
use cardlink_hardware::{CardReader, ConnectionState, InputBackend, ReaderConfig, ReaderHandle, ReaderStatus};
use cardlink_queue::{BrokerStatus, QueueError, ResultPublisher, ScanCommand};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(60);

#[derive(Clone, Default)]
struct RecordingPublisher {
    messages: Arc<Mutex<Vec<ResultMessage>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingPublisher {
    fn messages(&self) -> Vec<ResultMessage> {
        self.messages.lock().unwrap().clone()
    }

    fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl ResultPublisher for RecordingPublisher {
    async fn publish(&self, message: &ResultMessage) -> cardlink_queue::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(QueueError::PublishTimeout(10_000));
        }
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }
}

struct StaticProbe(BackendStatus);

impl ReachabilityProbe for StaticProbe {
    async fn probe(&self) -> BackendStatus {
        self.0.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Reader(ConnectionState),
    Broker(bool),
    Backend(bool),
    Requested(String),
    Completed(String, String),
    Error(String),
}

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<Event>>,
}

impl RecordingObserver {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Error(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl AgentObserver for RecordingObserver {
    fn on_reader_status(&self, status: &ReaderStatus) {
        self.push(Event::Reader(status.state));
    }

    fn on_broker_status(&self, status: &BrokerStatus) {
        self.push(Event::Broker(status.connected));
    }

    fn on_backend_status(&self, status: &BackendStatus) {
        self.push(Event::Backend(status.reachable));
    }

    fn on_scan_requested(&self, scan_id: &ScanId) {
        self.push(Event::Requested(scan_id.to_string()));
    }

    fn on_scan_completed(&self, scan_id: &ScanId, card_id: &CardId) {
        self.push(Event::Completed(scan_id.to_string(), card_id.to_string()));
    }

    fn on_scan_error(&self, message: &str) {
        self.push(Event::Error(message.to_string()));
    }
}

struct Harness {
    orchestrator: Orchestrator<RecordingPublisher, StaticProbe>,
    reader: CardReader,
    handle: ReaderHandle,
    keys: MockKeyboardHandle,
    commands: mpsc::Sender<ScanCommand>,
    broker: watch::Sender<BrokerStatus>,
    publisher: RecordingPublisher,
    observer: Arc<RecordingObserver>,
    _identity: watch::Sender<Option<DeviceIdentity>>,
}

impl Harness {
    async fn start(config: OrchestratorConfig) -> Self {
        let (keyboard, keys) = MockKeyboard::new();
        let identity = DeviceIdentity::new()
            .with_vendor_id(MOCK_VENDOR_ID)
            .with_product_id(MOCK_PRODUCT_ID);
        let (identity_tx, identity_rx) = watch::channel(Some(identity));

        let mut reader = CardReader::new(
            InputBackend::Mock(keyboard),
            identity_rx,
            ReaderConfig::default(),
        );
        let handle = reader.handle();
        reader.start();

        let publisher = RecordingPublisher::default();
        let observer = Arc::new(RecordingObserver::default());
        let (commands, commands_rx) = mpsc::channel(8);
        let (broker, broker_rx) = watch::channel(BrokerStatus::default());

        let mut orchestrator = Orchestrator::new(
            handle.clone(),
            publisher.clone(),
            StaticProbe(BackendStatus::reachable("Backend reachable")),
            observer.clone(),
            config,
        );
        orchestrator.start(commands_rx, broker_rx);

        let mut status = handle.subscribe();
        timeout(WAIT, status.wait_for(|s| s.state == ConnectionState::Connected))
            .await
            .expect("reader never connected")
            .expect("reader status closed");

        Self {
            orchestrator,
            reader,
            handle,
            keys,
            commands,
            broker,
            publisher,
            observer,
            _identity: identity_tx,
        }
    }

    async fn command(&self, id: &str) {
        self.commands
            .send(ScanCommand {
                scan_id: ScanId::new(id).unwrap(),
            })
            .await
            .unwrap();
        let handle = self.handle.clone();
        let id = id.to_string();
        until(move || handle.waiting_scan_id().is_some_and(|s| s.as_str() == id)).await;
    }

    async fn shutdown(mut self) {
        self.orchestrator.stop(Duration::from_secs(3)).await;
        self.reader.stop().await;
    }
}

async fn until(mut condition: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never became true");
}

fn config() -> OrchestratorConfig {
    OrchestratorConfig::new("token-1")
}

/// Command in, card typed, SUCCESS result out
#[tokio::test(start_paused = true)]
async fn test_scan_command_publishes_success() {
    let harness = Harness::start(config()).await;

    harness.command("s1").await;
    harness.keys.scan_card("42x").await.unwrap();

    let publisher = harness.publisher.clone();
    until(move || publisher.messages().len() == 1).await;

    let message = &harness.publisher.messages()[0];
    assert_eq!(message.scan_id.as_str(), "s1");
    assert_eq!(message.status, ScanStatus::Success);
    assert_eq!(message.card_id, "42x");
    assert_eq!(message.error, "");
    assert_eq!(message.auth_token, "token-1");

    let events = harness.observer.events();
    assert!(events.contains(&Event::Requested("s1".to_string())));
    assert!(events.contains(&Event::Completed("s1".to_string(), "42x".to_string())));
    assert!(harness.observer.errors().is_empty());

    harness.shutdown().await;
}

/// A failed publish reports exactly one error and dispatch carries on
#[tokio::test(start_paused = true)]
async fn test_publish_failure_reports_one_error() {
    let harness = Harness::start(config()).await;
    harness.publisher.fail(true);

    harness.command("s1").await;
    harness.keys.scan_card("0001").await.unwrap();

    let observer = Arc::clone(&harness.observer);
    until(move || !observer.errors().is_empty()).await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(harness.observer.errors().len(), 1);
    assert!(harness.observer.errors()[0].contains("s1"));

    harness.publisher.fail(false);
    harness.command("s2").await;
    harness.keys.scan_card("0002").await.unwrap();

    let publisher = harness.publisher.clone();
    until(move || publisher.messages().len() == 1).await;
    assert_eq!(harness.publisher.messages()[0].scan_id.as_str(), "s2");
    assert_eq!(harness.observer.errors().len(), 1);

    harness.shutdown().await;
}

/// Only the latest request produces a result
#[tokio::test(start_paused = true)]
async fn test_superseded_request_never_publishes() {
    let harness = Harness::start(config()).await;

    harness.command("s1").await;
    harness.command("s2").await;
    harness.keys.scan_card("77").await.unwrap();

    let publisher = harness.publisher.clone();
    until(move || publisher.messages().len() == 1).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    let messages = harness.publisher.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].scan_id.as_str(), "s2");

    harness.shutdown().await;
}

/// Without a timeout a request waits forever
#[tokio::test(start_paused = true)]
async fn test_no_timeout_waits_indefinitely() {
    let harness = Harness::start(config()).await;

    harness.command("s1").await;
    tokio::time::sleep(Duration::from_secs(3600)).await;

    assert!(harness.handle.is_waiting());
    assert!(harness.publisher.messages().is_empty());
    assert!(harness.observer.errors().is_empty());

    harness.shutdown().await;
}

/// With a timeout an unanswered request turns into an ERROR result
#[tokio::test(start_paused = true)]
async fn test_scan_timeout_publishes_error() {
    let harness =
        Harness::start(config().with_scan_timeout(Some(Duration::from_secs(30)))).await;

    harness.command("s1").await;

    let publisher = harness.publisher.clone();
    until(move || publisher.messages().len() == 1).await;

    let message = &harness.publisher.messages()[0];
    assert_eq!(message.scan_id.as_str(), "s1");
    assert_eq!(message.status, ScanStatus::Error);
    assert_eq!(message.card_id, "");
    assert_eq!(message.error, SCAN_TIMEOUT_ERROR);
    assert!(!harness.handle.is_waiting());
    assert_eq!(harness.observer.errors(), vec![SCAN_TIMEOUT_ERROR.to_string()]);

    // A card typed after the timeout goes nowhere
    harness.keys.scan_card("99").await.unwrap();
    harness.keys.settle().await;
    assert_eq!(harness.publisher.messages().len(), 1);

    harness.shutdown().await;
}

/// A card read in time cancels the timeout
#[tokio::test(start_paused = true)]
async fn test_card_before_timeout() {
    let harness =
        Harness::start(config().with_scan_timeout(Some(Duration::from_secs(30)))).await;

    harness.command("s1").await;
    harness.keys.scan_card("5").await.unwrap();
    tokio::time::sleep(Duration::from_secs(60)).await;

    let messages = harness.publisher.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].status, ScanStatus::Success);
    assert!(harness.observer.errors().is_empty());

    harness.shutdown().await;
}

/// Broker and backend status reach the observer separately
#[tokio::test(start_paused = true)]
async fn test_status_streams_are_forwarded() {
    let harness = Harness::start(config()).await;

    harness
        .broker
        .send(BrokerStatus::connected("Listening on terminal_7"))
        .unwrap();

    let observer = Arc::clone(&harness.observer);
    until(move || observer.events().contains(&Event::Broker(true))).await;

    // The backend probe runs repeatedly but reports only changes
    tokio::time::sleep(Duration::from_secs(20)).await;
    let events = harness.observer.events();
    let backend = events
        .iter()
        .filter(|event| matches!(event, Event::Backend(_)))
        .count();
    assert_eq!(backend, 1);
    assert!(events.contains(&Event::Reader(ConnectionState::Connected)));

    harness.shutdown().await;
}
