//! Orchestrator
//!
//! Wires the queue client, the card reader and the publisher together:
//!
//! ```text
//! ScanCommand ──▶ on_scan_requested ──▶ reader.request_scan
//!                                            │
//!                       card ◀───────────────┘
//!                         │
//!                         ├──▶ on_scan_completed
//!                         └──▶ publish SUCCESS ──(failure)──▶ on_scan_error
//! ```
//!
//! The reader never gives up on a request by itself. With a scan timeout
//! configured, the orchestrator cancels a request that outlives it and
//! publishes an ERROR result in its place.
//!
//! Status from the reader, the broker and the backend probe is forwarded
//! to the observer as three independent streams.

use crate::observer::AgentObserver;
use crate::probe::{BackendStatus, ReachabilityProbe};
use cardlink_core::constants::BACKEND_PROBE_INTERVAL_MS;
use cardlink_core::{CardId, ResultMessage, ScanId};
use cardlink_hardware::ReaderHandle;
use cardlink_queue::{BrokerStatus, ResultPublisher, ScanCommand};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{MissedTickBehavior, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Error text published when a scan request outlives the scan timeout.
pub const SCAN_TIMEOUT_ERROR: &str = "scan timed out";

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Token attached to every published result.
    pub auth_token: String,

    /// Give up on a waiting request after this long. `None` waits forever.
    pub scan_timeout: Option<Duration>,

    /// How often the backend probe runs.
    pub probe_interval: Duration,
}

impl OrchestratorConfig {
    pub fn new(auth_token: impl Into<String>) -> Self {
        Self {
            auth_token: auth_token.into(),
            scan_timeout: None,
            probe_interval: Duration::from_millis(BACKEND_PROBE_INTERVAL_MS),
        }
    }

    pub fn with_scan_timeout(mut self, scan_timeout: Option<Duration>) -> Self {
        self.scan_timeout = scan_timeout;
        self
    }

    pub fn with_probe_interval(mut self, probe_interval: Duration) -> Self {
        self.probe_interval = probe_interval;
        self
    }
}

/// Composition of reader, queue and publisher.
pub struct Orchestrator<P, B> {
    reader: ReaderHandle,
    publisher: Arc<P>,
    probe: Arc<B>,
    observer: Arc<dyn AgentObserver>,
    config: OrchestratorConfig,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl<P, B> Orchestrator<P, B>
where
    P: ResultPublisher + 'static,
    B: ReachabilityProbe + 'static,
{
    pub fn new(
        reader: ReaderHandle,
        publisher: P,
        probe: B,
        observer: Arc<dyn AgentObserver>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            reader,
            publisher: Arc::new(publisher),
            probe: Arc::new(probe),
            observer,
            config,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// Returns `true` while the dispatch loop is alive.
    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|task| !task.is_finished())
    }

    /// Start dispatching `commands` and forwarding `broker` status.
    pub fn start(
        &mut self,
        commands: mpsc::Receiver<ScanCommand>,
        broker: watch::Receiver<BrokerStatus>,
    ) {
        if self.is_running() {
            return;
        }
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }

        let (completions_tx, completions) = mpsc::unbounded_channel();
        let dispatch = Dispatch {
            reader: self.reader.clone(),
            publisher: Arc::clone(&self.publisher),
            observer: Arc::clone(&self.observer),
            auth_token: self.config.auth_token.clone(),
            scan_timeout: self.config.scan_timeout,
            completions_tx,
            publishes: JoinSet::new(),
            deadline: None,
        };
        self.tasks.push(tokio::spawn(dispatch.run(
            commands,
            completions,
            broker,
            self.cancel.clone(),
        )));

        self.tasks.push(tokio::spawn(probe_loop(
            Arc::clone(&self.probe),
            Arc::clone(&self.observer),
            self.config.probe_interval,
            self.cancel.clone(),
        )));

        info!(
            scan_timeout_ms = self.config.scan_timeout.map(|t| t.as_millis() as u64),
            "Orchestrator started"
        );
    }

    /// Stop dispatching. Waits up to `timeout` for in-flight publishes.
    pub async fn stop(&mut self, timeout: Duration) {
        self.cancel.cancel();

        for mut task in self.tasks.drain(..) {
            match tokio::time::timeout(timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Orchestrator task failed"),
                Err(_) => {
                    warn!(
                        timeout_ms = timeout.as_millis() as u64,
                        "Orchestrator task did not stop in time, aborting"
                    );
                    task.abort();
                }
            }
        }
        info!("Orchestrator stopped");
    }
}

impl<P, B> Drop for Orchestrator<P, B> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Deadline {
    scan_id: ScanId,
    sleep: Pin<Box<Sleep>>,
}

/// Resolves when the deadline passes; never resolves without one.
async fn expired(deadline: &mut Option<Deadline>) {
    match deadline {
        Some(deadline) => deadline.sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

/// Resolves with the latest value; never resolves once the sender is gone.
async fn next_status<T: Clone>(status: &mut watch::Receiver<T>) -> T {
    if status.changed().await.is_err() {
        std::future::pending::<()>().await;
    }
    status.borrow_and_update().clone()
}

struct Dispatch<P> {
    reader: ReaderHandle,
    publisher: Arc<P>,
    observer: Arc<dyn AgentObserver>,
    auth_token: String,
    scan_timeout: Option<Duration>,
    completions_tx: mpsc::UnboundedSender<(ScanId, CardId)>,
    publishes: JoinSet<()>,
    deadline: Option<Deadline>,
}

impl<P: ResultPublisher + 'static> Dispatch<P> {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<ScanCommand>,
        mut completions: mpsc::UnboundedReceiver<(ScanId, CardId)>,
        mut broker: watch::Receiver<BrokerStatus>,
        cancel: CancellationToken,
    ) {
        let mut reader_status = self.reader.subscribe();
        self.observer
            .on_reader_status(&reader_status.borrow_and_update().clone());
        self.observer
            .on_broker_status(&broker.borrow_and_update().clone());

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => {
                        debug!("Scan command channel closed");
                        break;
                    }
                },
                Some((scan_id, card_id)) = completions.recv() => {
                    self.on_card(scan_id, card_id);
                }
                _ = expired(&mut self.deadline) => self.on_timeout(),
                status = next_status(&mut reader_status) => {
                    self.observer.on_reader_status(&status);
                }
                status = next_status(&mut broker) => {
                    self.observer.on_broker_status(&status);
                }
                Some(joined) = self.publishes.join_next(), if !self.publishes.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "Publish task failed");
                    }
                }
            }
        }

        // Final states that raced the cancellation
        if reader_status.has_changed().unwrap_or(false) {
            self.observer
                .on_reader_status(&reader_status.borrow_and_update().clone());
        }
        if broker.has_changed().unwrap_or(false) {
            self.observer
                .on_broker_status(&broker.borrow_and_update().clone());
        }

        if let Some(deadline) = self.deadline.take() {
            self.reader.cancel_scan_if(&deadline.scan_id);
        }
        while let Some(joined) = self.publishes.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Publish task failed");
            }
        }
    }

    fn on_command(&mut self, command: ScanCommand) {
        let scan_id = command.scan_id;
        self.observer.on_scan_requested(&scan_id);

        let completions = self.completions_tx.clone();
        self.reader.request_scan(scan_id.clone(), move |scan_id, card_id| {
            let _ = completions.send((scan_id, card_id));
        });

        self.deadline = self.scan_timeout.map(|timeout| Deadline {
            scan_id,
            sleep: Box::pin(tokio::time::sleep(timeout)),
        });
    }

    fn on_card(&mut self, scan_id: ScanId, card_id: CardId) {
        info!(%scan_id, %card_id, "Card scanned");
        if self
            .deadline
            .as_ref()
            .is_some_and(|deadline| deadline.scan_id == scan_id)
        {
            self.deadline = None;
        }

        self.observer.on_scan_completed(&scan_id, &card_id);
        self.publish(ResultMessage::success(scan_id, &card_id, self.auth_token.as_str()));
    }

    fn on_timeout(&mut self) {
        let Some(deadline) = self.deadline.take() else {
            return;
        };
        if !self.reader.cancel_scan_if(&deadline.scan_id) {
            return;
        }

        warn!(scan_id = %deadline.scan_id, "Scan timed out");
        self.observer.on_scan_error(SCAN_TIMEOUT_ERROR);
        self.publish(ResultMessage::failure(
            deadline.scan_id,
            SCAN_TIMEOUT_ERROR,
            self.auth_token.as_str(),
        ));
    }

    fn publish(&mut self, message: ResultMessage) {
        let publisher = Arc::clone(&self.publisher);
        let observer = Arc::clone(&self.observer);
        self.publishes.spawn(async move {
            if let Err(e) = publisher.publish(&message).await {
                observer.on_scan_error(&format!(
                    "Failed to publish result for {}: {e}",
                    message.scan_id
                ));
            }
        });
    }
}

async fn probe_loop<B: ReachabilityProbe>(
    probe: Arc<B>,
    observer: Arc<dyn AgentObserver>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticks = tokio::time::interval(interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last: Option<BackendStatus> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticks.tick() => {}
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => break,
            status = probe.probe() => status,
        };
        if last.as_ref() != Some(&status) {
            observer.on_backend_status(&status);
            last = Some(status);
        }
    }
}
