//! Queue consumer
//!
//! [`QueueClient`] owns one long-lived consume loop bound to the durable
//! per-terminal queue. Scan commands are handed to the caller over an
//! `mpsc` channel; everything else on the queue is acknowledged and
//! dropped.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  deliveries   ┌──────────────┐  ScanCommand   ┌──────────────┐
//! │  terminal_N  │──────────────▶│ ConsumeLoop  │───────────────▶│ Orchestrator │
//! │   (durable)  │◀──────────────│ (tokio task) │                └──────────────┘
//! └──────────────┘   ack / nack  └──────────────┘
//! ```
//!
//! # Design Principles
//!
//! - **One message in flight**: prefetch is 1 and acknowledgment is
//!   explicit, so the terminal never receives a second command while the
//!   first is being handled.
//! - **No poison loops**: malformed bodies are acked, handler failures are
//!   nacked without requeue.
//! - **Never give up**: any connection fault drops back to a fixed retry
//!   delay. Only [`QueueClient::stop`] ends the loop.
//! - **Bounded shutdown**: `stop` waits a few seconds at most, even if the
//!   broker is unreachable.
//!
//! # Example
//!
//! ```no_run
//! use cardlink_core::{AgentConfig, Credentials};
//! use cardlink_queue::{BrokerSettings, QueueClient, QueueClientConfig};
//! use tokio::sync::mpsc;
//!
//! # async fn example() {
//! let settings = BrokerSettings::from_config(&AgentConfig::default(), &Credentials::new(7, "t"));
//! let (tx, mut commands) = mpsc::channel(8);
//!
//! let mut client = QueueClient::new(settings, tx, QueueClientConfig::default());
//! client.start();
//!
//! while let Some(command) = commands.recv().await {
//!     println!("scan requested: {}", command.scan_id);
//! }
//! client.stop().await;
//! # }
//! ```

use crate::command::{Disposition, ScanCommand, handle_delivery};
use crate::{QueueError, Result, settings::BrokerSettings};
use cardlink_core::constants::{
    BROKER_RETRY_DELAY_MS, CONSUMER_STOP_TIMEOUT_MS, PREFETCH_COUNT, RESULTS_QUEUE,
};
use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Broker connectivity as seen by the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerStatus {
    pub connected: bool,
    pub message: String,
}

impl BrokerStatus {
    pub fn connected(message: impl Into<String>) -> Self {
        Self {
            connected: true,
            message: message.into(),
        }
    }

    pub fn disconnected(message: impl Into<String>) -> Self {
        Self {
            connected: false,
            message: message.into(),
        }
    }
}

impl Default for BrokerStatus {
    fn default() -> Self {
        Self::disconnected("Queue client not started")
    }
}

impl fmt::Display for BrokerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.connected { "connected" } else { "disconnected" };
        write!(f, "{state}: {}", self.message)
    }
}

/// Consume loop tuning.
#[derive(Debug, Clone)]
pub struct QueueClientConfig {
    /// Fixed delay between reconnect attempts.
    pub retry_delay: Duration,

    /// Bound on joining the consume loop in [`QueueClient::stop`].
    pub stop_timeout: Duration,

    /// Maximum unacknowledged deliveries.
    pub prefetch: u16,
}

impl Default for QueueClientConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_millis(BROKER_RETRY_DELAY_MS),
            stop_timeout: Duration::from_millis(CONSUMER_STOP_TIMEOUT_MS),
            prefetch: PREFETCH_COUNT,
        }
    }
}

/// Consumer of the per-terminal command queue.
pub struct QueueClient {
    settings: BrokerSettings,
    config: QueueClientConfig,
    commands: mpsc::Sender<ScanCommand>,
    status: Arc<watch::Sender<BrokerStatus>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl QueueClient {
    /// Create a stopped client that forwards scan commands to `commands`.
    pub fn new(
        settings: BrokerSettings,
        commands: mpsc::Sender<ScanCommand>,
        config: QueueClientConfig,
    ) -> Self {
        let (status, _) = watch::channel(BrokerStatus::default());
        Self {
            settings,
            config,
            commands,
            status: Arc::new(status),
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// Connection settings in use.
    pub fn settings(&self) -> &BrokerSettings {
        &self.settings
    }

    /// Current broker status.
    pub fn status(&self) -> BrokerStatus {
        self.status.borrow().clone()
    }

    /// Subscribe to broker status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<BrokerStatus> {
        self.status.subscribe()
    }

    /// Returns `true` while the consume loop task is alive.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Spawn the consume loop. Does nothing if it is already running.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }

        let consume = ConsumeLoop {
            settings: self.settings.clone(),
            config: self.config.clone(),
            commands: self.commands.clone(),
            status: Arc::clone(&self.status),
            cancel: self.cancel.clone(),
        };
        self.task = Some(tokio::spawn(consume.run()));
        info!(broker = %self.settings, "Queue consumer started");
    }

    /// Stop the consume loop.
    ///
    /// Safe to call when the broker is unreachable or the client was never
    /// started. Waits up to `stop_timeout`, then aborts the loop.
    pub async fn stop(&mut self) {
        self.cancel.cancel();

        let Some(mut task) = self.task.take() else {
            return;
        };

        match timeout(self.config.stop_timeout, &mut task).await {
            Ok(Ok(())) => info!("Queue consumer stopped"),
            Ok(Err(e)) => warn!(error = %e, "Queue consumer task failed"),
            Err(_) => {
                warn!(
                    timeout_ms = self.config.stop_timeout.as_millis() as u64,
                    "Queue consumer did not stop in time, aborting"
                );
                task.abort();
                self.status
                    .send_replace(BrokerStatus::disconnected("Queue client stopped"));
            }
        }
    }
}

impl fmt::Debug for QueueClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueClient")
            .field("settings", &self.settings)
            .field("config", &self.config)
            .field("status", &*self.status.borrow())
            .field("running", &self.is_running())
            .finish()
    }
}

impl Drop for QueueClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct ConsumeLoop {
    settings: BrokerSettings,
    config: QueueClientConfig,
    commands: mpsc::Sender<ScanCommand>,
    status: Arc<watch::Sender<BrokerStatus>>,
    cancel: CancellationToken,
}

impl ConsumeLoop {
    async fn run(self) {
        while !self.cancel.is_cancelled() {
            if let Err(e) = self.session().await {
                error!(
                    broker = %self.settings.endpoint(),
                    error = %e,
                    retry_ms = self.config.retry_delay.as_millis() as u64,
                    "Broker connection failed, retrying"
                );
                self.set_status(BrokerStatus::disconnected(format!("Broker unavailable: {e}")));

                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.config.retry_delay) => {}
                }
            }
        }

        self.set_status(BrokerStatus::disconnected("Queue client stopped"));
    }

    fn set_status(&self, status: BrokerStatus) {
        self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }

    /// One connection lifetime. `Ok` only when cancelled.
    async fn session(&self) -> Result<()> {
        let connection = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(()),
            connection = Connection::connect_uri(self.settings.uri(), ConnectionProperties::default()) => connection?,
        };
        debug!(broker = %self.settings.endpoint(), "Broker connection opened");

        let outcome = self.consume(&connection).await;

        match timeout(CLOSE_TIMEOUT, connection.close(200, "consumer closing")).await {
            Ok(Ok(())) => debug!("Broker connection closed"),
            Ok(Err(e)) => debug!(error = %e, "Broker connection close failed"),
            Err(_) => debug!("Broker connection close timed out"),
        }
        outcome
    }

    async fn consume(&self, connection: &Connection) -> Result<()> {
        let channel = connection.create_channel().await?;
        declare_durable(&channel, &self.settings.queue).await?;
        declare_durable(&channel, RESULTS_QUEUE).await?;
        channel
            .basic_qos(self.config.prefetch, BasicQosOptions::default())
            .await?;

        let mut consumer = channel
            .basic_consume(
                &self.settings.queue,
                "",
                BasicConsumeOptions {
                    no_ack: false,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        info!(queue = %self.settings.queue, "Consuming scan requests");
        self.set_status(BrokerStatus::connected(format!(
            "Listening on {}",
            self.settings.queue
        )));

        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                next = consumer.next() => next,
            };
            let delivery = match next {
                Some(delivery) => delivery?,
                None => return Err(QueueError::StreamEnded(self.settings.queue.clone())),
            };

            // An unacknowledged delivery is redelivered once the connection closes.
            let disposition = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                disposition = handle_delivery(&delivery.data, &self.commands) => disposition,
            };
            settle(&delivery, disposition).await?;
        }
    }
}

async fn declare_durable(channel: &Channel, queue: &str) -> Result<()> {
    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await?;
    Ok(())
}

async fn settle(delivery: &Delivery, disposition: Disposition) -> Result<()> {
    match disposition {
        Disposition::Ack => delivery.acker.ack(BasicAckOptions::default()).await?,
        Disposition::Nack => {
            warn!(delivery_tag = delivery.delivery_tag, "Rejecting delivery without requeue");
            delivery
                .acker
                .nack(BasicNackOptions {
                    requeue: false,
                    ..BasicNackOptions::default()
                })
                .await?
        }
    }
    Ok(())
}
