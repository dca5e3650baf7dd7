//! Result publishing.
//!
//! Every result goes out on its own short-lived connection: connect,
//! declare the durable results queue, publish one persistent message,
//! close. The long-lived consumer connection is never shared with the
//! tasks that publish.

use crate::{QueueError, Result, settings::BrokerSettings};
use cardlink_core::ResultMessage;
use cardlink_core::constants::{PUBLISH_TIMEOUT_MS, RESULTS_QUEUE};
use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Connection, ConnectionProperties};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// AMQP delivery mode for messages that survive a broker restart.
pub const PERSISTENT_DELIVERY: u8 = 2;

/// Content type of result bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Sends scan results to the backend.
///
/// Implementations report failure once through the returned error and do
/// not retry on their own.
pub trait ResultPublisher: Send + Sync {
    /// Publish one result.
    fn publish(&self, message: &ResultMessage) -> impl Future<Output = Result<()>> + Send;
}

/// Publisher over a fresh AMQP connection per call.
#[derive(Debug, Clone)]
pub struct AmqpPublisher {
    settings: BrokerSettings,
    queue: String,
    timeout: Duration,
}

impl AmqpPublisher {
    /// Publisher to the well-known results queue.
    pub fn new(settings: BrokerSettings) -> Self {
        Self {
            settings,
            queue: RESULTS_QUEUE.to_string(),
            timeout: Duration::from_millis(PUBLISH_TIMEOUT_MS),
        }
    }

    /// Override the bound on one publish.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Target queue.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    async fn publish_once(&self, payload: &[u8]) -> Result<()> {
        let connection =
            Connection::connect_uri(self.settings.uri(), ConnectionProperties::default()).await?;

        let outcome = async {
            let channel = connection.create_channel().await?;
            channel
                .queue_declare(
                    &self.queue,
                    QueueDeclareOptions {
                        durable: true,
                        ..QueueDeclareOptions::default()
                    },
                    FieldTable::default(),
                )
                .await?;

            channel
                .basic_publish(
                    "",
                    &self.queue,
                    BasicPublishOptions::default(),
                    payload,
                    BasicProperties::default()
                        .with_delivery_mode(PERSISTENT_DELIVERY)
                        .with_content_type(JSON_CONTENT_TYPE.into()),
                )
                .await?
                .await?;
            Ok::<_, QueueError>(())
        }
        .await;

        if let Err(e) = connection.close(200, "result published").await {
            debug!(error = %e, "Publisher connection close failed");
        }
        outcome
    }
}

impl ResultPublisher for AmqpPublisher {
    async fn publish(&self, message: &ResultMessage) -> Result<()> {
        let payload = message.to_json()?;

        match timeout(self.timeout, self.publish_once(&payload)).await {
            Ok(Ok(())) => {
                info!(
                    scan_id = %message.scan_id,
                    status = %message.status,
                    queue = %self.queue,
                    "Published scan result"
                );
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(scan_id = %message.scan_id, error = %e, "Failed to publish scan result");
                Err(e)
            }
            Err(_) => {
                let ms = self.timeout.as_millis() as u64;
                warn!(scan_id = %message.scan_id, timeout_ms = ms, "Publishing scan result timed out");
                Err(QueueError::PublishTimeout(ms))
            }
        }
    }
}
