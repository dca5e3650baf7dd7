//! Broker layer for the cardlink agent.
//!
//! The backend talks to a terminal through two AMQP queues: a durable
//! per-terminal queue carrying scan commands in, and a shared durable
//! results queue carrying scan results out.
//!
//! # Components
//!
//! - [`BrokerSettings`]: where the broker is and how to log in.
//! - [`command`]: inbound envelope parsing and ack/nack disposition.
//! - [`QueueClient`]: the long-lived consume loop with reconnect.
//! - [`ResultPublisher`] / [`AmqpPublisher`]: one short-lived connection
//!   per published result.
//!
//! # Example
//!
//! ```no_run
//! use cardlink_core::{AgentConfig, CardId, Credentials, ResultMessage, ScanId};
//! use cardlink_queue::{AmqpPublisher, BrokerSettings, ResultPublisher};
//!
//! # async fn example() -> cardlink_queue::Result<()> {
//! let settings = BrokerSettings::from_config(&AgentConfig::default(), &Credentials::new(7, "t"));
//! let publisher = AmqpPublisher::new(settings);
//!
//! let card = CardId::new("42x")?;
//! publisher
//!     .publish(&ResultMessage::success(ScanId::new("s1")?, &card, "t"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod command;
mod consumer;
mod error;
mod publisher;
mod settings;

pub use command::{Command, Disposition, IgnoreReason, ScanCommand};
pub use consumer::{BrokerStatus, QueueClient, QueueClientConfig};
pub use error::{QueueError, Result};
pub use publisher::{AmqpPublisher, ResultPublisher};
pub use settings::BrokerSettings;
