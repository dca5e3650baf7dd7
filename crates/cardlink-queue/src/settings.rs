//! Broker connection settings.
//!
//! Built once from the agent configuration and the terminal credentials,
//! then turned into an [`AMQPUri`] for every connection the client opens.
//! The consumer and the publisher share the same settings but never share
//! a connection.

use cardlink_core::constants::{
    BROKER_CONNECTION_TIMEOUT_MS, BROKER_HEARTBEAT_SECS, DEFAULT_BROKER_VHOST,
};
use cardlink_core::{AgentConfig, Credentials};
use lapin::uri::{AMQPAuthority, AMQPQueryString, AMQPScheme, AMQPUri, AMQPUserInfo};
use std::fmt;
use std::time::Duration;

/// Where and how to reach the broker.
#[derive(Clone, PartialEq, Eq)]
pub struct BrokerSettings {
    /// Broker host name or address.
    pub host: String,

    /// Broker port.
    pub port: u16,

    /// AMQP user name.
    pub username: String,

    /// AMQP password.
    pub password: String,

    /// Virtual host.
    pub vhost: String,

    /// Durable per-terminal command queue.
    pub queue: String,

    /// Negotiated heartbeat, in seconds.
    pub heartbeat_secs: u16,

    /// Connection establishment timeout.
    pub connection_timeout: Duration,
}

impl BrokerSettings {
    /// Settings for this terminal.
    ///
    /// # Examples
    ///
    /// ```
    /// use cardlink_core::{AgentConfig, Credentials};
    /// use cardlink_queue::BrokerSettings;
    ///
    /// let settings = BrokerSettings::from_config(&AgentConfig::default(), &Credentials::new(7, "t"));
    /// assert_eq!(settings.queue, "terminal_7");
    /// assert_eq!(settings.heartbeat_secs, 600);
    /// ```
    pub fn from_config(config: &AgentConfig, credentials: &Credentials) -> Self {
        let vhost = if config.rabbitmq_vhost.trim().is_empty() {
            DEFAULT_BROKER_VHOST.to_string()
        } else {
            config.rabbitmq_vhost.clone()
        };

        Self {
            host: config.rabbitmq_host.clone(),
            port: config.rabbitmq_port,
            username: config.rabbitmq_user.clone(),
            password: config.rabbitmq_pass.clone(),
            vhost,
            queue: credentials.queue_name(),
            heartbeat_secs: BROKER_HEARTBEAT_SECS,
            connection_timeout: Duration::from_millis(BROKER_CONNECTION_TIMEOUT_MS),
        }
    }

    /// AMQP URI for a new connection.
    #[must_use]
    pub fn uri(&self) -> AMQPUri {
        AMQPUri {
            scheme: AMQPScheme::AMQP,
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: self.username.clone(),
                    password: self.password.clone(),
                },
                host: self.host.clone(),
                port: self.port,
            },
            vhost: self.vhost.clone(),
            query: AMQPQueryString {
                heartbeat: Some(self.heartbeat_secs),
                connection_timeout: Some(self.connection_timeout.as_millis() as u64),
                ..Default::default()
            },
        }
    }

    /// `host:port/vhost`, for logs.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}:{}{}", self.host, self.port, display_vhost(&self.vhost))
    }
}

fn display_vhost(vhost: &str) -> String {
    if vhost.starts_with('/') {
        vhost.to_string()
    } else {
        format!("/{vhost}")
    }
}

// Credentials stay out of logs.
impl fmt::Debug for BrokerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("vhost", &self.vhost)
            .field("queue", &self.queue)
            .field("heartbeat_secs", &self.heartbeat_secs)
            .field("connection_timeout", &self.connection_timeout)
            .finish()
    }
}

impl fmt::Display for BrokerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "amqp://{}@{} queue={}", self.username, self.endpoint(), self.queue)
    }
}
