//! Core constants for the card scanning agent.
//!
//! This module centralizes the timing, retry and naming constants shared by
//! the reader, the queue client and the agent binary. Keeping them in one
//! place makes the reconnect behaviour of the whole agent easy to audit.
//!
//! # Timing Overview
//!
//! | Constant | Value | Used by |
//! |----------|-------|---------|
//! | [`CONNECT_ATTEMPTS`] | 5 | Reader connect |
//! | [`CONNECT_ATTEMPT_INTERVAL_MS`] | 1000 | Reader connect |
//! | [`RECONNECT_FLOOR_MS`] / [`RECONNECT_STEP_MS`] / [`RECONNECT_CAP_MS`] | 1000 / 1000 / 5000 | Reader backoff |
//! | [`CONFIG_POLL_INTERVAL_MS`] | 5000 | Unconfigured reader, config watcher |
//! | [`BROKER_RETRY_DELAY_MS`] | 5000 | Queue consumer |
//! | [`BROKER_HEARTBEAT_SECS`] | 600 | AMQP connection |
//!
//! # Usage
//!
//! ```
//! use cardlink_core::constants::*;
//! use std::time::Duration;
//!
//! let cap = Duration::from_millis(RECONNECT_CAP_MS);
//! assert_eq!(cap, Duration::from_secs(5));
//! ```

// ============================================================================
// Reader Connection
// ============================================================================

/// Number of bounded attempts made to acquire a located device.
pub const CONNECT_ATTEMPTS: u32 = 5;

/// Pause between two acquisition attempts, in milliseconds.
pub const CONNECT_ATTEMPT_INTERVAL_MS: u64 = 1000;

/// First reconnect delay after a failed connect, in milliseconds.
pub const RECONNECT_FLOOR_MS: u64 = 1000;

/// Amount added to the reconnect delay after each failure, in milliseconds.
pub const RECONNECT_STEP_MS: u64 = 1000;

/// Upper bound of the reconnect delay, in milliseconds.
pub const RECONNECT_CAP_MS: u64 = 5000;

/// Pause after a device fault before re-searching, in milliseconds.
pub const FAULT_PAUSE_MS: u64 = 1000;

/// How often an unconfigured reader re-checks configuration, in milliseconds.
///
/// The same interval drives the configuration file watcher.
pub const CONFIG_POLL_INTERVAL_MS: u64 = 5000;

/// Bounded join timeout when stopping the reader, in milliseconds.
pub const READER_STOP_TIMEOUT_MS: u64 = 2000;

/// Bounded join timeout when stopping the configuration watcher, in milliseconds.
pub const CONFIG_WATCH_STOP_TIMEOUT_MS: u64 = 1000;

// ============================================================================
// Broker
// ============================================================================

/// Default AMQP host.
pub const DEFAULT_BROKER_HOST: &str = "localhost";

/// Default AMQP port.
pub const DEFAULT_BROKER_PORT: u16 = 5672;

/// Default AMQP virtual host.
pub const DEFAULT_BROKER_VHOST: &str = "/";

/// Well-known queue receiving scan results from every terminal.
pub const RESULTS_QUEUE: &str = "backend_results";

/// Prefix used to derive a terminal queue name from its id.
///
/// # Examples
///
/// ```
/// use cardlink_core::constants::TERMINAL_QUEUE_PREFIX;
///
/// let queue = format!("{TERMINAL_QUEUE_PREFIX}{}", 42);
/// assert_eq!(queue, "terminal_42");
/// ```
pub const TERMINAL_QUEUE_PREFIX: &str = "terminal_";

/// Fixed delay between consumer reconnect attempts, in milliseconds.
pub const BROKER_RETRY_DELAY_MS: u64 = 5000;

/// AMQP heartbeat negotiated with the broker, in seconds.
///
/// The workload is low-frequency and bursty, so the heartbeat is generous.
pub const BROKER_HEARTBEAT_SECS: u16 = 600;

/// AMQP connection timeout, in milliseconds.
pub const BROKER_CONNECTION_TIMEOUT_MS: u64 = 300_000;

/// Bound on one complete publish (connect, declare, publish, close), in milliseconds.
pub const PUBLISH_TIMEOUT_MS: u64 = 10_000;

/// Bounded join timeout when stopping the queue consumer, in milliseconds.
pub const CONSUMER_STOP_TIMEOUT_MS: u64 = 5000;

/// Maximum number of unacknowledged deliveries per consumer.
pub const PREFETCH_COUNT: u16 = 1;

// ============================================================================
// Backend
// ============================================================================

/// Default backend base URL.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

/// How often backend reachability is probed, in milliseconds.
pub const BACKEND_PROBE_INTERVAL_MS: u64 = 5000;

/// Timeout of a single backend reachability probe, in milliseconds.
pub const BACKEND_PROBE_TIMEOUT_MS: u64 = 3000;

// ============================================================================
// Local Configuration
// ============================================================================

/// Directory (under the user's home) holding agent configuration.
pub const CONFIG_DIR_NAME: &str = ".cardlink";

/// Agent configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Terminal credentials file name.
pub const CREDENTIALS_FILE_NAME: &str = "credentials.json";

/// Default serial rate hint for readers that report one.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_bounds_are_ordered() {
        assert!(RECONNECT_FLOOR_MS <= RECONNECT_CAP_MS);
        assert!(RECONNECT_STEP_MS > 0);
    }

    #[test]
    fn test_prefetch_is_single_message() {
        assert_eq!(PREFETCH_COUNT, 1);
    }
}
