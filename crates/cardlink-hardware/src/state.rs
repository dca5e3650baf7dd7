//! Reader connection state.
//!
//! # States
//!
//! - `NoDeviceConfigured`: configuration has no device identity; the loop
//!   re-checks configuration periodically.
//! - `Searching`: enumerating devices for the configured identity.
//! - `Connecting`: acquiring the located device.
//! - `Connected`: capturing key events.
//! - `Disconnected`: lost or never acquired the device; waits out the
//!   backoff delay before searching again.
//!
//! # Valid Transitions
//!
//! - NoDeviceConfigured → Searching
//! - Searching → Connecting / Disconnected / NoDeviceConfigured
//! - Connecting → Connected / Disconnected
//! - Connected → Disconnected
//! - Disconnected → Searching / NoDeviceConfigured

use std::fmt;

/// Connection state of the card reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No device identity configured.
    NoDeviceConfigured,

    /// Looking for the configured device.
    Searching,

    /// Acquiring the located device.
    Connecting,

    /// Device acquired; capture is live.
    Connected,

    /// Device lost or not acquired; a re-search follows.
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            ConnectionState::NoDeviceConfigured => "NoDeviceConfigured",
            ConnectionState::Searching => "Searching",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnected => "Disconnected",
        };
        write!(f, "{}", state_str)
    }
}

impl ConnectionState {
    /// Check if transition to target state is valid from this state.
    ///
    /// # Examples
    ///
    /// ```
    /// use cardlink_hardware::ConnectionState;
    ///
    /// assert!(ConnectionState::Searching.can_transition_to(&ConnectionState::Connecting));
    /// assert!(!ConnectionState::Connected.can_transition_to(&ConnectionState::Searching));
    /// ```
    pub fn can_transition_to(&self, target: &ConnectionState) -> bool {
        matches!(
            (self, target),
            (ConnectionState::NoDeviceConfigured, ConnectionState::Searching)
                | (
                    ConnectionState::Searching,
                    ConnectionState::Connecting
                        | ConnectionState::Disconnected
                        | ConnectionState::NoDeviceConfigured
                )
                | (
                    ConnectionState::Connecting,
                    ConnectionState::Connected | ConnectionState::Disconnected
                )
                | (ConnectionState::Connected, ConnectionState::Disconnected)
                | (
                    ConnectionState::Disconnected,
                    ConnectionState::Searching | ConnectionState::NoDeviceConfigured
                )
        )
    }
}

/// Externally observable reader status.
///
/// `connected()` and `message` are what the UI shows; `state` carries the
/// full detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderStatus {
    pub state: ConnectionState,
    pub message: String,
}

impl ReaderStatus {
    /// Create a status.
    pub fn new(state: ConnectionState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
        }
    }

    /// Returns `true` only while the device is acquired.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

impl Default for ReaderStatus {
    fn default() -> Self {
        Self::new(ConnectionState::Disconnected, "Reader not started")
    }
}

impl fmt::Display for ReaderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.state, self.message)
    }
}
