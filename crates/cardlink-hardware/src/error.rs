//! Error types for input device operations.
//!
//! This module defines the errors raised while locating, acquiring and
//! reading the card scanner. The reader distinguishes *device faults*
//! (the handle is gone and must be re-acquired) from transient errors
//! that only invalidate the card being typed; see
//! [`HardwareError::is_device_fault`].

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur during input device operations.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Device is not connected or has been disconnected.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// Operation is not supported on this platform.
    #[error("Unsupported operation: {operation}")]
    Unsupported { operation: String },

    /// No attached input device matches the configured identity.
    #[error("Device not found: {identity}")]
    DeviceNotFound { identity: String },

    /// The device was located but could not be opened or grabbed.
    #[error("Failed to acquire {path}: {message}")]
    AcquisitionFailed { path: String, message: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with custom message.
    #[error("{0}")]
    Other(String),
}

impl HardwareError {
    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Create a new unsupported operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Create a new device-not-found error.
    pub fn not_found(identity: impl std::fmt::Display) -> Self {
        Self::DeviceNotFound {
            identity: identity.to_string(),
        }
    }

    /// Create a new acquisition error.
    pub fn acquisition(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AcquisitionFailed {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a generic error with custom message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Returns `true` if the device handle is no longer usable.
    ///
    /// Device faults send the reader back through disconnect and
    /// re-search; any other error only discards the partial card.
    #[must_use]
    pub fn is_device_fault(&self) -> bool {
        matches!(self, Self::Disconnected { .. } | Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardlink_core::DeviceIdentity;

    #[test]
    fn test_disconnected_error() {
        let error = HardwareError::disconnected("/dev/input/event7");
        assert!(matches!(error, HardwareError::Disconnected { .. }));
        assert_eq!(error.to_string(), "Device disconnected: /dev/input/event7");
    }

    #[test]
    fn test_not_found_uses_identity_display() {
        let identity = DeviceIdentity::new().with_vendor_id(0xFFFF);
        let error = HardwareError::not_found(&identity);
        assert_eq!(
            error.to_string(),
            "Device not found: VID=0xffff PID=- serial=-"
        );
    }

    #[test]
    fn test_acquisition_error() {
        let error = HardwareError::acquisition("/dev/input/event3", "Device or resource busy");
        assert_eq!(
            error.to_string(),
            "Failed to acquire /dev/input/event3: Device or resource busy"
        );
    }

    #[test]
    fn test_device_fault_classification() {
        assert!(HardwareError::disconnected("kbd").is_device_fault());
        assert!(
            HardwareError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"))
                .is_device_fault()
        );

        assert!(!HardwareError::other("garbled").is_device_fault());
        assert!(!HardwareError::unsupported("grab").is_device_fault());
        assert!(!HardwareError::acquisition("/dev/input/event3", "busy").is_device_fault());
    }
}
