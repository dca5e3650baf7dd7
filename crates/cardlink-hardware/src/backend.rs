//! Input backend selection.
//!
//! The platform decides how key events are captured: per-device evdev
//! nodes on Linux, a global keyboard hook on Windows. The backend is
//! chosen once at startup with [`InputBackend::detect`] and then answers
//! the two questions the reader asks: where is the device, and how do I
//! open it.

#[cfg(windows)]
use crate::hook::HookSource;
#[cfg(target_os = "linux")]
use crate::linux::{EvdevEnumerator, EvdevSource};
use crate::{
    Result,
    locator,
    mock::MockKeyboard,
    source::AnyKeySource,
    types::DeviceLocation,
};
use cardlink_core::DeviceIdentity;
use std::fmt;

/// How key events are captured on this machine.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum InputBackend {
    /// Per-device evdev nodes.
    #[cfg(target_os = "linux")]
    Evdev,

    /// Process-wide low-level keyboard hook.
    #[cfg(windows)]
    GlobalHook,

    /// Mock keyboard for development and testing.
    Mock(MockKeyboard),
}

impl InputBackend {
    /// Select the backend for the current platform.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::Unsupported` on platforms without a backend.
    pub fn detect() -> Result<Self> {
        #[cfg(target_os = "linux")]
        {
            Ok(Self::Evdev)
        }
        #[cfg(windows)]
        {
            Ok(Self::GlobalHook)
        }
        #[cfg(not(any(target_os = "linux", windows)))]
        {
            Err(crate::HardwareError::unsupported(format!(
                "keyboard capture on {}",
                std::env::consts::OS
            )))
        }
    }

    /// Returns `true` if this backend captures through a global hook.
    #[must_use]
    pub fn uses_global_hook(&self) -> bool {
        match self {
            #[cfg(target_os = "linux")]
            Self::Evdev => false,
            #[cfg(windows)]
            Self::GlobalHook => true,
            Self::Mock(keyboard) => keyboard.is_global_hook(),
        }
    }

    /// Find the device for `identity`.
    ///
    /// Global-hook backends skip discovery and return
    /// [`DeviceLocation::GlobalHook`].
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::DeviceNotFound` if no attached device matches.
    pub fn locate(&self, identity: &DeviceIdentity) -> Result<DeviceLocation> {
        if self.uses_global_hook() {
            return Ok(DeviceLocation::GlobalHook);
        }

        let candidate = match self {
            #[cfg(target_os = "linux")]
            Self::Evdev => locator::locate(&EvdevEnumerator, identity)?,
            #[cfg(windows)]
            Self::GlobalHook => return Ok(DeviceLocation::GlobalHook),
            Self::Mock(keyboard) => locator::locate(keyboard, identity)?,
        };
        Ok(DeviceLocation::Path(candidate.path))
    }

    /// Exclusively acquire the source at `location`.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::AcquisitionFailed` if the device cannot be
    /// opened or grabbed, or `HardwareError::Unsupported` if the location
    /// does not fit this backend.
    pub async fn open(&self, location: &DeviceLocation) -> Result<AnyKeySource> {
        match (self, location) {
            #[cfg(target_os = "linux")]
            (Self::Evdev, DeviceLocation::Path(path)) => {
                Ok(AnyKeySource::Evdev(EvdevSource::open(path)?))
            }
            #[cfg(windows)]
            (Self::GlobalHook, DeviceLocation::GlobalHook) => {
                Ok(AnyKeySource::GlobalHook(HookSource::install().await?))
            }
            (Self::Mock(keyboard), location) => Ok(AnyKeySource::Mock(keyboard.open(location)?)),
            #[allow(unreachable_patterns)]
            (backend, location) => Err(crate::HardwareError::unsupported(format!(
                "opening {location} with the {backend} backend"
            ))),
        }
    }
}

impl fmt::Display for InputBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            #[cfg(target_os = "linux")]
            Self::Evdev => write!(f, "evdev"),
            #[cfg(windows)]
            Self::GlobalHook => write!(f, "global hook"),
            Self::Mock(_) => write!(f, "mock"),
        }
    }
}
