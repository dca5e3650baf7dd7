//! Key event sources.
//!
//! A key source is an exclusively acquired stream of key events: a grabbed
//! evdev node on Linux, a low-level keyboard hook on Windows, or the mock
//! keyboard in tests. The reader's capture loop is written against
//! [`KeySource`] only.
//!
//! # Enum Dispatch
//!
//! Native `async fn` in traits is not object-safe, so sources are wrapped
//! in [`AnyKeySource`] instead of `Box<dyn KeySource>`. Platform variants
//! only exist on their platform.

#[cfg(windows)]
use crate::hook::HookSource;
#[cfg(target_os = "linux")]
use crate::linux::EvdevSource;
use crate::key::KeyEvent;
use crate::mock::MockKeySource;
use crate::Result;

/// An exclusively acquired source of key events.
///
/// # Cancellation
///
/// `next_event` must be cancel-safe: the reader races it against shutdown
/// and configuration changes, and a dropped future must not lose an event
/// that was already dequeued.
pub trait KeySource: Send + Sync {
    /// Wait for the next key event.
    ///
    /// # Errors
    ///
    /// A device fault (see [`HardwareError::is_device_fault`](crate::HardwareError::is_device_fault))
    /// means the source is gone and must be released.
    async fn next_event(&mut self) -> Result<KeyEvent>;

    /// Release exclusive ownership. Idempotent.
    async fn release(&mut self) -> Result<()>;

    /// Short description for logs and status messages.
    fn describe(&self) -> String;
}

/// Enum wrapper for key source dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyKeySource {
    /// Grabbed evdev device node.
    #[cfg(target_os = "linux")]
    Evdev(EvdevSource),

    /// Process-wide low-level keyboard hook.
    #[cfg(windows)]
    GlobalHook(HookSource),

    /// Mock keyboard for development and testing.
    Mock(MockKeySource),
}

impl KeySource for AnyKeySource {
    async fn next_event(&mut self) -> Result<KeyEvent> {
        match self {
            #[cfg(target_os = "linux")]
            Self::Evdev(source) => source.next_event().await,
            #[cfg(windows)]
            Self::GlobalHook(source) => source.next_event().await,
            Self::Mock(source) => source.next_event().await,
        }
    }

    async fn release(&mut self) -> Result<()> {
        match self {
            #[cfg(target_os = "linux")]
            Self::Evdev(source) => source.release().await,
            #[cfg(windows)]
            Self::GlobalHook(source) => source.release().await,
            Self::Mock(source) => source.release().await,
        }
    }

    fn describe(&self) -> String {
        match self {
            #[cfg(target_os = "linux")]
            Self::Evdev(source) => source.describe(),
            #[cfg(windows)]
            Self::GlobalHook(source) => source.describe(),
            Self::Mock(source) => source.describe(),
        }
    }
}
