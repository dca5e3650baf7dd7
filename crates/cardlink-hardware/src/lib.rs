//! Card scanner input layer for the cardlink agent.
//!
//! Card scanners attached to a terminal are keyboard wedges: they type the
//! card id followed by Enter. This crate finds the scanner among the
//! attached input devices, acquires it exclusively, and turns its
//! keystrokes into card ids for whoever asked for a scan.
//!
//! # Components
//!
//! - [`locator`]: scores attached devices against a [`DeviceIdentity`](cardlink_core::DeviceIdentity).
//! - [`KeySource`] / [`AnyKeySource`]: an exclusively acquired event
//!   stream (evdev grab on Linux, low-level hook on Windows, mock in tests).
//! - [`InputBackend`]: platform selection, made once at startup.
//! - [`CardReader`] / [`ReaderHandle`]: the capture loop, scan gating and
//!   the connection state machine.
//!
//! # Design Philosophy
//!
//! - **Async-first**: I/O uses native `async fn` in traits (Rust 1.90 +
//!   Edition 2024 RPITIT), dispatched through enums rather than trait
//!   objects.
//! - **Never stop on faults**: an unplugged scanner sends the reader back
//!   to searching; only [`CardReader::stop`] ends the loop.
//! - **Gate capture**: keystrokes typed while no scan is waiting are
//!   discarded, never buffered.
//!
//! # Example
//!
//! ```no_run
//! use cardlink_core::{DeviceIdentity, ScanId};
//! use cardlink_hardware::{CardReader, InputBackend, ReaderConfig};
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> cardlink_hardware::Result<()> {
//!     let identity = DeviceIdentity::new().with_vendor_id(0xFFFF).with_product_id(0x0035);
//!     let (_identity_tx, identity_rx) = watch::channel(Some(identity));
//!
//!     let mut reader = CardReader::new(InputBackend::detect()?, identity_rx, ReaderConfig::default());
//!     reader.start();
//!
//!     let handle = reader.handle();
//!     handle.request_scan(ScanId::new("s1").unwrap(), |scan_id, card_id| {
//!         println!("{scan_id} -> {card_id}");
//!     });
//!
//!     tokio::signal::ctrl_c().await?;
//!     reader.stop().await;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
#[cfg(windows)]
pub mod hook;
pub mod key;
#[cfg(target_os = "linux")]
pub mod linux;
pub mod locator;
pub mod mock;
pub mod reader;
pub mod source;
pub mod state;
pub mod types;

// Re-export commonly used types
pub use backend::InputBackend;
pub use error::{HardwareError, Result};
pub use key::{Key, KeyEvent, KeyState};
pub use locator::DeviceEnumerator;
pub use reader::{CardReader, ReaderConfig, ReaderHandle, ScanCallback, ScanRequest};
pub use source::{AnyKeySource, KeySource};
pub use state::{ConnectionState, ReaderStatus};
pub use types::{DeviceLocation, InputCandidate};
