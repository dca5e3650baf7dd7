//! Common types for input device discovery.

use std::fmt;
use std::path::PathBuf;

/// An attached input device as reported by the operating system.
///
/// Vendor, product and serial are optional because not every device
/// reports them; a missing value on the candidate never rejects it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputCandidate {
    /// Device node, e.g. `/dev/input/event7`.
    pub path: PathBuf,

    /// Human-readable device name.
    pub name: String,

    /// USB vendor id.
    pub vendor_id: Option<u16>,

    /// USB product id.
    pub product_id: Option<u16>,

    /// Unique/serial string reported by the OS.
    pub serial: Option<String>,
}

impl InputCandidate {
    /// Create a candidate with only a path and name.
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            vendor_id: None,
            product_id: None,
            serial: None,
        }
    }

    /// Set vendor and product ids.
    pub fn with_ids(mut self, vendor_id: u16, product_id: u16) -> Self {
        self.vendor_id = Some(vendor_id);
        self.product_id = Some(product_id);
        self
    }

    /// Set the serial string.
    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }
}

impl fmt::Display for InputCandidate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.path.display(), self.name)?;
        if let (Some(vendor), Some(product)) = (self.vendor_id, self.product_id) {
            write!(f, " {vendor:04x}:{product:04x}")?;
        }
        if let Some(serial) = &self.serial {
            write!(f, " serial={serial}")?;
        }
        Ok(())
    }
}

/// Where the reader should acquire its key events from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceLocation {
    /// A specific per-device node.
    Path(PathBuf),

    /// A process-wide keyboard hook; no specific device is selected.
    GlobalHook,
}

impl fmt::Display for DeviceLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DeviceLocation::Path(path) => write!(f, "{}", path.display()),
            DeviceLocation::GlobalHook => write!(f, "global keyboard hook"),
        }
    }
}
