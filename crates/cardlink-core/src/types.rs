use crate::{Result, error::Error};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Parse a USB vendor/product id written in hex (`"0xFFFF"`, `"ffff"`).
///
/// Returns `None` for empty or unparseable input instead of failing, so a
/// malformed id in configuration behaves like an absent one.
///
/// # Examples
///
/// ```
/// use cardlink_core::parse_hex_id;
///
/// assert_eq!(parse_hex_id("0xFFFF"), Some(0xFFFF));
/// assert_eq!(parse_hex_id(" 0035 "), Some(0x0035));
/// assert_eq!(parse_hex_id("zz"), None);
/// assert_eq!(parse_hex_id(""), None);
/// ```
#[must_use]
pub fn parse_hex_id(text: &str) -> Option<u16> {
    let text = text.trim().to_ascii_lowercase();
    let digits = text.strip_prefix("0x").unwrap_or(&text);
    if digits.is_empty() {
        return None;
    }
    u16::from_str_radix(digits, 16).ok()
}

mod hex_id {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    pub fn serialize<S: Serializer>(value: &Option<u16>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(id) => serializer.serialize_str(&format!("0x{id:04x}")),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u16>, D::Error> {
        Ok(match Option::<Raw>::deserialize(deserializer)? {
            Some(Raw::Text(text)) => super::parse_hex_id(&text),
            Some(Raw::Number(n)) => u16::try_from(n).ok(),
            None => None,
        })
    }
}

/// Hardware identity of the card scanner assigned to this terminal.
///
/// Used only to pick one input device among all attached devices; it is
/// never used to decode card data. Supplied by configuration and replaced
/// wholesale whenever configuration is reloaded.
///
/// # Examples
///
/// ```
/// use cardlink_core::DeviceIdentity;
///
/// let identity = DeviceIdentity::new()
///     .with_vendor_id(0xFFFF)
///     .with_product_id(0x0035)
///     .with_serial_id("SYC-0042");
///
/// assert!(identity.is_specified());
/// assert_eq!(identity.serial(), Some("SYC-0042"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// USB vendor id.
    #[serde(default, with = "hex_id", skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<u16>,

    /// USB product id.
    #[serde(default, with = "hex_id", skip_serializing_if = "Option::is_none")]
    pub product_id: Option<u16>,

    /// Serial identifier as reported by the operating system.
    #[serde(
        default,
        rename = "device_serial_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub serial_id: Option<String>,

    /// Optional baud/rate hint.
    #[serde(default, rename = "baudrate", skip_serializing_if = "Option::is_none")]
    pub baud_rate: Option<u32>,
}

impl DeviceIdentity {
    /// Create an empty identity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the vendor id.
    pub fn with_vendor_id(mut self, vendor_id: u16) -> Self {
        self.vendor_id = Some(vendor_id);
        self
    }

    /// Set the product id.
    pub fn with_product_id(mut self, product_id: u16) -> Self {
        self.product_id = Some(product_id);
        self
    }

    /// Set the serial identifier.
    pub fn with_serial_id(mut self, serial_id: impl Into<String>) -> Self {
        self.serial_id = Some(serial_id.into());
        self
    }

    /// Set the baud/rate hint.
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = Some(baud_rate);
        self
    }

    /// The serial identifier, if present and not blank.
    #[must_use]
    pub fn serial(&self) -> Option<&str> {
        self.serial_id
            .as_deref()
            .map(str::trim)
            .filter(|serial| !serial.is_empty())
    }

    /// Returns `true` if at least one matching hint is present.
    ///
    /// An identity with no vendor, product or serial cannot select a device
    /// and is treated as "no device configured".
    #[must_use]
    pub fn is_specified(&self) -> bool {
        self.vendor_id.is_some() || self.product_id.is_some() || self.serial().is_some()
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let vendor = self
            .vendor_id
            .map_or_else(|| "-".to_string(), |id| format!("0x{id:04x}"));
        let product = self
            .product_id
            .map_or_else(|| "-".to_string(), |id| format!("0x{id:04x}"));
        write!(
            f,
            "VID={vendor} PID={product} serial={}",
            self.serial().unwrap_or("-")
        )
    }
}

/// Opaque, caller-supplied identifier of one scan request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScanId(String);

impl ScanId {
    /// Create a scan id.
    ///
    /// # Errors
    /// Returns `Error::InvalidScanId` if the id is empty or only whitespace.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::InvalidScanId("scan id must not be empty".to_string()));
        }
        Ok(ScanId(id))
    }

    /// Get the scan id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ScanId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        ScanId::new(value)
    }
}

impl From<ScanId> for String {
    fn from(id: ScanId) -> Self {
        id.0
    }
}

impl std::str::FromStr for ScanId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ScanId::new(s)
    }
}

/// Card identifier assembled from captured keystrokes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CardId(String);

impl CardId {
    /// Create a card id.
    ///
    /// # Errors
    /// Returns `Error::InvalidCardId` if the id is empty.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::InvalidCardId("card id must not be empty".to_string()));
        }
        Ok(CardId(id))
    }

    /// Get the card id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the card id and return the inner string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a scan as reported to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScanStatus {
    Success,
    Error,
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ScanStatus::Success => write!(f, "SUCCESS"),
            ScanStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// Outbound result of one scan request.
///
/// Wire shape:
///
/// ```json
/// { "scan_id": "s1", "status": "SUCCESS", "card_id": "42x", "error": "", "auth_token": "t" }
/// ```
///
/// `card_id` is empty on error and `error` is empty on success.
///
/// # Examples
///
/// ```
/// use cardlink_core::{CardId, ResultMessage, ScanId, ScanStatus};
///
/// let scan_id = ScanId::new("s1").unwrap();
/// let card_id = CardId::new("42x").unwrap();
/// let message = ResultMessage::success(scan_id, &card_id, "token");
///
/// assert_eq!(message.status, ScanStatus::Success);
/// assert_eq!(message.card_id, "42x");
/// assert!(message.error.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMessage {
    pub scan_id: ScanId,
    pub status: ScanStatus,
    pub card_id: String,
    pub error: String,
    pub auth_token: String,
}

impl ResultMessage {
    /// Result for a completed card read.
    pub fn success(scan_id: ScanId, card_id: &CardId, auth_token: impl Into<String>) -> Self {
        Self {
            scan_id,
            status: ScanStatus::Success,
            card_id: card_id.as_str().to_string(),
            error: String::new(),
            auth_token: auth_token.into(),
        }
    }

    /// Result for a failed scan.
    pub fn failure(
        scan_id: ScanId,
        error: impl Into<String>,
        auth_token: impl Into<String>,
    ) -> Self {
        Self {
            scan_id,
            status: ScanStatus::Error,
            card_id: String::new(),
            error: error.into(),
            auth_token: auth_token.into(),
        }
    }

    /// Returns `true` if this result reports a successful read.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ScanStatus::Success
    }

    /// Serialize to the JSON wire body.
    ///
    /// # Errors
    /// Returns `Error::Json` if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
