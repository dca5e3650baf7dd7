//! Inbound command envelope.
//!
//! The backend sends small JSON envelopes to the terminal queue. Only
//! `{"action": "scan", "scan_id": ...}` means anything; every other body
//! is acknowledged and dropped so a bad message can never loop.

use cardlink_core::ScanId;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Action name of a scan command.
pub const SCAN_ACTION: &str = "scan";

/// A request to read the next card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCommand {
    pub scan_id: ScanId,
}

/// Result of parsing one inbound body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Scan(ScanCommand),
    Ignored(IgnoreReason),
}

/// Why an inbound body was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Not a JSON object.
    Malformed(String),
    /// No `action` field.
    MissingAction,
    /// An action other than `scan`.
    UnknownAction(String),
    /// A scan command without a usable `scan_id`.
    MissingScanId,
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(reason) => write!(f, "malformed body: {reason}"),
            Self::MissingAction => write!(f, "missing action"),
            Self::UnknownAction(action) => write!(f, "unknown action '{action}'"),
            Self::MissingScanId => write!(f, "scan request missing scan_id"),
        }
    }
}

/// What to tell the broker about a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Handled, or deliberately dropped.
    Ack,
    /// The handler failed; drop without requeue.
    Nack,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    action: Option<Value>,
    #[serde(default)]
    scan_id: Option<Value>,
}

/// Parse an inbound body.
///
/// `scan_id` may be a JSON string or number. Blank strings count as missing.
///
/// # Examples
///
/// ```
/// use cardlink_queue::command::{parse_command, Command, IgnoreReason};
///
/// let Command::Scan(scan) = parse_command(br#"{"action":"scan","scan_id":"s1"}"#) else {
///     panic!("expected a scan command");
/// };
/// assert_eq!(scan.scan_id.as_str(), "s1");
///
/// assert_eq!(
///     parse_command(br#"{"foo":"bar"}"#),
///     Command::Ignored(IgnoreReason::MissingAction)
/// );
/// ```
pub fn parse_command(body: &[u8]) -> Command {
    let value: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => return Command::Ignored(IgnoreReason::Malformed(e.to_string())),
    };
    if !value.is_object() {
        return Command::Ignored(IgnoreReason::Malformed("not a JSON object".to_string()));
    }
    let envelope: Envelope = match serde_json::from_value(value) {
        Ok(envelope) => envelope,
        Err(e) => return Command::Ignored(IgnoreReason::Malformed(e.to_string())),
    };

    match envelope.action {
        Some(Value::String(action)) if action == SCAN_ACTION => {}
        Some(Value::String(action)) => return Command::Ignored(IgnoreReason::UnknownAction(action)),
        None | Some(Value::Null) => return Command::Ignored(IgnoreReason::MissingAction),
        Some(other) => return Command::Ignored(IgnoreReason::UnknownAction(other.to_string())),
    }

    let scan_id = match envelope.scan_id {
        Some(Value::String(id)) => ScanId::new(id).ok(),
        Some(Value::Number(id)) => ScanId::new(id.to_string()).ok(),
        _ => None,
    };

    match scan_id {
        Some(scan_id) => Command::Scan(ScanCommand { scan_id }),
        None => Command::Ignored(IgnoreReason::MissingScanId),
    }
}

/// Parse a delivery and forward scan commands to `commands`.
///
/// Ignored bodies are acknowledged. A scan command that cannot be handed
/// off is nacked.
pub async fn handle_delivery(body: &[u8], commands: &mpsc::Sender<ScanCommand>) -> Disposition {
    match parse_command(body) {
        Command::Scan(command) => {
            info!(scan_id = %command.scan_id, "Received scan request");
            let scan_id = command.scan_id.clone();
            match commands.send(command).await {
                Ok(()) => Disposition::Ack,
                Err(_) => {
                    error!(scan_id = %scan_id, "Scan command receiver closed");
                    Disposition::Nack
                }
            }
        }
        Command::Ignored(reason) => {
            warn!(%reason, "Dropping inbound message");
            Disposition::Ack
        }
    }
}
