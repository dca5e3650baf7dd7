//! Status callbacks for whatever presents the agent to a person.
//!
//! The desktop UI lives outside this workspace. It plugs in by
//! implementing [`AgentObserver`]; every method has a no-op default so an
//! observer only overrides what it shows. The binary uses [`LogObserver`].
//!
//! Device, broker and backend connectivity are reported separately and
//! never folded into one flag.

use crate::probe::BackendStatus;
use cardlink_core::{CardId, ScanId};
use cardlink_hardware::ReaderStatus;
use cardlink_queue::BrokerStatus;
use tracing::{info, warn};

/// Receives agent events. Called from agent tasks; must not block.
pub trait AgentObserver: Send + Sync {
    /// Reader connectivity changed.
    fn on_reader_status(&self, status: &ReaderStatus) {
        let _ = status;
    }

    /// Broker connectivity changed.
    fn on_broker_status(&self, status: &BrokerStatus) {
        let _ = status;
    }

    /// Backend reachability changed.
    fn on_backend_status(&self, status: &BackendStatus) {
        let _ = status;
    }

    /// A scan command arrived; the reader now waits for a card.
    fn on_scan_requested(&self, scan_id: &ScanId) {
        let _ = scan_id;
    }

    /// A card was read for `scan_id`.
    fn on_scan_completed(&self, scan_id: &ScanId, card_id: &CardId) {
        let _ = (scan_id, card_id);
    }

    /// Something along the scan chain failed.
    fn on_scan_error(&self, message: &str) {
        let _ = message;
    }
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl AgentObserver for NoopObserver {}

/// Observer that writes every event to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl AgentObserver for LogObserver {
    fn on_reader_status(&self, status: &ReaderStatus) {
        info!(connected = status.connected(), state = %status.state, "Reader: {}", status.message);
    }

    fn on_broker_status(&self, status: &BrokerStatus) {
        info!(connected = status.connected, "Broker: {}", status.message);
    }

    fn on_backend_status(&self, status: &BackendStatus) {
        info!(reachable = status.reachable, "Backend: {}", status.message);
    }

    fn on_scan_requested(&self, scan_id: &ScanId) {
        info!(%scan_id, "Present card");
    }

    fn on_scan_completed(&self, scan_id: &ScanId, card_id: &CardId) {
        info!(%scan_id, %card_id, "Card read");
    }

    fn on_scan_error(&self, message: &str) {
        warn!("Scan error: {message}");
    }
}
