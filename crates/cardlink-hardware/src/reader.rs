//! Card reader: connection lifecycle, capture loop and scan gating.
//!
//! A [`CardReader`] owns one background capture loop. The loop keeps the
//! scanner acquired (searching, connecting and reconnecting with a linear
//! backoff), pulls key events from it, and turns them into card ids, but
//! only while a scan request is waiting. Keystrokes that arrive with no
//! request waiting are read and thrown away, so ordinary typing is never
//! mistaken for a card.
//!
//! Other tasks talk to the loop through a cloneable [`ReaderHandle`]:
//!
//! - [`request_scan`](ReaderHandle::request_scan) replaces any waiting
//!   request; the superseded request never fires.
//! - [`cancel_scan`](ReaderHandle::cancel_scan) drops the waiting request
//!   without firing it.
//! - [`subscribe`](ReaderHandle::subscribe) observes [`ReaderStatus`].
//!
//! # Scan Gating
//!
//! The waiting request sits in a single mutex-guarded slot that is never
//! held across an await. Every `request_scan`/`cancel_scan` bumps a reset
//! epoch; the loop compares it against the epoch its buffer was started
//! under before each key press, and clears the buffer when they differ.
//! A card completes only the request registered under the buffer's epoch,
//! and the slot is emptied before the callback runs, so each request's
//! callback fires at most once.
//!
//! # Examples
//!
//! ```no_run
//! use cardlink_core::{DeviceIdentity, ScanId};
//! use cardlink_hardware::mock::MockKeyboard;
//! use cardlink_hardware::{CardReader, InputBackend, ReaderConfig};
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (keyboard, handle) = MockKeyboard::new();
//!     let identity = DeviceIdentity::new().with_vendor_id(0xFFFF);
//!     let (_identity_tx, identity_rx) = watch::channel(Some(identity));
//!
//!     let mut reader = CardReader::new(
//!         InputBackend::Mock(keyboard),
//!         identity_rx,
//!         ReaderConfig::default(),
//!     );
//!     reader.start();
//!
//!     reader.handle().request_scan(ScanId::new("s1").unwrap(), |scan_id, card_id| {
//!         println!("{scan_id}: {card_id}");
//!     });
//!
//!     handle.wait_until_open().await;
//!     handle.scan_card("42x").await.unwrap();
//!
//!     reader.stop().await;
//! }
//! ```

use crate::{
    HardwareError,
    backend::InputBackend,
    key::{Key, KeyEvent},
    source::{AnyKeySource, KeySource},
    state::{ConnectionState, ReaderStatus},
};
use cardlink_core::constants::{
    CONFIG_POLL_INTERVAL_MS, CONNECT_ATTEMPT_INTERVAL_MS, CONNECT_ATTEMPTS, FAULT_PAUSE_MS,
    READER_STOP_TIMEOUT_MS,
};
use cardlink_core::{Backoff, CardId, DeviceIdentity, ScanId};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Timing of the reader's connection state machine.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Acquisition attempts per connect.
    pub connect_attempts: u32,

    /// Pause between acquisition attempts.
    pub attempt_interval: Duration,

    /// Delay between failed connects.
    pub backoff: Backoff,

    /// How often an unconfigured reader re-checks its identity.
    pub config_poll_interval: Duration,

    /// Pause after a device fault before searching again.
    pub fault_pause: Duration,

    /// Bound on joining the capture loop in [`CardReader::stop`].
    pub stop_timeout: Duration,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            connect_attempts: CONNECT_ATTEMPTS,
            attempt_interval: Duration::from_millis(CONNECT_ATTEMPT_INTERVAL_MS),
            backoff: Backoff::default(),
            config_poll_interval: Duration::from_millis(CONFIG_POLL_INTERVAL_MS),
            fault_pause: Duration::from_millis(FAULT_PAUSE_MS),
            stop_timeout: Duration::from_millis(READER_STOP_TIMEOUT_MS),
        }
    }
}

/// Completion callback of a scan request.
pub type ScanCallback = Box<dyn FnOnce(ScanId, CardId) + Send + 'static>;

/// A caller's demand for the next card read.
pub struct ScanRequest {
    scan_id: ScanId,
    issued_at: DateTime<Utc>,
    callback: ScanCallback,
}

impl ScanRequest {
    /// Create a request issued now.
    pub fn new(scan_id: ScanId, callback: impl FnOnce(ScanId, CardId) + Send + 'static) -> Self {
        Self {
            scan_id,
            issued_at: Utc::now(),
            callback: Box::new(callback),
        }
    }

    /// Id supplied by the caller.
    pub fn scan_id(&self) -> &ScanId {
        &self.scan_id
    }

    /// When the request was registered.
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    fn complete(self, card_id: CardId) {
        (self.callback)(self.scan_id, card_id);
    }
}

impl fmt::Debug for ScanRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanRequest")
            .field("scan_id", &self.scan_id)
            .field("issued_at", &self.issued_at)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct Pending {
    epoch: u64,
    request: ScanRequest,
}

/// The single waiting-request slot plus the buffer reset epoch.
#[derive(Debug, Default)]
struct ScanSlot {
    pending: Mutex<Option<Pending>>,
    epoch: AtomicU64,
}

impl ScanSlot {
    fn lock(&self) -> MutexGuard<'_, Option<Pending>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register `request`, returning the id of the request it replaced.
    fn replace(&self, request: ScanRequest) -> Option<ScanId> {
        let mut pending = self.lock();
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        pending
            .replace(Pending { epoch, request })
            .map(|previous| previous.request.scan_id)
    }

    /// Drop the waiting request, if any.
    fn clear(&self) -> Option<ScanId> {
        let mut pending = self.lock();
        self.epoch.fetch_add(1, Ordering::AcqRel);
        pending.take().map(|previous| previous.request.scan_id)
    }

    /// Drop the waiting request only if it is `scan_id`.
    fn clear_if(&self, scan_id: &ScanId) -> bool {
        let mut pending = self.lock();
        if pending.as_ref().is_some_and(|p| &p.request.scan_id == scan_id) {
            self.epoch.fetch_add(1, Ordering::AcqRel);
            pending.take();
            true
        } else {
            false
        }
    }

    /// Take the waiting request if it was registered under `epoch`.
    fn take_if_epoch(&self, epoch: u64) -> Option<ScanRequest> {
        let mut pending = self.lock();
        if pending.as_ref().is_some_and(|p| p.epoch == epoch) {
            pending.take().map(|p| p.request)
        } else {
            None
        }
    }

    fn is_waiting(&self) -> bool {
        self.lock().is_some()
    }

    fn waiting_scan_id(&self) -> Option<ScanId> {
        self.lock().as_ref().map(|p| p.request.scan_id.clone())
    }

    fn reset_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }
}

/// Characters captured for the card being typed.
#[derive(Debug, Default)]
struct CardBuffer {
    chars: String,
    epoch: u64,
}

impl CardBuffer {
    /// Clear the buffer if a reset was signalled since it was started.
    fn sync(&mut self, epoch: u64) {
        if self.epoch != epoch {
            if !self.chars.is_empty() {
                trace!(discarded = self.chars.len(), "Buffer reset");
            }
            self.chars.clear();
            self.epoch = epoch;
        }
    }

    fn clear(&mut self) {
        self.chars.clear();
    }
}

/// Turns key presses into card ids while a request is waiting.
#[derive(Debug)]
struct ScanGate {
    slot: Arc<ScanSlot>,
    buffer: CardBuffer,
}

impl ScanGate {
    fn new(slot: Arc<ScanSlot>) -> Self {
        Self {
            slot,
            buffer: CardBuffer::default(),
        }
    }

    fn handle(&mut self, event: KeyEvent) {
        if !event.is_press() {
            return;
        }

        self.buffer.sync(self.slot.reset_epoch());

        if !self.slot.is_waiting() {
            trace!("Discarding keystroke, no scan waiting");
            return;
        }

        match event.key {
            Key::Enter => {
                if self.buffer.chars.is_empty() {
                    return;
                }
                let card = std::mem::take(&mut self.buffer.chars);
                self.complete(card);
            }
            key => match key.as_char() {
                Some(c) => self.buffer.chars.push(c),
                None => trace!(%key, "Ignoring non-alphanumeric key"),
            },
        }
    }

    fn complete(&mut self, card: String) {
        let Ok(card_id) = CardId::new(card) else {
            return;
        };

        match self.slot.take_if_epoch(self.buffer.epoch) {
            Some(request) => {
                info!(scan_id = %request.scan_id(), card_id = %card_id, "Card read");
                request.complete(card_id);
            }
            None => debug!("Scan request changed during read, discarding card"),
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
    }
}

/// Cloneable handle to a [`CardReader`].
#[derive(Debug, Clone)]
pub struct ReaderHandle {
    slot: Arc<ScanSlot>,
    status: watch::Receiver<ReaderStatus>,
}

impl ReaderHandle {
    /// Wait for the next card on behalf of `scan_id`.
    ///
    /// Replaces any waiting request; the replaced request's callback never
    /// runs. Characters typed before this call are discarded.
    pub fn request_scan(
        &self,
        scan_id: ScanId,
        callback: impl FnOnce(ScanId, CardId) + Send + 'static,
    ) {
        let request = ScanRequest::new(scan_id, callback);
        let scan_id = request.scan_id().clone();

        match self.slot.replace(request) {
            Some(previous) => info!(%scan_id, superseded = %previous, "Scan requested"),
            None => info!(%scan_id, "Scan requested"),
        }
    }

    /// Drop the waiting request without running its callback.
    pub fn cancel_scan(&self) {
        if let Some(scan_id) = self.slot.clear() {
            info!(%scan_id, "Scan cancelled");
        }
    }

    /// Drop the waiting request only if it is still `scan_id`.
    ///
    /// Returns `true` if the request was dropped.
    pub fn cancel_scan_if(&self, scan_id: &ScanId) -> bool {
        let cancelled = self.slot.clear_if(scan_id);
        if cancelled {
            info!(%scan_id, "Scan cancelled");
        }
        cancelled
    }

    /// Returns `true` while a request is waiting.
    pub fn is_waiting(&self) -> bool {
        self.slot.is_waiting()
    }

    /// Id of the waiting request, if any.
    pub fn waiting_scan_id(&self) -> Option<ScanId> {
        self.slot.waiting_scan_id()
    }

    /// Latest reader status.
    pub fn status(&self) -> ReaderStatus {
        self.status.borrow().clone()
    }

    /// Observe status changes.
    pub fn subscribe(&self) -> watch::Receiver<ReaderStatus> {
        self.status.clone()
    }
}

/// Card reader service.
///
/// Owns the capture loop task. The device handle lives inside that task
/// and is never shared.
#[derive(Debug)]
pub struct CardReader {
    backend: InputBackend,
    identity: watch::Receiver<Option<DeviceIdentity>>,
    config: ReaderConfig,
    slot: Arc<ScanSlot>,
    status: Arc<watch::Sender<ReaderStatus>>,
    status_rx: watch::Receiver<ReaderStatus>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl CardReader {
    /// Create a reader.
    ///
    /// `identity` carries the configured device identity; `None` (or an
    /// identity without hints) parks the reader in
    /// [`ConnectionState::NoDeviceConfigured`].
    pub fn new(
        backend: InputBackend,
        identity: watch::Receiver<Option<DeviceIdentity>>,
        config: ReaderConfig,
    ) -> Self {
        let (status, status_rx) = watch::channel(ReaderStatus::default());
        Self {
            backend,
            identity,
            config,
            slot: Arc::new(ScanSlot::default()),
            status: Arc::new(status),
            status_rx,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// Handle for requesting scans and observing status.
    pub fn handle(&self) -> ReaderHandle {
        ReaderHandle {
            slot: Arc::clone(&self.slot),
            status: self.status_rx.clone(),
        }
    }

    /// Returns `true` while the capture loop is running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Spawn the capture loop. Does nothing if it is already running.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }

        let capture = CaptureLoop::new(
            self.backend.clone(),
            self.identity.clone(),
            self.config.clone(),
            Arc::clone(&self.slot),
            Arc::clone(&self.status),
            self.cancel.clone(),
        );
        self.task = Some(tokio::spawn(capture.run()));
        info!(backend = %self.backend, "Card reader started");
    }

    /// Stop the capture loop and release the device.
    ///
    /// Waits up to `stop_timeout` for the loop to finish, then aborts it.
    pub async fn stop(&mut self) {
        self.cancel.cancel();

        let Some(mut task) = self.task.take() else {
            return;
        };

        match tokio::time::timeout(self.config.stop_timeout, &mut task).await {
            Ok(Ok(())) => info!("Card reader stopped"),
            Ok(Err(e)) => warn!(error = %e, "Card reader task failed"),
            Err(_) => {
                warn!(
                    timeout_ms = self.config.stop_timeout.as_millis() as u64,
                    "Card reader did not stop in time, aborting"
                );
                task.abort();
            }
        }
    }
}

impl Drop for CardReader {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Why capture ended.
#[derive(Debug)]
enum CaptureEnd {
    Cancelled,
    IdentityChanged,
    Fault(HardwareError),
}

/// Resolves when the identity changes; never resolves once the sender is gone.
async fn identity_changed(identity: &mut watch::Receiver<Option<DeviceIdentity>>) {
    if identity.changed().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// The capture loop and the connection state machine it drives.
struct CaptureLoop {
    backend: InputBackend,
    identity: watch::Receiver<Option<DeviceIdentity>>,
    config: ReaderConfig,
    status: Arc<watch::Sender<ReaderStatus>>,
    cancel: CancellationToken,
    gate: ScanGate,
    source: Option<AnyKeySource>,
    connected_identity: Option<DeviceIdentity>,
}

impl CaptureLoop {
    fn new(
        backend: InputBackend,
        identity: watch::Receiver<Option<DeviceIdentity>>,
        config: ReaderConfig,
        slot: Arc<ScanSlot>,
        status: Arc<watch::Sender<ReaderStatus>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            backend,
            identity,
            config,
            status,
            cancel,
            gate: ScanGate::new(slot),
            source: None,
            connected_identity: None,
        }
    }

    fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    /// Move to `to`, publishing the status if it changed.
    ///
    /// Invalid transitions are logged and ignored.
    fn transition(&self, to: ConnectionState, message: impl Into<String>) {
        let message = message.into();
        let from = self.state();

        if from != to && !from.can_transition_to(&to) {
            warn!(%from, %to, "Ignoring invalid reader state transition");
            return;
        }

        let changed = self.status.send_if_modified(|status| {
            if status.state == to && status.message == message {
                return false;
            }
            status.state = to;
            status.message = message.clone();
            true
        });

        if changed && from != to {
            info!(%from, %to, %message, "Reader state changed");
        }
    }

    /// Resolve the device for `identity` and acquire it.
    ///
    /// Makes up to `connect_attempts` acquisition attempts,
    /// `attempt_interval` apart. Returns `true` once the device is held.
    async fn connect(&mut self, identity: &DeviceIdentity) -> bool {
        self.transition(ConnectionState::Searching, "Searching for card reader");

        let location = match self.backend.locate(identity) {
            Ok(location) => location,
            Err(e) => {
                warn!(%identity, error = %e, "Card reader not found");
                self.transition(ConnectionState::Disconnected, "Device not found");
                return false;
            }
        };

        self.transition(
            ConnectionState::Connecting,
            format!("Connecting to {location}"),
        );

        let attempts = self.config.connect_attempts.max(1);
        for attempt in 1..=attempts {
            match self.backend.open(&location).await {
                Ok(source) => {
                    info!(device = %source.describe(), attempt, "Card reader connected");
                    self.source = Some(source);
                    self.connected_identity = Some(identity.clone());
                    self.transition(ConnectionState::Connected, "Card reader connected");
                    return true;
                }
                Err(e) => {
                    warn!(%location, attempt, attempts, error = %e, "Failed to acquire card reader");
                    if attempt < attempts && !self.pause(self.config.attempt_interval).await {
                        break;
                    }
                }
            }
        }

        self.transition(
            ConnectionState::Disconnected,
            "Failed to connect to card reader",
        );
        false
    }

    /// Release the device and clear the buffer. Safe when not connected.
    async fn disconnect(&mut self, reason: &str) {
        if let Some(mut source) = self.source.take() {
            if let Err(e) = source.release().await {
                warn!(device = %source.describe(), error = %e, "Failed to release card reader");
            }
            debug!(device = %source.describe(), %reason, "Card reader released");
        }
        self.connected_identity = None;
        self.gate.reset();

        if self.state() != ConnectionState::NoDeviceConfigured {
            self.transition(ConnectionState::Disconnected, reason);
        }
    }

    /// Sleep for `delay` unless cancelled. Returns `false` on cancellation.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Sleep for `delay`, waking early on cancellation or identity change.
    async fn wait(&mut self, delay: Duration) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
            _ = identity_changed(&mut self.identity) => {
                debug!("Device identity changed");
            }
        }
    }

    /// Pull events until cancellation, a device fault or an identity change.
    async fn capture(&mut self) -> CaptureEnd {
        loop {
            let Some(source) = self.source.as_mut() else {
                return CaptureEnd::Fault(HardwareError::disconnected("no device held"));
            };

            tokio::select! {
                _ = self.cancel.cancelled() => return CaptureEnd::Cancelled,
                _ = identity_changed(&mut self.identity) => {
                    let current = self.identity.borrow().clone();
                    if current != self.connected_identity {
                        return CaptureEnd::IdentityChanged;
                    }
                }
                event = source.next_event() => match event {
                    Ok(event) => self.gate.handle(event),
                    Err(e) if e.is_device_fault() => return CaptureEnd::Fault(e),
                    Err(e) => {
                        warn!(error = %e, "Error reading card reader");
                        self.gate.reset();
                        if !self.pause(self.config.fault_pause).await {
                            return CaptureEnd::Cancelled;
                        }
                    }
                },
            }
        }
    }

    async fn run(mut self) {
        debug!("Card reader loop started");
        let mut backoff = self.config.backoff.clone();

        while !self.cancel.is_cancelled() {
            let identity = self
                .identity
                .borrow_and_update()
                .clone()
                .filter(DeviceIdentity::is_specified);

            let Some(identity) = identity else {
                self.transition(ConnectionState::NoDeviceConfigured, "No device configured");
                self.wait(self.config.config_poll_interval).await;
                continue;
            };

            if !self.connect(&identity).await {
                if self.cancel.is_cancelled() {
                    break;
                }
                let delay = backoff.next_delay();
                debug!(delay_ms = delay.as_millis() as u64, "Retrying card reader connection");
                self.wait(delay).await;
                continue;
            }

            backoff.reset();

            match self.capture().await {
                CaptureEnd::Cancelled => break,
                CaptureEnd::IdentityChanged => {
                    info!("Device configuration changed, reconnecting");
                    self.disconnect("Device configuration changed").await;
                }
                CaptureEnd::Fault(e) => {
                    warn!(error = %e, "Card reader disconnected");
                    self.disconnect("Device disconnected, waiting to reconnect")
                        .await;
                    self.pause(self.config.fault_pause).await;
                }
            }
        }

        self.disconnect("Reader stopped").await;
        debug!("Card reader loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn gate() -> (ScanGate, ReaderHandle) {
        let slot = Arc::new(ScanSlot::default());
        let (_tx, status) = watch::channel(ReaderStatus::default());
        let handle = ReaderHandle {
            slot: Arc::clone(&slot),
            status,
        };
        (ScanGate::new(slot), handle)
    }

    fn type_keys(gate: &mut ScanGate, text: &str) {
        for c in text.chars() {
            gate.handle(KeyEvent::down(Key::from_char(c)));
            gate.handle(KeyEvent::up(Key::from_char(c)));
        }
    }

    fn scan_id(id: &str) -> ScanId {
        ScanId::new(id).unwrap()
    }

    fn recorder() -> (
        mpsc::Sender<(ScanId, CardId)>,
        mpsc::Receiver<(ScanId, CardId)>,
    ) {
        mpsc::channel()
    }

    #[test]
    fn test_completes_waiting_request() {
        let (mut gate, handle) = gate();
        let (tx, rx) = recorder();

        handle.request_scan(scan_id("s1"), move |id, card| {
            tx.send((id, card)).unwrap();
        });
        type_keys(&mut gate, "42X\n");

        let (id, card) = rx.try_recv().unwrap();
        assert_eq!(id.as_str(), "s1");
        assert_eq!(card.as_str(), "42x");
        assert!(!handle.is_waiting());
    }

    #[test]
    fn test_keys_without_request_are_discarded() {
        let (mut gate, handle) = gate();
        let (tx, rx) = recorder();

        type_keys(&mut gate, "password");

        handle.request_scan(scan_id("s1"), move |id, card| {
            tx.send((id, card)).unwrap();
        });
        type_keys(&mut gate, "77\n");

        assert_eq!(rx.try_recv().unwrap().1.as_str(), "77");
    }

    #[test]
    fn test_request_discards_partial_buffer() {
        let (mut gate, handle) = gate();
        let (tx, rx) = recorder();

        handle.request_scan(scan_id("s1"), |_, _| {});
        type_keys(&mut gate, "stale");

        let tx2 = tx.clone();
        handle.request_scan(scan_id("s2"), move |id, card| {
            tx2.send((id, card)).unwrap();
        });
        type_keys(&mut gate, "abc\n");

        let (id, card) = rx.try_recv().unwrap();
        assert_eq!(id.as_str(), "s2");
        assert_eq!(card.as_str(), "abc");
        drop(tx);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_superseded_request_never_fires() {
        let (mut gate, handle) = gate();
        let (tx, rx) = recorder();

        let tx1 = tx.clone();
        handle.request_scan(scan_id("s1"), move |id, card| {
            tx1.send((id, card)).unwrap();
        });
        handle.request_scan(scan_id("s2"), move |id, card| {
            tx.send((id, card)).unwrap();
        });

        type_keys(&mut gate, "1\n");
        type_keys(&mut gate, "2\n");

        let results: Vec<_> = rx.try_iter().collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.as_str(), "s2");
        assert_eq!(results[0].1.as_str(), "1");
    }

    #[test]
    fn test_cancel_drops_request_and_buffer() {
        let (mut gate, handle) = gate();
        let (tx, rx) = recorder();

        handle.request_scan(scan_id("s1"), move |id, card| {
            tx.send((id, card)).unwrap();
        });
        type_keys(&mut gate, "12");
        handle.cancel_scan();
        type_keys(&mut gate, "3\n");

        assert!(rx.try_recv().is_err());
        assert!(!handle.is_waiting());
    }

    #[test]
    fn test_cancel_if_only_matches_waiting_id() {
        let (_gate, handle) = gate();
        handle.request_scan(scan_id("s2"), |_, _| {});

        assert!(!handle.cancel_scan_if(&scan_id("s1")));
        assert_eq!(handle.waiting_scan_id(), Some(scan_id("s2")));

        assert!(handle.cancel_scan_if(&scan_id("s2")));
        assert_eq!(handle.waiting_scan_id(), None);
    }

    #[test]
    fn test_enter_with_empty_buffer_completes_nothing() {
        let (mut gate, handle) = gate();
        let (tx, rx) = recorder();

        handle.request_scan(scan_id("s1"), move |id, card| {
            tx.send((id, card)).unwrap();
        });
        type_keys(&mut gate, "\n");

        assert!(rx.try_recv().is_err());
        assert!(handle.is_waiting());
    }

    #[test]
    fn test_repeat_and_up_events_are_ignored() {
        let (mut gate, handle) = gate();
        let (tx, rx) = recorder();

        handle.request_scan(scan_id("s1"), move |id, card| {
            tx.send((id, card)).unwrap();
        });
        gate.handle(KeyEvent::down(Key::Char('9')));
        gate.handle(KeyEvent::new(Key::Char('9'), crate::KeyState::Repeat));
        gate.handle(KeyEvent::up(Key::Char('9')));
        gate.handle(KeyEvent::down(Key::Other(42)));
        gate.handle(KeyEvent::down(Key::Enter));

        assert_eq!(rx.try_recv().unwrap().1.as_str(), "9");
    }

    #[test]
    fn test_scan_request_debug_omits_callback() {
        let request = ScanRequest::new(scan_id("s1"), |_, _| {});
        let debug = format!("{request:?}");
        assert!(debug.contains("s1"));
        assert!(debug.contains(".."));
    }

    #[test]
    fn test_default_config_matches_constants() {
        let config = ReaderConfig::default();
        assert_eq!(config.connect_attempts, 5);
        assert_eq!(config.attempt_interval, Duration::from_secs(1));
        assert_eq!(config.config_poll_interval, Duration::from_secs(5));
        assert_eq!(config.backoff.current(), Duration::from_secs(1));
    }
}
