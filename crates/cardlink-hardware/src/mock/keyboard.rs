//! Mock keyboard-wedge card reader for testing and development.
//!
//! [`MockKeyboard`] plays the role of the operating system: it enumerates a
//! fixed set of input devices and opens key sources on them. The paired
//! [`MockKeyboardHandle`] types keys into the open source, unplugs and
//! replugs the reader, and makes acquisition fail on demand.

use crate::{
    HardwareError, Result,
    key::{Key, KeyEvent},
    locator::DeviceEnumerator,
    source::KeySource,
    types::{DeviceLocation, InputCandidate},
};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;

/// Path of the mock card reader.
pub const MOCK_READER_PATH: &str = "/dev/input/mock-reader";

/// Vendor id reported by the mock card reader.
pub const MOCK_VENDOR_ID: u16 = 0xFFFF;

/// Product id reported by the mock card reader.
pub const MOCK_PRODUCT_ID: u16 = 0x0035;

/// Serial reported by the mock card reader.
pub const MOCK_SERIAL: &str = "MOCK-0001";

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug)]
struct MockState {
    candidates: Vec<InputCandidate>,
    plugged: bool,
    global_hook: bool,
    fail_opens: u32,
    open_count: u32,
    generation: u64,
    sender: Option<mpsc::Sender<KeyEvent>>,
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mock input backend.
///
/// Cloning shares the same simulated hardware.
///
/// # Examples
///
/// ```
/// use cardlink_hardware::mock::MockKeyboard;
/// use cardlink_hardware::{Key, KeySource};
///
/// #[tokio::main]
/// async fn main() -> cardlink_hardware::Result<()> {
///     let (keyboard, handle) = MockKeyboard::new();
///     let mut source = keyboard.open(&keyboard.reader_location())?;
///
///     handle.type_text("4").await?;
///
///     let event = source.next_event().await?;
///     assert_eq!(event.key, Key::Char('4'));
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MockKeyboard {
    state: Arc<Mutex<MockState>>,
}

impl MockKeyboard {
    /// Mock with one card reader and one ordinary keyboard attached.
    pub fn new() -> (Self, MockKeyboardHandle) {
        Self::with_candidates(vec![
            InputCandidate::new("/dev/input/mock-keyboard", "Mock Keyboard").with_ids(0x046D, 0xC31C),
            InputCandidate::new(MOCK_READER_PATH, "Mock Card Reader")
                .with_ids(MOCK_VENDOR_ID, MOCK_PRODUCT_ID)
                .with_serial(MOCK_SERIAL),
        ])
    }

    /// Mock with a custom set of attached devices.
    pub fn with_candidates(candidates: Vec<InputCandidate>) -> (Self, MockKeyboardHandle) {
        let state = Arc::new(Mutex::new(MockState {
            candidates,
            plugged: true,
            global_hook: false,
            fail_opens: 0,
            open_count: 0,
            generation: 0,
            sender: None,
        }));

        (
            Self {
                state: Arc::clone(&state),
            },
            MockKeyboardHandle { state },
        )
    }

    /// Mock emulating a global-hook platform: no device is located.
    pub fn global_hook() -> (Self, MockKeyboardHandle) {
        let (keyboard, handle) = Self::with_candidates(Vec::new());
        lock(&keyboard.state).global_hook = true;
        (keyboard, handle)
    }

    /// Returns `true` if this mock emulates a global-hook platform.
    pub fn is_global_hook(&self) -> bool {
        lock(&self.state).global_hook
    }

    /// Location of the mock card reader.
    pub fn reader_location(&self) -> DeviceLocation {
        if self.is_global_hook() {
            DeviceLocation::GlobalHook
        } else {
            DeviceLocation::Path(MOCK_READER_PATH.into())
        }
    }

    /// Acquire a key source at `location`.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::AcquisitionFailed` if the reader is unplugged
    /// or a failure was scheduled with
    /// [`MockKeyboardHandle::fail_next_opens`].
    pub fn open(&self, location: &DeviceLocation) -> Result<MockKeySource> {
        let mut state = lock(&self.state);
        let name = location.to_string();

        if !state.plugged {
            return Err(HardwareError::acquisition(name, "No such device"));
        }
        if state.fail_opens > 0 {
            state.fail_opens -= 1;
            return Err(HardwareError::acquisition(name, "Device or resource busy"));
        }

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        state.sender = Some(tx);
        state.open_count += 1;
        state.generation += 1;

        Ok(MockKeySource {
            rx,
            name,
            generation: state.generation,
            state: Arc::clone(&self.state),
        })
    }
}

impl DeviceEnumerator for MockKeyboard {
    fn enumerate(&self) -> Result<Vec<InputCandidate>> {
        let state = lock(&self.state);
        if state.plugged {
            Ok(state.candidates.clone())
        } else {
            Ok(Vec::new())
        }
    }
}

/// Key source opened on the mock keyboard.
#[derive(Debug)]
pub struct MockKeySource {
    rx: mpsc::Receiver<KeyEvent>,
    name: String,
    generation: u64,
    state: Arc<Mutex<MockState>>,
}

impl KeySource for MockKeySource {
    async fn next_event(&mut self) -> Result<KeyEvent> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| HardwareError::disconnected(self.name.clone()))
    }

    async fn release(&mut self) -> Result<()> {
        self.rx.close();
        let mut state = lock(&self.state);
        if state.generation == self.generation {
            state.sender = None;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// Handle for controlling a [`MockKeyboard`].
#[derive(Debug, Clone)]
pub struct MockKeyboardHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockKeyboardHandle {
    /// Deliver one raw event to the open source.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::Disconnected` if no source is open.
    pub async fn send(&self, event: KeyEvent) -> Result<()> {
        let tx = lock(&self.state)
            .sender
            .clone()
            .ok_or_else(|| HardwareError::disconnected("mock keyboard not open"))?;

        tx.send(event)
            .await
            .map_err(|_| HardwareError::disconnected("mock keyboard closed"))
    }

    /// Press and release one key.
    pub async fn press(&self, key: Key) -> Result<()> {
        self.send(KeyEvent::down(key)).await?;
        self.send(KeyEvent::up(key)).await
    }

    /// Type each character of `text` as a key press.
    ///
    /// `'\n'` types Enter. Use [`scan_card`](Self::scan_card) to type a card
    /// id followed by Enter.
    pub async fn type_text(&self, text: &str) -> Result<()> {
        for c in text.chars() {
            self.press(Key::from_char(c)).await?;
        }
        Ok(())
    }

    /// Type a card id terminated by Enter, the way a scanner does.
    pub async fn scan_card(&self, card: &str) -> Result<()> {
        self.type_text(card).await?;
        self.press(Key::Enter).await
    }

    /// Simulate pulling the reader's cable.
    ///
    /// The open source fails with a disconnection once its queued events
    /// are drained, and the reader disappears from enumeration.
    pub fn unplug(&self) {
        let mut state = lock(&self.state);
        state.plugged = false;
        state.sender = None;
    }

    /// Reconnect the reader.
    pub fn plug(&self) {
        lock(&self.state).plugged = true;
    }

    /// Make the next `count` acquisition attempts fail.
    pub fn fail_next_opens(&self, count: u32) {
        lock(&self.state).fail_opens = count;
    }

    /// Number of successful acquisitions so far.
    pub fn open_count(&self) -> u32 {
        lock(&self.state).open_count
    }

    /// Returns `true` if a source is currently open.
    pub fn is_open(&self) -> bool {
        lock(&self.state)
            .sender
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Wait until a source is open.
    pub async fn wait_until_open(&self) {
        while !self.is_open() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Wait until the open source has consumed every sent event.
    pub async fn settle(&self) {
        loop {
            let drained = match &lock(&self.state).sender {
                Some(tx) => tx.capacity() == tx.max_capacity() || tx.is_closed(),
                None => true,
            };
            if drained {
                break;
            }
            tokio::task::yield_now().await;
        }
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyState;

    #[tokio::test]
    async fn test_type_text_delivers_down_and_up() {
        let (keyboard, handle) = MockKeyboard::new();
        let mut source = keyboard.open(&keyboard.reader_location()).unwrap();

        handle.type_text("A").await.unwrap();

        let down = source.next_event().await.unwrap();
        let up = source.next_event().await.unwrap();
        assert_eq!(down, KeyEvent::new(Key::Char('a'), KeyState::Down));
        assert_eq!(up, KeyEvent::new(Key::Char('a'), KeyState::Up));
    }

    #[tokio::test]
    async fn test_unplug_disconnects_open_source() {
        let (keyboard, handle) = MockKeyboard::new();
        let mut source = keyboard.open(&keyboard.reader_location()).unwrap();

        handle.unplug();

        let result = source.next_event().await;
        assert!(matches!(result, Err(HardwareError::Disconnected { .. })));
        assert!(keyboard.enumerate().unwrap().is_empty());
        assert!(keyboard.open(&keyboard.reader_location()).is_err());

        handle.plug();
        assert!(keyboard.open(&keyboard.reader_location()).is_ok());
    }

    #[tokio::test]
    async fn test_scheduled_open_failures() {
        let (keyboard, handle) = MockKeyboard::new();
        handle.fail_next_opens(2);

        let location = keyboard.reader_location();
        assert!(keyboard.open(&location).is_err());
        assert!(keyboard.open(&location).is_err());
        assert!(keyboard.open(&location).is_ok());
        assert_eq!(handle.open_count(), 1);
    }

    #[tokio::test]
    async fn test_send_without_open_source_fails() {
        let (_keyboard, handle) = MockKeyboard::new();
        assert!(handle.press(Key::Enter).await.is_err());
    }

    #[tokio::test]
    async fn test_release_closes_source() {
        let (keyboard, handle) = MockKeyboard::new();
        let mut source = keyboard.open(&keyboard.reader_location()).unwrap();
        assert!(handle.is_open());

        source.release().await.unwrap();
        assert!(!handle.is_open());

        // Releasing twice is fine
        source.release().await.unwrap();
    }

    #[test]
    fn test_global_hook_location() {
        let (keyboard, _handle) = MockKeyboard::global_hook();
        assert!(keyboard.is_global_hook());
        assert_eq!(keyboard.reader_location(), DeviceLocation::GlobalHook);
    }
}
