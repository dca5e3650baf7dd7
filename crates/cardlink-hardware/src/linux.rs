//! Linux input backend over evdev.
//!
//! The scanner shows up as an ordinary keyboard under `/dev/input`. It is
//! located by the vendor/product ids and the unique name the kernel
//! reports, then grabbed with `EVIOCGRAB` so its keystrokes are no longer
//! delivered to the desktop.

use crate::{
    HardwareError, Result,
    key::{Key, KeyEvent, KeyState},
    locator::DeviceEnumerator,
    source::KeySource,
    types::InputCandidate,
};
use evdev::{Device, EventStream, InputEventKind};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Enumerates `/dev/input/event*` devices.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvdevEnumerator;

impl DeviceEnumerator for EvdevEnumerator {
    fn enumerate(&self) -> Result<Vec<InputCandidate>> {
        let candidates = evdev::enumerate()
            .map(|(path, device)| {
                let id = device.input_id();
                InputCandidate {
                    path,
                    name: device.name().unwrap_or("unnamed").to_string(),
                    vendor_id: Some(id.vendor()),
                    product_id: Some(id.product()),
                    serial: device.unique_name().map(str::to_string),
                }
            })
            .collect();
        Ok(candidates)
    }
}

/// Grabbed evdev device.
pub struct EvdevSource {
    path: PathBuf,
    stream: Option<EventStream>,
}

impl std::fmt::Debug for EvdevSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvdevSource")
            .field("path", &self.path)
            .field("grabbed", &self.stream.is_some())
            .finish()
    }
}

impl EvdevSource {
    /// Open and exclusively grab the device at `path`.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::AcquisitionFailed` if the node cannot be
    /// opened (missing, permissions) or is already grabbed elsewhere.
    pub fn open(path: &Path) -> Result<Self> {
        let node = path.display().to_string();

        let mut device =
            Device::open(path).map_err(|e| HardwareError::acquisition(&node, e.to_string()))?;
        device
            .grab()
            .map_err(|e| HardwareError::acquisition(&node, e.to_string()))?;
        let stream = device
            .into_event_stream()
            .map_err(|e| HardwareError::acquisition(&node, e.to_string()))?;

        debug!(path = %node, "Grabbed input device");
        Ok(Self {
            path: path.to_path_buf(),
            stream: Some(stream),
        })
    }
}

impl KeySource for EvdevSource {
    async fn next_event(&mut self) -> Result<KeyEvent> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| HardwareError::disconnected(self.path.display().to_string()))?;

        loop {
            let event = stream.next_event().await?;
            let InputEventKind::Key(code) = event.kind() else {
                continue;
            };

            let state = match event.value() {
                0 => KeyState::Up,
                1 => KeyState::Down,
                2 => KeyState::Repeat,
                other => {
                    trace!(value = other, "Ignoring unknown key value");
                    continue;
                }
            };

            return Ok(KeyEvent::new(translate(code), state));
        }
    }

    async fn release(&mut self) -> Result<()> {
        // Closing the descriptor drops the grab.
        if self.stream.take().is_some() {
            debug!(path = %self.path.display(), "Released input device");
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

static KEY_MAP: &[(evdev::Key, char)] = &[
    (evdev::Key::KEY_0, '0'),
    (evdev::Key::KEY_1, '1'),
    (evdev::Key::KEY_2, '2'),
    (evdev::Key::KEY_3, '3'),
    (evdev::Key::KEY_4, '4'),
    (evdev::Key::KEY_5, '5'),
    (evdev::Key::KEY_6, '6'),
    (evdev::Key::KEY_7, '7'),
    (evdev::Key::KEY_8, '8'),
    (evdev::Key::KEY_9, '9'),
    (evdev::Key::KEY_A, 'a'),
    (evdev::Key::KEY_B, 'b'),
    (evdev::Key::KEY_C, 'c'),
    (evdev::Key::KEY_D, 'd'),
    (evdev::Key::KEY_E, 'e'),
    (evdev::Key::KEY_F, 'f'),
    (evdev::Key::KEY_G, 'g'),
    (evdev::Key::KEY_H, 'h'),
    (evdev::Key::KEY_I, 'i'),
    (evdev::Key::KEY_J, 'j'),
    (evdev::Key::KEY_K, 'k'),
    (evdev::Key::KEY_L, 'l'),
    (evdev::Key::KEY_M, 'm'),
    (evdev::Key::KEY_N, 'n'),
    (evdev::Key::KEY_O, 'o'),
    (evdev::Key::KEY_P, 'p'),
    (evdev::Key::KEY_Q, 'q'),
    (evdev::Key::KEY_R, 'r'),
    (evdev::Key::KEY_S, 's'),
    (evdev::Key::KEY_T, 't'),
    (evdev::Key::KEY_U, 'u'),
    (evdev::Key::KEY_V, 'v'),
    (evdev::Key::KEY_W, 'w'),
    (evdev::Key::KEY_X, 'x'),
    (evdev::Key::KEY_Y, 'y'),
    (evdev::Key::KEY_Z, 'z'),
    (evdev::Key::KEY_KP0, '0'),
    (evdev::Key::KEY_KP1, '1'),
    (evdev::Key::KEY_KP2, '2'),
    (evdev::Key::KEY_KP3, '3'),
    (evdev::Key::KEY_KP4, '4'),
    (evdev::Key::KEY_KP5, '5'),
    (evdev::Key::KEY_KP6, '6'),
    (evdev::Key::KEY_KP7, '7'),
    (evdev::Key::KEY_KP8, '8'),
    (evdev::Key::KEY_KP9, '9'),
];

/// Translate an evdev key code.
fn translate(code: evdev::Key) -> Key {
    if code == evdev::Key::KEY_ENTER || code == evdev::Key::KEY_KPENTER {
        return Key::Enter;
    }
    KEY_MAP
        .iter()
        .find(|(key, _)| *key == code)
        .map_or(Key::Other(code.code()), |(_, c)| Key::Char(*c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(evdev::Key::KEY_4, Key::Char('4'))]
    #[case(evdev::Key::KEY_KP2, Key::Char('2'))]
    #[case(evdev::Key::KEY_X, Key::Char('x'))]
    #[case(evdev::Key::KEY_ENTER, Key::Enter)]
    #[case(evdev::Key::KEY_KPENTER, Key::Enter)]
    #[case(evdev::Key::KEY_LEFTSHIFT, Key::Other(evdev::Key::KEY_LEFTSHIFT.code()))]
    fn test_translate(#[case] code: evdev::Key, #[case] expected: Key) {
        assert_eq!(translate(code), expected);
    }

    #[tokio::test]
    async fn test_open_missing_node_fails() {
        let result = EvdevSource::open(Path::new("/dev/input/does-not-exist"));
        assert!(matches!(
            result,
            Err(HardwareError::AcquisitionFailed { .. })
        ));
    }
}
