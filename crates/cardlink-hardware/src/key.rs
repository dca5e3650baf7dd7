//! Key events delivered by input sources.
//!
//! Card scanners behave like a fast typist: each card is a burst of
//! alphanumeric key presses followed by Enter. Sources translate their
//! platform codes into [`KeyEvent`]s so the reader never sees raw
//! scancodes or virtual-key codes.

use std::fmt;

/// A key, reduced to what the reader cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    /// An alphanumeric key, already lowercased.
    Char(char),

    /// The terminator key.
    Enter,

    /// Any other key, carrying the platform code for diagnostics.
    Other(u16),
}

impl Key {
    /// Map a character to a key.
    ///
    /// ASCII alphanumerics become [`Key::Char`] (lowercased), `'\n'` and
    /// `'\r'` become [`Key::Enter`], anything else becomes
    /// [`Key::Other`] with the character's low 16 bits.
    ///
    /// # Examples
    ///
    /// ```
    /// use cardlink_hardware::Key;
    ///
    /// assert_eq!(Key::from_char('A'), Key::Char('a'));
    /// assert_eq!(Key::from_char('\n'), Key::Enter);
    /// assert!(matches!(Key::from_char('-'), Key::Other(_)));
    /// ```
    pub fn from_char(c: char) -> Self {
        match c {
            '\n' | '\r' => Key::Enter,
            c if c.is_ascii_alphanumeric() => Key::Char(c.to_ascii_lowercase()),
            c => Key::Other(c as u32 as u16),
        }
    }

    /// The buffered character for this key, if it contributes to a card id.
    #[must_use]
    pub fn as_char(&self) -> Option<char> {
        match self {
            Key::Char(c) if c.is_ascii_alphanumeric() => Some(c.to_ascii_lowercase()),
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Key::Char(c) => write!(f, "{c}"),
            Key::Enter => write!(f, "Enter"),
            Key::Other(code) => write!(f, "key#{code}"),
        }
    }
}

/// Whether a key went down, up, or auto-repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyState {
    Down,
    Up,
    Repeat,
}

/// One key transition from an input source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    pub key: Key,
    pub state: KeyState,
}

impl KeyEvent {
    /// Create a key event.
    pub fn new(key: Key, state: KeyState) -> Self {
        Self { key, state }
    }

    /// Key-down event.
    pub fn down(key: Key) -> Self {
        Self::new(key, KeyState::Down)
    }

    /// Key-up event.
    pub fn up(key: Key) -> Self {
        Self::new(key, KeyState::Up)
    }

    /// Returns `true` for key-down events, the only ones the reader processes.
    #[must_use]
    pub fn is_press(&self) -> bool {
        self.state == KeyState::Down
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case('4', Key::Char('4'))]
    #[case('x', Key::Char('x'))]
    #[case('X', Key::Char('x'))]
    #[case('\r', Key::Enter)]
    #[case(' ', Key::Other(0x20))]
    #[case(';', Key::Other(0x3B))]
    fn test_key_from_char(#[case] input: char, #[case] expected: Key) {
        assert_eq!(Key::from_char(input), expected);
    }

    #[test]
    fn test_only_alphanumerics_contribute() {
        assert_eq!(Key::Char('Q').as_char(), Some('q'));
        assert_eq!(Key::Char('%').as_char(), None);
        assert_eq!(Key::Enter.as_char(), None);
        assert_eq!(Key::Other(42).as_char(), None);
    }

    #[test]
    fn test_only_down_is_a_press() {
        assert!(KeyEvent::down(Key::Enter).is_press());
        assert!(!KeyEvent::up(Key::Enter).is_press());
        assert!(!KeyEvent::new(Key::Enter, KeyState::Repeat).is_press());
    }
}
