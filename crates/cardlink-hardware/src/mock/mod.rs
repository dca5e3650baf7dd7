//! Mock input backend for testing and development.
//!
//! This module provides a simulated keyboard-wedge card reader that can be
//! controlled programmatically without requiring physical hardware.

pub mod keyboard;

pub use keyboard::{MockKeySource, MockKeyboard, MockKeyboardHandle};
