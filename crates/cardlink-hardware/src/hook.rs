//! Windows input backend over a low-level keyboard hook.
//!
//! Windows does not hand out per-device keyboard handles to ordinary
//! processes, so the reader installs a process-wide `WH_KEYBOARD_LL` hook
//! instead of locating a device. The hook runs on a dedicated thread with
//! its own message loop; events reach the async side over an unbounded
//! channel.
//!
//! Only one hook source may be installed at a time.

use crate::{
    HardwareError, Result,
    key::{Key, KeyEvent, KeyState},
    source::KeySource,
};
use std::ptr;
use std::sync::Mutex;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use windows_sys::Win32::Foundation::{LPARAM, LRESULT, WPARAM};
use windows_sys::Win32::System::LibraryLoader::GetModuleHandleW;
use windows_sys::Win32::System::Threading::GetCurrentThreadId;
use windows_sys::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, GetMessageW, HC_ACTION, KBDLLHOOKSTRUCT, MSG, PostThreadMessageW,
    SetWindowsHookExW, UnhookWindowsHookEx, WH_KEYBOARD_LL, WM_KEYDOWN, WM_KEYUP, WM_QUIT,
    WM_SYSKEYDOWN, WM_SYSKEYUP,
};

const VK_RETURN: u32 = 0x0D;

static HOOK_SINK: Mutex<Option<mpsc::UnboundedSender<KeyEvent>>> = Mutex::new(None);

fn sink() -> std::sync::MutexGuard<'static, Option<mpsc::UnboundedSender<KeyEvent>>> {
    HOOK_SINK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Installed low-level keyboard hook.
#[derive(Debug)]
pub struct HookSource {
    rx: mpsc::UnboundedReceiver<KeyEvent>,
    thread_id: u32,
    thread: Option<JoinHandle<()>>,
}

impl HookSource {
    /// Install the hook on a dedicated message-loop thread.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::AcquisitionFailed` if another hook source is
    /// active or `SetWindowsHookExW` fails.
    pub async fn install() -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut sink = sink();
            if sink.as_ref().is_some_and(|tx| !tx.is_closed()) {
                return Err(HardwareError::acquisition(
                    "global keyboard hook",
                    "hook already installed",
                ));
            }
            *sink = Some(tx);
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let thread = std::thread::Builder::new()
            .name("cardlink-keyboard-hook".to_string())
            .spawn(move || run_hook_thread(ready_tx))
            .map_err(|e| {
                sink().take();
                HardwareError::from(e)
            })?;

        match ready_rx.await {
            Ok(Ok(thread_id)) => {
                debug!(thread_id, "Keyboard hook installed");
                Ok(Self {
                    rx,
                    thread_id,
                    thread: Some(thread),
                })
            }
            Ok(Err(code)) => {
                sink().take();
                Err(HardwareError::acquisition(
                    "global keyboard hook",
                    format!("SetWindowsHookExW failed: {}", std::io::Error::from_raw_os_error(code)),
                ))
            }
            Err(_) => {
                sink().take();
                Err(HardwareError::acquisition(
                    "global keyboard hook",
                    "hook thread exited during installation",
                ))
            }
        }
    }
}

impl KeySource for HookSource {
    async fn next_event(&mut self) -> Result<KeyEvent> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| HardwareError::disconnected("global keyboard hook"))
    }

    async fn release(&mut self) -> Result<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        // SAFETY: posting to a thread id has no memory-safety preconditions.
        unsafe { PostThreadMessageW(self.thread_id, WM_QUIT, 0, 0) };

        tokio::task::spawn_blocking(move || thread.join())
            .await
            .map_err(|e| HardwareError::other(format!("hook thread join failed: {e}")))?
            .map_err(|_| HardwareError::other("hook thread panicked"))?;

        self.rx.close();
        debug!("Keyboard hook removed");
        Ok(())
    }

    fn describe(&self) -> String {
        "global keyboard hook".to_string()
    }
}

impl Drop for HookSource {
    fn drop(&mut self) {
        if self.thread.is_some() {
            // SAFETY: see `release`.
            unsafe { PostThreadMessageW(self.thread_id, WM_QUIT, 0, 0) };
        }
    }
}

fn run_hook_thread(ready: oneshot::Sender<std::result::Result<u32, i32>>) {
    // SAFETY: plain Win32 calls on this thread; the hook handle never leaves it.
    unsafe {
        let module = GetModuleHandleW(ptr::null());
        let hook = SetWindowsHookExW(WH_KEYBOARD_LL, Some(hook_proc), module, 0);
        if hook.is_null() {
            let code = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            let _ = ready.send(Err(code));
            return;
        }
        if ready.send(Ok(GetCurrentThreadId())).is_err() {
            UnhookWindowsHookEx(hook);
            return;
        }

        let mut msg: MSG = std::mem::zeroed();
        while GetMessageW(&mut msg, ptr::null_mut(), 0, 0) > 0 {}

        if UnhookWindowsHookEx(hook) == 0 {
            warn!("UnhookWindowsHookEx failed");
        }
    }
    sink().take();
}

unsafe extern "system" fn hook_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code == HC_ACTION as i32 {
        let state = match wparam as u32 {
            WM_KEYDOWN | WM_SYSKEYDOWN => Some(KeyState::Down),
            WM_KEYUP | WM_SYSKEYUP => Some(KeyState::Up),
            _ => None,
        };

        if let Some(state) = state {
            // SAFETY: for WH_KEYBOARD_LL with HC_ACTION, lparam points to a KBDLLHOOKSTRUCT.
            let info = unsafe { &*(lparam as *const KBDLLHOOKSTRUCT) };
            if let Some(tx) = sink().as_ref() {
                let _ = tx.send(KeyEvent::new(translate(info.vkCode), state));
            }
        }
    }

    // Keystrokes are observed, not swallowed.
    unsafe { CallNextHookEx(ptr::null_mut(), code, wparam, lparam) }
}

/// Translate a Windows virtual-key code.
fn translate(vk: u32) -> Key {
    match vk {
        VK_RETURN => Key::Enter,
        0x30..=0x39 | 0x41..=0x5A => char::from_u32(vk)
            .map_or(Key::Other(vk as u16), |c| Key::Char(c.to_ascii_lowercase())),
        0x60..=0x69 => char::from_digit(vk - 0x60, 10)
            .map_or(Key::Other(vk as u16), Key::Char),
        other => Key::Other(other as u16),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_virtual_keys() {
        assert_eq!(translate(0x34), Key::Char('4'));
        assert_eq!(translate(0x58), Key::Char('x'));
        assert_eq!(translate(0x62), Key::Char('2'));
        assert_eq!(translate(VK_RETURN), Key::Enter);
        assert_eq!(translate(0x10), Key::Other(0x10));
    }
}
