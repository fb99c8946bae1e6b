//! Mouse and keyboard input simulation.
//!
//! The game reads hardware-level input (DirectInput/RawInput), so window
//! messages are ignored. The Windows backend uses `SendInput`, which works but
//! moves the real cursor: input must only be issued while the game window is
//! in front.

use super::keys::virtual_key;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
}

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    /// The key name is not in the virtual-key table.
    #[error("unknown key name: {0}")]
    UnknownKey(String),
    #[error("input injection failed: {0}")]
    Os(String),
}

/// Low-level input primitives.
///
/// Mouse operations are fire-and-forget; OS failures are logged by the
/// implementation. Only key names can be rejected, since they come from
/// callers rather than the OS.
pub trait InputInjector: Send + Sync {
    /// Moves the cursor to absolute screen coordinates.
    fn move_cursor(&self, x: i32, y: i32);

    /// Moves the cursor relative to its current position.
    fn move_relative(&self, dx: i32, dy: i32);

    /// Presses and releases a mouse button at the current position.
    fn click(&self, button: MouseButton);

    /// Presses and releases a key by name.
    fn key_press(&self, name: &str) -> Result<(), InputError>;

    fn click_at(&self, x: i32, y: i32, button: MouseButton) {
        self.move_cursor(x, y);
        self.click(button);
    }
}

/// Resolves `name` or reports it as unknown.
pub fn resolve_key(name: &str) -> Result<u16, InputError> {
    virtual_key(name).ok_or_else(|| InputError::UnknownKey(name.to_string()))
}

#[cfg(windows)]
pub use sendinput::SendInputInjector;

#[cfg(windows)]
mod sendinput {
    use tracing::warn;
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBD_EVENT_FLAGS, KEYBDINPUT,
        KEYEVENTF_KEYUP, MOUSE_EVENT_FLAGS, MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP,
        MOUSEEVENTF_MOVE, MOUSEEVENTF_RIGHTDOWN, MOUSEEVENTF_RIGHTUP, MOUSEINPUT, SendInput,
        VIRTUAL_KEY,
    };
    use windows::Win32::UI::WindowsAndMessaging::SetCursorPos;

    use super::{resolve_key, InputError, InputInjector, MouseButton};

    /// `SendInput`-based injector.
    #[derive(Default)]
    pub struct SendInputInjector;

    impl SendInputInjector {
        pub fn new() -> Self {
            Self
        }
    }

    fn mouse_input(dx: i32, dy: i32, flags: MOUSE_EVENT_FLAGS) -> INPUT {
        INPUT {
            r#type: INPUT_MOUSE,
            Anonymous: INPUT_0 {
                mi: MOUSEINPUT {
                    dx,
                    dy,
                    dwFlags: flags,
                    ..Default::default()
                },
            },
        }
    }

    fn key_input(vk: u16, flags: KEYBD_EVENT_FLAGS) -> INPUT {
        INPUT {
            r#type: INPUT_KEYBOARD,
            Anonymous: INPUT_0 {
                ki: KEYBDINPUT {
                    wVk: VIRTUAL_KEY(vk),
                    dwFlags: flags,
                    ..Default::default()
                },
            },
        }
    }

    fn send(inputs: &[INPUT]) -> Result<(), InputError> {
        let sent = unsafe { SendInput(inputs, std::mem::size_of::<INPUT>() as i32) };
        if sent as usize != inputs.len() {
            return Err(InputError::Os(format!(
                "SendInput accepted {} of {} events",
                sent,
                inputs.len()
            )));
        }
        Ok(())
    }

    impl InputInjector for SendInputInjector {
        fn move_cursor(&self, x: i32, y: i32) {
            if let Err(e) = unsafe { SetCursorPos(x, y) } {
                warn!(x, y, error = %e, "SetCursorPos failed");
            }
        }

        fn move_relative(&self, dx: i32, dy: i32) {
            if let Err(e) = send(&[mouse_input(dx, dy, MOUSEEVENTF_MOVE)]) {
                warn!(dx, dy, error = %e, "relative move failed");
            }
        }

        fn click(&self, button: MouseButton) {
            let (down, up) = match button {
                MouseButton::Left => (MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP),
                MouseButton::Right => (MOUSEEVENTF_RIGHTDOWN, MOUSEEVENTF_RIGHTUP),
            };
            if let Err(e) = send(&[mouse_input(0, 0, down), mouse_input(0, 0, up)]) {
                warn!(?button, error = %e, "click failed");
            }
        }

        fn key_press(&self, name: &str) -> Result<(), InputError> {
            let vk = resolve_key(name)?;
            send(&[
                key_input(vk, KEYBD_EVENT_FLAGS(0)),
                key_input(vk, KEYEVENTF_KEYUP),
            ])
        }
    }
}
