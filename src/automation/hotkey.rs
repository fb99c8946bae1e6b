//! Global operator hotkeys.
//!
//! - Ctrl+P: pause / resume the session
//! - Ctrl+Shift+Q: abort

use tracing::info;

use super::session::SessionControl;

pub const HOTKEY_PAUSE: i32 = 1;
pub const HOTKEY_ABORT: i32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Hotkey {
    TogglePause,
    Abort,
}

impl Hotkey {
    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            HOTKEY_PAUSE => Some(Hotkey::TogglePause),
            HOTKEY_ABORT => Some(Hotkey::Abort),
            _ => None,
        }
    }
}

/// Applies a hotkey to the session. `on_pause` receives the new pause state.
pub fn handle_hotkey(hotkey: Hotkey, control: &SessionControl, on_pause: &dyn Fn(bool)) {
    match hotkey {
        Hotkey::TogglePause => {
            let paused = control.toggle_pause();
            on_pause(paused);
        }
        Hotkey::Abort => {
            info!("Abort hotkey pressed");
            control.abort();
        }
    }
}

#[cfg(windows)]
pub use listener::HotkeyListener;

#[cfg(windows)]
mod listener {
    use anyhow::{anyhow, Context, Result};
    use std::sync::mpsc;
    use std::time::Duration;
    use tracing::{info, warn};
    use windows::Win32::Foundation::{HWND, LPARAM, WPARAM};
    use windows::Win32::System::Threading::GetCurrentThreadId;
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        RegisterHotKey, UnregisterHotKey, MOD_CONTROL, MOD_NOREPEAT, MOD_SHIFT,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        GetMessageW, PeekMessageW, PostThreadMessageW, MSG, PM_NOREMOVE, WM_HOTKEY, WM_QUIT,
    };

    use super::{handle_hotkey, Hotkey, HOTKEY_ABORT, HOTKEY_PAUSE};
    use crate::automation::session::SessionControl;
    use crate::automation::task::{spawn_task, TaskHandle};

    /// Message loop thread owning the hotkey registrations.
    pub struct HotkeyListener {
        thread_id: u32,
        task: Option<TaskHandle>,
    }

    impl HotkeyListener {
        pub fn spawn<F>(control: SessionControl, on_pause: F) -> Result<Self>
        where
            F: Fn(bool) + Send + 'static,
        {
            let (ready_tx, ready_rx) = mpsc::channel::<Result<u32, String>>();
            let task = spawn_task("hotkeys", move || unsafe {
                let mut msg = MSG::default();
                // Creates the thread's message queue before anyone posts to it
                let _ = PeekMessageW(&mut msg, HWND::default(), 0, 0, PM_NOREMOVE);

                let registered = RegisterHotKey(
                    HWND::default(),
                    HOTKEY_PAUSE,
                    MOD_CONTROL | MOD_NOREPEAT,
                    0x50, // 'P' key
                )
                .and_then(|_| {
                    RegisterHotKey(
                        HWND::default(),
                        HOTKEY_ABORT,
                        MOD_CONTROL | MOD_SHIFT | MOD_NOREPEAT,
                        0x51, // 'Q' key
                    )
                });
                if let Err(e) = registered {
                    let _ = UnregisterHotKey(HWND::default(), HOTKEY_PAUSE);
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
                let _ = ready_tx.send(Ok(GetCurrentThreadId()));

                while GetMessageW(&mut msg, HWND::default(), 0, 0).as_bool() {
                    if msg.message == WM_HOTKEY {
                        if let Some(hotkey) = Hotkey::from_id(msg.wParam.0 as i32) {
                            handle_hotkey(hotkey, &control, &on_pause);
                        }
                    }
                }

                let _ = UnregisterHotKey(HWND::default(), HOTKEY_PAUSE);
                let _ = UnregisterHotKey(HWND::default(), HOTKEY_ABORT);
            })
            .context("Failed to spawn hotkey thread")?;

            let thread_id = ready_rx
                .recv_timeout(Duration::from_secs(2))
                .context("Hotkey thread did not start")?
                .map_err(|e| anyhow!("Failed to register hotkeys: {}", e))?;

            info!("Hotkeys: Ctrl+P (pause/resume), Ctrl+Shift+Q (abort)");
            Ok(Self {
                thread_id,
                task: Some(task),
            })
        }

        pub fn stop(&mut self) {
            let Some(task) = self.task.take() else {
                return;
            };
            unsafe {
                if let Err(e) = PostThreadMessageW(self.thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) {
                    warn!("Failed to stop hotkey thread: {}", e);
                }
            }
            task.join_timeout(Duration::from_secs(1));
        }
    }

    impl Drop for HotkeyListener {
        fn drop(&mut self) {
            self.stop();
        }
    }
}
