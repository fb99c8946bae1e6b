//! Window discovery and z-order control for the game client window.
//!
//! The launcher and the game share a title, so candidates are filtered by a
//! minimum size and the largest one wins.

use tracing::{info, warn};

/// Opaque window identifier. Stored as an integer so it can cross threads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowHandle(pub isize);

/// A visible window whose title matched the configured name.
#[derive(Clone, Debug)]
pub struct WindowCandidate {
    pub handle: WindowHandle,
    pub title: String,
    pub process: String,
    /// Restored (non-minimized) size.
    pub width: i32,
    pub height: i32,
}

impl WindowCandidate {
    fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }
}

/// Window operations the session needs from the OS.
pub trait WindowManager: Send + Sync {
    /// Finds the largest visible window whose title contains `name`
    /// (case-insensitive) and whose restored size is at least the minimum.
    fn find_target_window(&self, name: &str, min_width: i32, min_height: i32)
    -> Option<WindowHandle>;

    /// Pins or unpins the window above all non-topmost windows.
    fn set_topmost(&self, handle: WindowHandle, topmost: bool) -> bool;

    /// Restores the window if it is minimized.
    fn restore_if_minimized(&self, handle: WindowHandle);
}

/// Picks the game window from the title matches.
///
/// Windows smaller than the minimum are usually the launcher; they are logged
/// so a misconfigured minimum is easy to spot.
pub fn select_game_window(
    candidates: &[WindowCandidate],
    name: &str,
    min_width: i32,
    min_height: i32,
) -> Option<WindowCandidate> {
    let best = candidates
        .iter()
        .filter(|w| w.width >= min_width && w.height >= min_height)
        .max_by_key(|w| w.area());

    match best {
        Some(w) => {
            info!(
                title = %w.title,
                width = w.width,
                height = w.height,
                process = %w.process,
                "found game window"
            );
            Some(w.clone())
        }
        None if !candidates.is_empty() => {
            warn!(
                min_width,
                min_height,
                "all matching windows are below the minimum size, probably the launcher"
            );
            for w in candidates {
                warn!(
                    title = %w.title,
                    width = w.width,
                    height = w.height,
                    process = %w.process,
                    "undersized window"
                );
            }
            None
        }
        None => {
            warn!(name, "no window title contains the game name");
            None
        }
    }
}

#[cfg(windows)]
pub use win32::Win32WindowManager;

#[cfg(windows)]
mod win32 {
    use std::ffi::OsString;
    use std::os::windows::ffi::OsStringExt;
    use std::time::Duration;

    use tracing::{debug, info, warn};
    use windows::Win32::Foundation::{BOOL, CloseHandle, HWND, LPARAM, RECT, TRUE};
    use windows::Win32::System::Threading::{
        OpenProcess, PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION,
        QueryFullProcessImageNameW,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        EnumWindows, GetWindowPlacement, GetWindowRect, GetWindowTextLengthW, GetWindowTextW,
        GetWindowThreadProcessId, HWND_NOTOPMOST, HWND_TOPMOST, IsIconic, IsWindowVisible,
        SW_RESTORE, SWP_NOMOVE, SWP_NOSIZE, SetWindowPos, ShowWindow, WINDOWPLACEMENT,
    };

    use super::{select_game_window, WindowCandidate, WindowHandle, WindowManager};

    /// Win32 implementation of [`WindowManager`].
    #[derive(Default)]
    pub struct Win32WindowManager;

    impl Win32WindowManager {
        pub fn new() -> Self {
            Self
        }
    }

    fn hwnd(handle: WindowHandle) -> HWND {
        HWND(handle.0 as *mut std::ffi::c_void)
    }

    /// Size of the window as it would be when restored.
    unsafe fn normal_size(hwnd: HWND) -> Option<(i32, i32)> {
        unsafe {
            if IsIconic(hwnd).as_bool() {
                let mut placement = WINDOWPLACEMENT {
                    length: std::mem::size_of::<WINDOWPLACEMENT>() as u32,
                    ..Default::default()
                };
                GetWindowPlacement(hwnd, &mut placement).ok()?;
                let r = placement.rcNormalPosition;
                Some((r.right - r.left, r.bottom - r.top))
            } else {
                let mut r = RECT::default();
                GetWindowRect(hwnd, &mut r).ok()?;
                Some((r.right - r.left, r.bottom - r.top))
            }
        }
    }

    unsafe fn process_name(hwnd: HWND) -> String {
        unsafe {
            let mut process_id: u32 = 0;
            GetWindowThreadProcessId(hwnd, Some(&mut process_id));
            if process_id == 0 {
                return "unknown".to_string();
            }

            let Ok(process_handle) =
                OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, process_id)
            else {
                return "unknown".to_string();
            };

            let mut name_buf: Vec<u16> = vec![0; 1024];
            let mut len = name_buf.len() as u32;
            let result = QueryFullProcessImageNameW(
                process_handle,
                PROCESS_NAME_WIN32,
                windows::core::PWSTR(name_buf.as_mut_ptr()),
                &mut len,
            );
            let _ = CloseHandle(process_handle);

            if result.is_err() || len == 0 {
                return "unknown".to_string();
            }

            let full_path = OsString::from_wide(&name_buf[..len as usize])
                .to_string_lossy()
                .to_string();
            full_path
                .rsplit('\\')
                .next()
                .unwrap_or(&full_path)
                .to_string()
        }
    }

    struct EnumData {
        needle: String,
        candidates: Vec<WindowCandidate>,
    }

    unsafe extern "system" fn enum_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
        unsafe {
            let data = &mut *(lparam.0 as *mut EnumData);

            if !IsWindowVisible(hwnd).as_bool() {
                return TRUE;
            }

            let title_len = GetWindowTextLengthW(hwnd);
            if title_len <= 0 {
                return TRUE;
            }
            let mut title_buf: Vec<u16> = vec![0; (title_len + 1) as usize];
            GetWindowTextW(hwnd, &mut title_buf);
            let title = OsString::from_wide(&title_buf[..title_len as usize])
                .to_string_lossy()
                .to_string();

            if !title.to_lowercase().contains(&data.needle) {
                return TRUE;
            }

            let Some((width, height)) = normal_size(hwnd) else {
                debug!(title = %title, "could not measure window");
                return TRUE;
            };

            data.candidates.push(WindowCandidate {
                handle: WindowHandle(hwnd.0 as isize),
                title,
                process: process_name(hwnd),
                width,
                height,
            });
            TRUE
        }
    }

    impl WindowManager for Win32WindowManager {
        fn find_target_window(
            &self,
            name: &str,
            min_width: i32,
            min_height: i32,
        ) -> Option<WindowHandle> {
            let mut data = EnumData {
                needle: name.to_lowercase(),
                candidates: Vec::new(),
            };
            unsafe {
                // EnumWindows reports FALSE when the callback stops early; the
                // callback never does, so the result carries no information.
                let _ = EnumWindows(Some(enum_callback), LPARAM(&mut data as *mut _ as isize));
            }
            select_game_window(&data.candidates, name, min_width, min_height).map(|w| w.handle)
        }

        fn set_topmost(&self, handle: WindowHandle, topmost: bool) -> bool {
            let insert_after = if topmost { HWND_TOPMOST } else { HWND_NOTOPMOST };
            let result = unsafe {
                SetWindowPos(hwnd(handle), insert_after, 0, 0, 0, 0, SWP_NOMOVE | SWP_NOSIZE)
            };
            match result {
                Ok(()) => {
                    info!(topmost, "window z-order updated");
                    true
                }
                Err(e) => {
                    warn!(topmost, error = %e, "failed to change window z-order");
                    false
                }
            }
        }

        fn restore_if_minimized(&self, handle: WindowHandle) {
            unsafe {
                if IsIconic(hwnd(handle)).as_bool() {
                    info!("window is minimized, restoring");
                    let _ = ShowWindow(hwnd(handle), SW_RESTORE);
                    std::thread::sleep(Duration::from_millis(300));
                }
            }
        }
    }
}
