//! Desktop sampling through GDI.
//!
//! Each capture is a `BitBlt` of exactly the requested rectangle from the
//! desktop DC into a memory bitmap, read back as a top-down 32-bit DIB.

use image::{Rgb, RgbImage};
use std::mem::size_of;

use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Gdi::{
    BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC,
    GetDIBits, ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, CAPTUREBLT,
    DIB_RGB_COLORS, HGDIOBJ, SRCCOPY,
};
use windows::Win32::UI::WindowsAndMessaging::{
    GetSystemMetrics, SM_CXVIRTUALSCREEN, SM_CYVIRTUALSCREEN, SM_XVIRTUALSCREEN,
    SM_YVIRTUALSCREEN,
};

use super::{CaptureError, Sampler, ScreenRect};

/// Samples the virtual desktop with GDI.
#[derive(Default)]
pub struct GdiSampler;

impl GdiSampler {
    pub fn new() -> Self {
        Self
    }

    fn check_bounds(rect: ScreenRect) -> Result<(), CaptureError> {
        if rect.width == 0 || rect.height == 0 {
            return Err(CaptureError::Empty(rect));
        }

        let (left, top, width, height) = unsafe {
            (
                GetSystemMetrics(SM_XVIRTUALSCREEN),
                GetSystemMetrics(SM_YVIRTUALSCREEN),
                GetSystemMetrics(SM_CXVIRTUALSCREEN),
                GetSystemMetrics(SM_CYVIRTUALSCREEN),
            )
        };
        let right = left + width;
        let bottom = top + height;

        if rect.x < left
            || rect.y < top
            || rect.x + rect.width as i32 > right
            || rect.y + rect.height as i32 > bottom
        {
            return Err(CaptureError::OutOfBounds(rect));
        }
        Ok(())
    }
}

impl Sampler for GdiSampler {
    fn capture_region(&self, rect: ScreenRect) -> Result<RgbImage, CaptureError> {
        Self::check_bounds(rect)?;

        let width = rect.width as i32;
        let height = rect.height as i32;
        let mut bgra = vec![0u8; (rect.width * rect.height * 4) as usize];

        unsafe {
            let screen_dc = GetDC(HWND::default());
            if screen_dc.is_invalid() {
                return Err(CaptureError::Os("GetDC returned null".to_string()));
            }

            let mem_dc = CreateCompatibleDC(screen_dc);
            let bitmap = CreateCompatibleBitmap(screen_dc, width, height);
            let previous = SelectObject(mem_dc, HGDIOBJ(bitmap.0));

            let blit = BitBlt(
                mem_dc,
                0,
                0,
                width,
                height,
                screen_dc,
                rect.x,
                rect.y,
                SRCCOPY | CAPTUREBLT,
            );

            let mut info = BITMAPINFO {
                bmiHeader: BITMAPINFOHEADER {
                    biSize: size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: width,
                    // Negative height requests a top-down DIB.
                    biHeight: -height,
                    biPlanes: 1,
                    biBitCount: 32,
                    biCompression: BI_RGB.0,
                    ..Default::default()
                },
                ..Default::default()
            };

            let lines = GetDIBits(
                mem_dc,
                bitmap,
                0,
                rect.height,
                Some(bgra.as_mut_ptr() as *mut _),
                &mut info,
                DIB_RGB_COLORS,
            );

            SelectObject(mem_dc, previous);
            let _ = DeleteObject(HGDIOBJ(bitmap.0));
            let _ = DeleteDC(mem_dc);
            ReleaseDC(HWND::default(), screen_dc);

            if let Err(e) = blit {
                return Err(CaptureError::Os(format!("BitBlt failed: {}", e)));
            }
            if lines != height {
                return Err(CaptureError::Os(format!(
                    "GetDIBits copied {} of {} lines",
                    lines, height
                )));
            }
        }

        // BGRA -> RGB
        let img = RgbImage::from_fn(rect.width, rect.height, |x, y| {
            let offset = ((y * rect.width + x) * 4) as usize;
            Rgb([bgra[offset + 2], bgra[offset + 1], bgra[offset]])
        });
        Ok(img)
    }
}
