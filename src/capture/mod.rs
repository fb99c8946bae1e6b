//! Screen sampling and window management.
//!
//! This module provides:
//! - The [`Sampler`] interface used by every recognizer and probe
//! - Window discovery and z-order control ([`WindowManager`])
//! - GDI-backed implementations of both on Windows

#[cfg(windows)]
pub mod gdi;
pub mod window;

use image::{GrayImage, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

#[cfg(windows)]
pub use gdi::GdiSampler;
#[cfg(windows)]
pub use window::Win32WindowManager;
pub use window::{WindowHandle, WindowManager};

/// A rectangle in absolute screen pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl ScreenRect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Reasons a capture can fail. Callers on the detection path treat every
/// variant as "nothing seen".
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("region {0:?} is empty")]
    Empty(ScreenRect),
    #[error("region {0:?} lies outside the screen")]
    OutOfBounds(ScreenRect),
    #[error("screen capture failed: {0}")]
    Os(String),
}

/// Reads pixels from the display.
///
/// Implementations must be callable from several watcher threads at once.
pub trait Sampler: Send + Sync {
    /// Captures a rectangular region as RGB.
    fn capture_region(&self, rect: ScreenRect) -> Result<RgbImage, CaptureError>;

    /// Captures a single pixel.
    fn capture_pixel(&self, x: i32, y: i32) -> Result<Rgb<u8>, CaptureError> {
        let img = self.capture_region(ScreenRect::new(x, y, 1, 1))?;
        Ok(*img.get_pixel(0, 0))
    }

    /// Captures a region and converts it to 8-bit luma.
    fn capture_region_gray(&self, rect: ScreenRect) -> Result<GrayImage, CaptureError> {
        let img = self.capture_region(rect)?;
        Ok(image::imageops::grayscale(&img))
    }
}
