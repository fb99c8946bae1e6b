//! Single-pixel color probes.

use image::Rgb;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::capture::Sampler;

fn default_color_threshold() -> f64 {
    30.0
}

/// Checks whether the pixel at (`x`, `y`) is close to `color`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColorProbe {
    pub x: i32,
    pub y: i32,
    /// Target RGB color
    pub color: [u8; 3],
    /// Euclidean RGB distance below which the pixel counts as a match
    #[serde(default = "default_color_threshold")]
    pub threshold: f64,
}

/// Euclidean distance between two colors in RGB space.
pub fn color_distance(a: Rgb<u8>, b: [u8; 3]) -> f64 {
    let dr = a[0] as f64 - b[0] as f64;
    let dg = a[1] as f64 - b[1] as f64;
    let db = a[2] as f64 - b[2] as f64;
    (dr * dr + dg * dg + db * db).sqrt()
}

impl ColorProbe {
    pub const fn new(x: i32, y: i32, color: [u8; 3], threshold: f64) -> Self {
        Self {
            x,
            y,
            color,
            threshold,
        }
    }

    /// Probe with the default threshold of 30.
    pub const fn with_default_threshold(x: i32, y: i32, color: [u8; 3]) -> Self {
        Self::new(x, y, color, 30.0)
    }

    pub fn matches_pixel(&self, pixel: Rgb<u8>) -> bool {
        color_distance(pixel, self.color) < self.threshold
    }

    /// Samples the screen. Probes are advisory: a failed capture is a miss.
    pub fn matches(&self, sampler: &dyn Sampler) -> bool {
        match sampler.capture_pixel(self.x, self.y) {
            Ok(pixel) => self.matches_pixel(pixel),
            Err(e) => {
                trace!(x = self.x, y = self.y, error = %e, "pixel capture failed");
                false
            }
        }
    }
}
