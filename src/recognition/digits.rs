//! Price recognition from the two leading digits of a six-digit listing price.
//!
//! The trading view only distinguishes prices at 10,000 granularity, so the
//! hundred-thousands and ten-thousands glyphs are matched and the remaining
//! digits are taken as zero. The glyphs sit at fixed offsets inside the
//! captured strip: the left sub-window is the first `digit_width` columns and
//! the right sub-window the last `digit_width` columns.

use image::GrayImage;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::capture::{Sampler, ScreenRect};
use crate::recognition::template::{DigitMatch, DigitTemplates};

/// Recognizes the leading two digits of the listing price.
pub struct PriceRecognizer {
    templates: Arc<DigitTemplates>,
    region: ScreenRect,
    digit_width: u32,
    threshold: f32,
}

/// Composes the price from its two leading digits.
pub fn compose_price(hundred_thousands: u8, ten_thousands: u8) -> u32 {
    hundred_thousands as u32 * 100_000 + ten_thousands as u32 * 10_000
}

impl PriceRecognizer {
    pub fn new(
        templates: Arc<DigitTemplates>,
        region: ScreenRect,
        digit_width: u32,
        threshold: f32,
    ) -> Self {
        Self {
            templates,
            region,
            digit_width,
            threshold,
        }
    }

    /// Best digit for one glyph window, or `None` below the confidence threshold.
    pub fn classify(&self, window: &GrayImage) -> Option<DigitMatch> {
        let best = self.templates.best_match(window);
        if best.score < self.threshold {
            trace!(digit = best.digit, score = best.score, "glyph below threshold");
            return None;
        }
        Some(best)
    }

    /// Recognizes the price in an already captured strip.
    pub fn recognize_image(&self, strip: &GrayImage) -> Option<u32> {
        let (width, height) = strip.dimensions();
        if width < self.digit_width || height == 0 {
            return None;
        }

        let left = image::imageops::crop_imm(strip, 0, 0, self.digit_width, height).to_image();
        let right =
            image::imageops::crop_imm(strip, width - self.digit_width, 0, self.digit_width, height)
                .to_image();

        let hundred_thousands = self.classify(&left)?;
        let ten_thousands = self.classify(&right)?;
        Some(compose_price(hundred_thousands.digit, ten_thousands.digit))
    }

    /// Captures the price strip and recognizes it.
    ///
    /// A failed capture is indistinguishable from an unreadable price.
    pub fn recognize(&self, sampler: &dyn Sampler) -> Option<u32> {
        match sampler.capture_region_gray(self.region) {
            Ok(strip) => self.recognize_image(&strip),
            Err(e) => {
                debug!(error = %e, "price capture failed");
                None
            }
        }
    }
}
