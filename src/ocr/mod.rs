//! Free-form text recognition.
//!
//! Used off the hot path only: reading the coin balance and spotting the
//! market ban notice during UI recovery.

pub mod engine;
pub mod setup;

pub use engine::TesseractReader;
pub use setup::{ensure_tesseract, TesseractPaths};

use anyhow::Result;
use image::GrayImage;

/// What kind of text an image holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextMode {
    /// Digits and thousands separators
    Digits,
    /// Simplified Chinese
    Chinese,
}

impl TextMode {
    /// Trained data required by this mode.
    pub fn language(self) -> &'static str {
        match self {
            TextMode::Digits => "eng",
            TextMode::Chinese => "chi_sim",
        }
    }
}

/// Reads text from an image.
pub trait TextReader: Send + Sync {
    fn read_text(&self, image: &GrayImage, mode: TextMode) -> Result<String>;
}
