//! Coin balance reader.
//!
//! The header only shows a rounded balance. Hovering the coin icon opens a
//! tooltip with the exact amount, which is located by finding the coin icon a
//! second time inside the tooltip and reading the text to its lower right.

use anyhow::{anyhow, bail, Context, Result};
use image::GrayImage;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::input::InputInjector;
use super::task::StopToken;
use crate::capture::{Sampler, ScreenRect};
use crate::ocr::{TextMode, TextReader};
use crate::recognition::match_template;

const HEADER_STRIP: ScreenRect = ScreenRect::new(1450, 44, 300, 17);
const TOOLTIP_STRIP: ScreenRect = ScreenRect::new(1400, 249, 240, 17);
/// Offset of the amount text from the tooltip icon's top-left corner.
const AMOUNT_OFFSET: (i32, i32) = (16, 19);
const AMOUNT_SIZE: (u32, u32) = (110, 17);
const MIN_ICON_SCORE: f32 = 0.6;

/// Digits with optional thousands separators.
const AMOUNT_PATTERN: &str = r"^\d[\d,]*$";

/// Parses an OCR'd amount such as `"1,234,567"`.
pub fn parse_amount(text: &str) -> Option<u64> {
    let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let pattern = Regex::new(AMOUNT_PATTERN).ok()?;
    if !pattern.is_match(&cleaned) {
        return None;
    }
    cleaned.replace(',', "").parse().ok()
}

/// Formats `value` with comma thousands separators.
pub fn format_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

pub struct BalanceReader {
    sampler: Arc<dyn Sampler>,
    input: Arc<dyn InputInjector>,
    reader: Arc<dyn TextReader>,
    coin: GrayImage,
    hover_delay: Duration,
}

impl BalanceReader {
    pub fn new(
        sampler: Arc<dyn Sampler>,
        input: Arc<dyn InputInjector>,
        reader: Arc<dyn TextReader>,
        coin: GrayImage,
    ) -> Self {
        Self {
            sampler,
            input,
            reader,
            coin,
            hover_delay: Duration::from_millis(500),
        }
    }

    pub fn with_hover_delay(mut self, delay: Duration) -> Self {
        self.hover_delay = delay;
        self
    }

    /// Finds the coin icon inside `strip`, in screen coordinates.
    fn locate_icon(&self, strip: ScreenRect) -> Result<(i32, i32)> {
        let image = self.sampler.capture_region_gray(strip)?;
        let found = match_template(&image, &self.coin);
        if found.score < MIN_ICON_SCORE {
            bail!("coin icon not found in {:?} (score {:.2})", strip, found.score);
        }
        Ok((strip.x + found.x as i32, strip.y + found.y as i32))
    }

    fn try_read(&self, stop: &StopToken) -> Result<u64> {
        let icon = self
            .locate_icon(HEADER_STRIP)
            .context("Failed to locate header coin icon")?;
        self.input.move_cursor(icon.0, icon.1);
        if stop.sleep(self.hover_delay) {
            bail!("stopped while waiting for the balance tooltip");
        }

        let tooltip_icon = self
            .locate_icon(TOOLTIP_STRIP)
            .context("Failed to locate tooltip coin icon")?;
        let region = ScreenRect::new(
            tooltip_icon.0 + AMOUNT_OFFSET.0,
            tooltip_icon.1 + AMOUNT_OFFSET.1,
            AMOUNT_SIZE.0,
            AMOUNT_SIZE.1,
        );
        let image = self.sampler.capture_region_gray(region)?;
        let text = self.reader.read_text(&image, TextMode::Digits)?;
        parse_amount(&text).ok_or_else(|| anyhow!("unreadable balance text {:?}", text))
    }

    /// Reads the exact coin balance. Any failure is logged and yields `None`.
    pub fn read(&self, stop: &StopToken) -> Option<u64> {
        match self.try_read(stop) {
            Ok(balance) => {
                info!("Current balance: {}", format_thousands(balance as i64));
                Some(balance)
            }
            Err(e) => {
                warn!("Balance recognition failed: {:#}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::clicker::tests::{Action, RecordingInjector};
    use crate::capture::CaptureError;
    use crate::recognition::template::tests::pattern;
    use image::{Luma, RgbImage};
    use parking_lot::Mutex;

    fn coin() -> GrayImage {
        pattern(42, 16, 15)
    }

    /// Serves the header and tooltip strips with the coin at fixed offsets.
    struct CoinScreen {
        header_offset: Option<(u32, u32)>,
        tooltip_offset: (u32, u32),
        captured: Mutex<Vec<ScreenRect>>,
    }

    impl Sampler for CoinScreen {
        fn capture_region(&self, rect: ScreenRect) -> Result<RgbImage, CaptureError> {
            self.captured.lock().push(rect);
            let mut gray = GrayImage::from_pixel(rect.width, rect.height, Luma([20]));
            let offset = if rect == HEADER_STRIP {
                self.header_offset
            } else if rect == TOOLTIP_STRIP {
                Some(self.tooltip_offset)
            } else {
                None
            };
            if let Some((x, y)) = offset {
                image::imageops::replace(&mut gray, &coin(), x as i64, y as i64);
            }
            Ok(image::DynamicImage::ImageLuma8(gray).to_rgb8())
        }
    }

    struct FixedReader(&'static str);

    impl TextReader for FixedReader {
        fn read_text(&self, _image: &GrayImage, mode: TextMode) -> anyhow::Result<String> {
            assert_eq!(mode, TextMode::Digits);
            Ok(self.0.to_string())
        }
    }

    fn reader(screen: Arc<CoinScreen>, text: &'static str) -> (BalanceReader, Arc<RecordingInjector>) {
        let input = Arc::new(RecordingInjector::default());
        let balance = BalanceReader::new(screen, input.clone(), Arc::new(FixedReader(text)), coin())
            .with_hover_delay(Duration::ZERO);
        (balance, input)
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1,234,567\n"), Some(1_234_567));
        assert_eq!(parse_amount(" 98 765 "), Some(98_765));
        assert_eq!(parse_amount("12,34"), Some(1_234));
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount(",123"), None);
        assert_eq!(parse_amount("12a4"), None);
    }

    #[test]
    fn test_format_thousands() {
        assert_eq!(format_thousands(0), "0");
        assert_eq!(format_thousands(999), "999");
        assert_eq!(format_thousands(1_000), "1,000");
        assert_eq!(format_thousands(1_234_567), "1,234,567");
        assert_eq!(format_thousands(-450_000), "-450,000");
    }

    #[test]
    fn test_reads_balance_through_tooltip() {
        let screen = Arc::new(CoinScreen {
            header_offset: Some((100, 1)),
            tooltip_offset: (40, 2),
            captured: Mutex::new(Vec::new()),
        });
        let (balance, input) = reader(screen.clone(), "3,456,789");

        assert_eq!(balance.read(&StopToken::new()), Some(3_456_789));
        assert_eq!(input.actions(), vec![Action::Move(1550, 45)]);

        let captured = screen.captured.lock().clone();
        assert_eq!(captured.len(), 3);
        assert_eq!(captured[2], ScreenRect::new(1440 + 16, 251 + 19, 110, 17));
    }

    #[test]
    fn test_missing_icon_yields_none() {
        let screen = Arc::new(CoinScreen {
            header_offset: None,
            tooltip_offset: (0, 0),
            captured: Mutex::new(Vec::new()),
        });
        let (balance, input) = reader(screen, "1,000");
        assert_eq!(balance.read(&StopToken::new()), None);
        assert!(input.actions().is_empty());
    }

    #[test]
    fn test_garbled_text_yields_none() {
        let screen = Arc::new(CoinScreen {
            header_offset: Some((0, 0)),
            tooltip_offset: (0, 0),
            captured: Mutex::new(Vec::new()),
        });
        let (balance, _) = reader(screen, "l,2O0");
        assert_eq!(balance.read(&StopToken::new()), None);
    }
}
