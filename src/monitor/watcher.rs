//! Signal predicates and the polling loops that drive them.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::event::{EventKind, PurchaseEvent};
use super::signals::RearmCounter;
use super::Shared;
use crate::automation::task::StopToken;
use crate::capture::Sampler;
use crate::recognition::{ColorProbe, PriceRecognizer};

/// One visual condition, sampled once per watcher iteration.
pub trait Signal: Send {
    fn kind(&self) -> EventKind;

    /// Returns the event to fire if the condition currently holds.
    fn sample(&mut self) -> Option<PurchaseEvent>;
}

/// Fires when a recognized listing price falls inside `range`.
pub struct PriceSignal {
    recognizer: PriceRecognizer,
    sampler: Arc<dyn Sampler>,
    range: RangeInclusive<u32>,
}

impl PriceSignal {
    pub fn new(recognizer: PriceRecognizer, sampler: Arc<dyn Sampler>) -> Self {
        Self {
            recognizer,
            sampler,
            range: 100_000..=999_999,
        }
    }
}

impl Signal for PriceSignal {
    fn kind(&self) -> EventKind {
        EventKind::SixDigitPrice
    }

    fn sample(&mut self) -> Option<PurchaseEvent> {
        let price = self.recognizer.recognize(self.sampler.as_ref())?;
        self.range
            .contains(&price)
            .then(|| PurchaseEvent::price(price))
    }
}

/// Fires when a single pixel matches its target color.
pub struct ColorSignal {
    kind: EventKind,
    probe: ColorProbe,
    sampler: Arc<dyn Sampler>,
}

impl ColorSignal {
    pub fn new(kind: EventKind, probe: ColorProbe, sampler: Arc<dyn Sampler>) -> Self {
        Self {
            kind,
            probe,
            sampler,
        }
    }
}

impl Signal for ColorSignal {
    fn kind(&self) -> EventKind {
        self.kind
    }

    fn sample(&mut self) -> Option<PurchaseEvent> {
        self.probe.matches(self.sampler.as_ref()).then_some(PurchaseEvent {
            kind: self.kind,
            price: None,
        })
    }
}

pub(super) fn run_signal_watcher(
    mut signal: Box<dyn Signal>,
    shared: Arc<Shared>,
    stop: StopToken,
    poll_interval: Duration,
) {
    let kind = signal.kind();
    debug!(%kind, "watcher started");

    while !stop.is_stopped() {
        let detection = signal.sample();
        // Publish first so the re-arm loop never sees a stale all-clear.
        shared.signals.publish(kind, detection.is_some());

        if let Some(event) = detection {
            if shared.dispatch.try_fire(event) {
                info!(%kind, price = ?event.price, "event fired");
            }
        }

        if stop.sleep(poll_interval) {
            break;
        }
    }

    debug!(%kind, "watcher stopped");
}

pub(super) fn run_rearm_watcher(
    shared: Arc<Shared>,
    stop: StopToken,
    poll_interval: Duration,
    threshold: u32,
) {
    let mut counter = RearmCounter::new(threshold);

    while !stop.is_stopped() {
        let armed = shared.dispatch.is_armed();
        let any_present = !armed && shared.signals.any_present();
        if counter.observe(armed, any_present) {
            shared.dispatch.rearm();
            debug!("all signals clear, re-armed");
        }

        if stop.sleep(poll_interval) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureError, ScreenRect};
    use crate::recognition::digits::tests::price_strip;
    use crate::recognition::template::tests::digit_templates;
    use image::{Rgb, RgbImage};

    struct StripSampler(image::GrayImage);

    impl Sampler for StripSampler {
        fn capture_region(&self, _rect: ScreenRect) -> Result<RgbImage, CaptureError> {
            Ok(image::DynamicImage::ImageLuma8(self.0.clone()).to_rgb8())
        }
    }

    struct PixelSampler(Rgb<u8>);

    impl Sampler for PixelSampler {
        fn capture_region(&self, rect: ScreenRect) -> Result<RgbImage, CaptureError> {
            Ok(RgbImage::from_pixel(rect.width, rect.height, self.0))
        }
    }

    fn price_signal(left: u32, right: u32) -> PriceSignal {
        let recognizer = PriceRecognizer::new(
            Arc::new(digit_templates()),
            ScreenRect::new(299, 176, 24, 17),
            11,
            0.95,
        );
        PriceSignal::new(recognizer, Arc::new(StripSampler(price_strip(left, right))))
    }

    #[test]
    fn test_price_signal_fires_with_payload() {
        let mut signal = price_signal(4, 5);
        assert_eq!(signal.kind(), EventKind::SixDigitPrice);
        assert_eq!(signal.sample(), Some(PurchaseEvent::price(450_000)));
    }

    #[test]
    fn test_price_below_six_digits_does_not_fire() {
        // A leading zero reads as a five-digit price.
        assert_eq!(price_signal(0, 5).sample(), None);
    }

    #[test]
    fn test_color_signal() {
        let probe = ColorProbe::new(1630, 889, [75, 79, 82], 10.0);
        let mut hit = ColorSignal::new(
            EventKind::NoItemsAvailable,
            probe,
            Arc::new(PixelSampler(Rgb([75, 79, 82]))),
        );
        assert_eq!(hit.sample(), Some(PurchaseEvent::no_items()));

        let mut miss = ColorSignal::new(
            EventKind::NoItemsAvailable,
            probe,
            Arc::new(PixelSampler(Rgb([255, 255, 255]))),
        );
        assert_eq!(miss.sample(), None);
    }
}
