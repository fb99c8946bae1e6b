//! Session runner - the scheduled entry point.
//!
//! Waits for the configured start time, prepares the game window, starts the
//! clicker and the monitor, hands control to the session driver for the
//! configured duration, then shuts everything down and reports how many
//! coins were spent.

use anyhow::{Context, Result};
use image::GrayImage;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::automation::balance::{format_thousands, BalanceReader};
use crate::automation::clicker::{InputRepeatWorker, Pauser};
use crate::automation::config::AppConfig;
use crate::automation::input::InputInjector;
use crate::automation::recovery::UiRecovery;
use crate::automation::schedule;
use crate::automation::session::{SessionControl, SessionDriver, SessionSettings, SessionStats};
use crate::automation::task::StopToken;
use crate::capture::{Sampler, WindowHandle, WindowManager};
use crate::monitor::{ColorSignal, EventKind, PriceSignal, PurchaseStateMonitor, Signal};
use crate::ocr::TextReader;
use crate::recognition::{DigitTemplates, PriceRecognizer};

/// Wait between stopping the session and reading the final balance.
const SETTLE_BEFORE_FINAL_BALANCE: Duration = Duration::from_secs(1);

/// Platform collaborators for a run.
#[derive(Clone)]
pub struct Backends {
    pub sampler: Arc<dyn Sampler>,
    pub input: Arc<dyn InputInjector>,
    pub windows: Arc<dyn WindowManager>,
    /// `None` when Tesseract is unavailable
    pub reader: Option<Arc<dyn TextReader>>,
}

/// Template data loaded at startup.
#[derive(Clone)]
pub struct Resources {
    pub digits: Arc<DigitTemplates>,
    /// `None` disables balance reading
    pub coin: Option<GrayImage>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionReport {
    pub stats: SessionStats,
    pub initial_balance: Option<u64>,
    pub final_balance: Option<u64>,
}

impl SessionReport {
    /// Coins spent. `None` if the final balance could not be read; an
    /// unreadable starting balance counts as nothing spent.
    pub fn consumption(&self) -> Option<i64> {
        let end = self.final_balance? as i64;
        Some(self.initial_balance.map_or(0, |start| start as i64 - end))
    }
}

/// Builds the three watchers from the recognition settings.
pub fn build_signals(
    config: &AppConfig,
    digits: Arc<DigitTemplates>,
    sampler: Arc<dyn Sampler>,
) -> Vec<Box<dyn Signal>> {
    let rec = &config.recognition;
    let recognizer = PriceRecognizer::new(
        digits,
        rec.price_region,
        rec.digit_width,
        rec.confidence_threshold,
    );
    vec![
        Box::new(PriceSignal::new(recognizer, sampler.clone())),
        Box::new(ColorSignal::new(
            EventKind::NoItemsAvailable,
            rec.no_items_probe,
            sampler.clone(),
        )),
        Box::new(ColorSignal::new(
            EventKind::SevenDigitSeparator,
            rec.separator_probe,
            sampler,
        )),
    ]
}

fn find_game_window(config: &AppConfig, windows: &dyn WindowManager) -> Option<WindowHandle> {
    let w = &config.window;
    windows.find_target_window(&w.game_window_name, w.min_width, w.min_height)
}

/// Runs one session of `config.schedule.duration` seconds, starting now.
pub fn run_session(
    config: &AppConfig,
    backends: &Backends,
    resources: &Resources,
    control: &SessionControl,
) -> Result<SessionReport> {
    let stop = control.stop_token();
    let started = Instant::now();
    let deadline = started + config.session_duration();

    let window = find_game_window(config, backends.windows.as_ref());
    match window {
        Some(handle) => {
            backends.windows.restore_if_minimized(handle);
            backends.windows.set_topmost(handle, true);
        }
        None => warn!("Game window not found at session start, cannot pin it"),
    }

    let balance = match (&backends.reader, &resources.coin) {
        (Some(reader), Some(coin)) => Some(BalanceReader::new(
            backends.sampler.clone(),
            backends.input.clone(),
            reader.clone(),
            coin.clone(),
        )),
        _ => {
            warn!("Balance reading disabled");
            None
        }
    };
    let initial_balance = balance.as_ref().and_then(|b| b.read(stop));

    let recovery = Arc::new(UiRecovery::new(
        backends.sampler.clone(),
        backends.input.clone(),
        backends.reader.clone(),
    ));
    recovery.settle_trading_view(stop);

    let pauser = Pauser::new();
    let mut clicker = InputRepeatWorker::start(
        backends.input.clone(),
        config.click_location,
        config.timing.click_interval(),
        pauser.clone(),
    )
    .context("Failed to start clicker")?;

    let mut monitor = PurchaseStateMonitor::new(
        config.monitor,
        build_signals(config, resources.digits.clone(), backends.sampler.clone()),
    );
    monitor.start()?;

    info!(
        "Session running for {}s (Ctrl+P pause, Ctrl+Shift+Q abort)",
        config.schedule.duration
    );
    let driver = SessionDriver::new(
        monitor.handle(),
        backends.input.clone(),
        pauser,
        recovery,
        SessionSettings::from_config(config),
        control.clone(),
    );
    let stats = driver.run(deadline);

    monitor.stop();
    clicker.stop(config.monitor.stop_timeout());

    // The final read runs even after an abort.
    std::thread::sleep(SETTLE_BEFORE_FINAL_BALANCE);
    let final_balance = balance.as_ref().and_then(|b| b.read(&StopToken::new()));

    let report = SessionReport {
        stats,
        initial_balance,
        final_balance,
    };
    match report.consumption() {
        Some(spent) => info!("Time is up, total coins spent: {}", format_thousands(spent)),
        None => info!("Time is up, total coins spent: recognition failed"),
    }

    if let Some(handle) = window {
        backends.windows.set_topmost(handle, false);
    }
    info!("Session took {}s", started.elapsed().as_secs());
    Ok(report)
}

/// Waits for the daily start time, then runs one session.
///
/// Returns `None` if aborted before the start.
pub fn run_scheduled(
    config: &AppConfig,
    backends: &Backends,
    resources: &Resources,
    control: &SessionControl,
) -> Result<Option<SessionReport>> {
    let at = schedule::parse_time_of_day(&config.schedule.execution_time)?;
    info!(
        "Starting at {}, running for {}s",
        config.schedule.execution_time, config.schedule.duration
    );

    if !schedule::wait_until(at, control.stop_token()) {
        info!("Aborted before the session started");
        return Ok(None);
    }
    run_session(config, backends, resources, control).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::clicker::tests::{Action, RecordingInjector};
    use crate::automation::input::MouseButton;
    use crate::capture::{CaptureError, ScreenRect};
    use crate::recognition::template::tests::digit_templates;
    use image::{Rgb, RgbImage};
    use parking_lot::Mutex;

    struct BlankScreen;

    impl Sampler for BlankScreen {
        fn capture_region(&self, rect: ScreenRect) -> Result<RgbImage, CaptureError> {
            Ok(RgbImage::from_pixel(rect.width, rect.height, Rgb([0, 0, 0])))
        }
    }

    #[derive(Default)]
    struct FakeWindows {
        topmost: Mutex<Vec<bool>>,
    }

    impl WindowManager for FakeWindows {
        fn find_target_window(&self, _name: &str, _w: i32, _h: i32) -> Option<WindowHandle> {
            Some(WindowHandle(7))
        }

        fn set_topmost(&self, _handle: WindowHandle, topmost: bool) -> bool {
            self.topmost.lock().push(topmost);
            true
        }

        fn restore_if_minimized(&self, _handle: WindowHandle) {}
    }

    fn report(initial: Option<u64>, end: Option<u64>) -> SessionReport {
        SessionReport {
            stats: SessionStats::default(),
            initial_balance: initial,
            final_balance: end,
        }
    }

    #[test]
    fn test_consumption() {
        assert_eq!(report(Some(1_000_000), Some(550_000)).consumption(), Some(450_000));
        assert_eq!(report(None, Some(550_000)).consumption(), Some(0));
        assert_eq!(report(Some(1_000_000), None).consumption(), None);
    }

    #[test]
    fn test_build_signals_covers_every_kind() {
        let signals = build_signals(
            &AppConfig::default(),
            Arc::new(digit_templates()),
            Arc::new(BlankScreen),
        );
        let kinds: Vec<_> = signals.iter().map(|s| s.kind()).collect();
        assert_eq!(kinds, EventKind::ALL.to_vec());
    }

    #[test]
    fn test_session_pins_window_and_clicks_until_deadline() {
        let mut config = AppConfig::default();
        config.schedule.duration = 1;
        config.timing.click_interval_ms = 50;
        config.monitor.poll_interval_ms = 5;

        let input = Arc::new(RecordingInjector::default());
        let windows = Arc::new(FakeWindows::default());
        let backends = Backends {
            sampler: Arc::new(BlankScreen),
            input: input.clone(),
            windows: windows.clone(),
            reader: None,
        };
        let resources = Resources {
            digits: Arc::new(digit_templates()),
            coin: None,
        };

        let report = run_session(&config, &backends, &resources, &SessionControl::new()).unwrap();

        assert_eq!(report.stats.purchases, 0);
        assert_eq!(report.consumption(), None);
        assert_eq!(*windows.topmost.lock(), vec![true, false]);

        let actions = input.actions();
        // Prologue: favourites slot three times, then esc.
        assert_eq!(actions[0], Action::Move(660, 240));
        assert_eq!(actions[1], Action::Click(MouseButton::Left));
        assert_eq!(actions[6], Action::Key("esc".to_string()));
        // Then the clicker takes over.
        assert!(actions[7..].contains(&Action::Move(config.click_location.x, config.click_location.y)));
    }

    #[test]
    fn test_scheduled_run_aborted_before_start() {
        let control = SessionControl::new();
        control.abort();
        let backends = Backends {
            sampler: Arc::new(BlankScreen),
            input: Arc::new(RecordingInjector::default()),
            windows: Arc::new(FakeWindows::default()),
            reader: None,
        };
        let resources = Resources {
            digits: Arc::new(digit_templates()),
            coin: None,
        };
        let outcome = run_scheduled(&AppConfig::default(), &backends, &resources, &control).unwrap();
        assert!(outcome.is_none());
    }
}
