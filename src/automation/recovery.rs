//! UI recovery.
//!
//! Long sessions drift: the market throws a ban notice, a sub-dialog stays
//! open, or the client falls back to a lobby. Recovery repeatedly classifies
//! the current screen by a handful of pixel probes and presses its way back to
//! the trading view. Reaching the trading view from the Operations lobby needs
//! the game mode to have been cycled once (Operations -> Warfare -> Operations),
//! which resets the market tab.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::input::{InputInjector, MouseButton};
use super::task::StopToken;
use crate::capture::{Sampler, ScreenRect};
use crate::ocr::{TextMode, TextReader};
use crate::recognition::ColorProbe;

const BAN_NOTICE_REGION: ScreenRect = ScreenRect::new(814, 477, 19, 21);
const BAN_NOTICE_TEXT: &str = "为";

const AMMO_DIALOG: ColorProbe = ColorProbe::with_default_threshold(1771, 362, [234, 235, 235]);
const MARKET_MAIN_LIGHT: ColorProbe = ColorProbe::with_default_threshold(180, 106, [191, 195, 195]);
const MARKET_MAIN_DARK: ColorProbe = ColorProbe::with_default_threshold(180, 106, [81, 84, 85]);
const OPERATIONS_LOBBY: ColorProbe = ColorProbe::with_default_threshold(1459, 1043, [67, 70, 72]);
const WARFARE_LOBBY: ColorProbe = ColorProbe::with_default_threshold(1415, 1053, [82, 86, 88]);
const MARKET_TAB_ACTIVE: ColorProbe = ColorProbe::with_default_threshold(720, 77, [91, 197, 146]);

const SELECTOR_TOP_ON_OPERATIONS: ColorProbe =
    ColorProbe::with_default_threshold(104, 330, [233, 234, 234]);
const SELECTOR_BOTTOM_ON_OPERATIONS: ColorProbe =
    ColorProbe::with_default_threshold(104, 550, [99, 100, 99]);
const SELECTOR_TOP_ON_WARFARE: ColorProbe =
    ColorProbe::with_default_threshold(104, 330, [88, 88, 89]);
const SELECTOR_BOTTOM_ON_WARFARE: ColorProbe =
    ColorProbe::with_default_threshold(104, 550, [234, 235, 235]);

const MARKET_TAB: (i32, i32) = (720, 80);
const MODE_MENU: (i32, i32) = (250, 380);
/// First favourites slot in the trading view.
pub const FAVOURITE_SLOT: (i32, i32) = (660, 240);

/// Screens recovery knows how to leave.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Screen {
    BanNotice,
    AmmoDialog,
    MarketMain,
    OperationsLobby,
    WarfareLobby,
    ModeSelectOnOperations,
    ModeSelectOnWarfare,
    Unknown,
}

pub struct UiRecovery {
    sampler: Arc<dyn Sampler>,
    input: Arc<dyn InputInjector>,
    reader: Option<Arc<dyn TextReader>>,
    /// Scales every delay; 1.0 is real time.
    pace: f32,
}

impl UiRecovery {
    pub fn new(
        sampler: Arc<dyn Sampler>,
        input: Arc<dyn InputInjector>,
        reader: Option<Arc<dyn TextReader>>,
    ) -> Self {
        Self {
            sampler,
            input,
            reader,
            pace: 1.0,
        }
    }

    pub fn with_pace(mut self, pace: f32) -> Self {
        self.pace = pace.max(0.0);
        self
    }

    /// Sleeps `ms` milliseconds (scaled). Returns `true` if stopped.
    fn wait(&self, stop: &StopToken, ms: u64) -> bool {
        stop.sleep(Duration::from_millis(ms).mul_f32(self.pace))
    }

    fn matches(&self, probe: &ColorProbe) -> bool {
        probe.matches(self.sampler.as_ref())
    }

    fn shows_ban_notice(&self) -> bool {
        let Some(reader) = &self.reader else {
            return false;
        };
        let image = match self.sampler.capture_region_gray(BAN_NOTICE_REGION) {
            Ok(image) => image,
            Err(e) => {
                debug!(error = %e, "ban notice capture failed");
                return false;
            }
        };
        match reader.read_text(&image, TextMode::Chinese) {
            Ok(text) => text.trim() == BAN_NOTICE_TEXT,
            Err(e) => {
                debug!(error = %e, "ban notice OCR failed");
                false
            }
        }
    }

    /// Classifies the current screen. Earlier checks win.
    pub fn classify(&self) -> Screen {
        if self.shows_ban_notice() {
            Screen::BanNotice
        } else if self.matches(&AMMO_DIALOG) {
            Screen::AmmoDialog
        } else if self.matches(&MARKET_MAIN_LIGHT) || self.matches(&MARKET_MAIN_DARK) {
            Screen::MarketMain
        } else if self.matches(&OPERATIONS_LOBBY) {
            Screen::OperationsLobby
        } else if self.matches(&WARFARE_LOBBY) {
            Screen::WarfareLobby
        } else if self.matches(&SELECTOR_TOP_ON_OPERATIONS)
            && self.matches(&SELECTOR_BOTTOM_ON_OPERATIONS)
        {
            Screen::ModeSelectOnOperations
        } else if self.matches(&SELECTOR_TOP_ON_WARFARE)
            && self.matches(&SELECTOR_BOTTOM_ON_WARFARE)
        {
            Screen::ModeSelectOnWarfare
        } else {
            Screen::Unknown
        }
    }

    fn press(&self, key: &str) {
        if let Err(e) = self.input.key_press(key) {
            warn!(key, error = %e, "key press failed");
        }
    }

    /// Moves the cursor down by `dy`, clicks, and moves it back.
    fn nudge_click(&self, stop: &StopToken, dy: i32) -> bool {
        self.input.move_relative(0, dy);
        if self.wait(stop, 200) {
            return true;
        }
        self.input.click(MouseButton::Left);
        if self.wait(stop, 100) {
            return true;
        }
        self.input.move_relative(0, -dy);
        false
    }

    fn select_mode(&self, stop: &StopToken, dy: i32) -> bool {
        self.input.move_cursor(MODE_MENU.0, MODE_MENU.1);
        for _ in 0..3 {
            if self.nudge_click(stop, dy) {
                return true;
            }
        }
        if self.wait(stop, 500) {
            return true;
        }
        // Dismiss the event banner
        self.press("space");
        false
    }

    /// Clicks the first favourites slot three times and closes the item view.
    ///
    /// Returns `true` if stopped part way.
    pub fn settle_trading_view(&self, stop: &StopToken) -> bool {
        for _ in 0..3 {
            self.input
                .click_at(FAVOURITE_SLOT.0, FAVOURITE_SLOT.1, MouseButton::Left);
            if self.wait(stop, 200) {
                return true;
            }
        }
        self.press("esc");
        self.wait(stop, 500)
    }

    fn return_to_market(&self, stop: &StopToken) -> bool {
        self.input.move_cursor(MARKET_TAB.0, MARKET_TAB.1);
        if !self.matches(&MARKET_TAB_ACTIVE) && self.nudge_click(stop, -20) {
            return true;
        }
        if self.wait(stop, 500) {
            return true;
        }
        self.settle_trading_view(stop)
    }

    /// Runs until the trading view is reached.
    ///
    /// Returns `false` if `stop` is raised or `deadline` passes first.
    pub fn run(&self, stop: &StopToken, deadline: Instant) -> bool {
        info!("Refreshing trading view");
        let mut mode_cycled = false;

        loop {
            if self.wait(stop, 500) || Instant::now() >= deadline {
                info!("Recovery interrupted");
                return false;
            }

            let screen = self.classify();
            debug!(?screen, mode_cycled, "recovery step");

            match screen {
                Screen::BanNotice
                | Screen::AmmoDialog
                | Screen::MarketMain
                | Screen::WarfareLobby => self.press("esc"),
                Screen::OperationsLobby if mode_cycled => {
                    if self.return_to_market(stop) {
                        return false;
                    }
                    info!("Back in the trading view");
                    return true;
                }
                Screen::OperationsLobby => self.press("esc"),
                Screen::ModeSelectOnOperations => {
                    if self.select_mode(stop, 20) {
                        return false;
                    }
                }
                Screen::ModeSelectOnWarfare => {
                    if self.select_mode(stop, -20) {
                        return false;
                    }
                    mode_cycled = true;
                }
                Screen::Unknown => {}
            }
        }
    }
}
