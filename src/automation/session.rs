//! Session driver: turns monitor events into purchases.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::clicker::{PauseGuard, Pauser};
use super::config::{AppConfig, LimitConfig};
use super::input::{InputInjector, MouseButton};
use super::recovery::UiRecovery;
use super::task::StopToken;
use crate::monitor::{EventKind, MonitorHandle, PurchaseEvent};

/// Purchase button in the item view.
const PURCHASE_BUTTON: (i32, i32) = (1746, 900);
const PURCHASE_NUDGE: (i32, i32) = (0, 10);
const OPERATOR_PAUSE_POLL: Duration = Duration::from_millis(100);

/// Operator controls shared with the hotkey listener.
#[derive(Clone, Default)]
pub struct SessionControl {
    paused: Arc<Mutex<bool>>,
    abort: StopToken,
}

impl SessionControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips the pause state and returns the new one.
    pub fn toggle_pause(&self) -> bool {
        let mut paused = self.paused.lock();
        *paused = !*paused;
        if *paused {
            info!("Session paused");
        } else {
            info!("Session resumed");
        }
        *paused
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.lock()
    }

    /// Ends the session (and any wait before it) as soon as possible.
    pub fn abort(&self) {
        info!("Abort requested");
        self.abort.stop();
    }

    pub fn stop_token(&self) -> &StopToken {
        &self.abort
    }
}

/// Periodic UI refresh run between events.
pub trait Refresh: Send + Sync {
    /// Returns `true` once the trading view is showing again.
    fn refresh(&self, stop: &StopToken, deadline: Instant) -> bool;
}

impl Refresh for UiRecovery {
    fn refresh(&self, stop: &StopToken, deadline: Instant) -> bool {
        self.run(stop, deadline)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SessionSettings {
    pub limit: LimitConfig,
    pub event_timeout: Duration,
    pub refresh_interval: Duration,
    /// Wait after clicking the purchase button
    pub purchase_delay: Duration,
}

impl SessionSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            limit: config.limit,
            event_timeout: config.timing.event_timeout(),
            refresh_interval: config.refresh_interval(),
            purchase_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub purchases: u32,
    pub skipped: u32,
    pub dismissed: u32,
    pub refreshes: u32,
}

pub struct SessionDriver {
    monitor: MonitorHandle,
    input: Arc<dyn InputInjector>,
    pauser: Pauser,
    refresher: Arc<dyn Refresh>,
    settings: SessionSettings,
    control: SessionControl,
}

impl SessionDriver {
    pub fn new(
        monitor: MonitorHandle,
        input: Arc<dyn InputInjector>,
        pauser: Pauser,
        refresher: Arc<dyn Refresh>,
        settings: SessionSettings,
        control: SessionControl,
    ) -> Self {
        Self {
            monitor,
            input,
            pauser,
            refresher,
            settings,
            control,
        }
    }

    fn press_esc(&self) {
        if let Err(e) = self.input.key_press("esc") {
            warn!(error = %e, "esc failed");
        }
    }

    fn buy(&self, stop: &StopToken) {
        let _pause = self.pauser.pause();
        self.input.move_cursor(PURCHASE_BUTTON.0, PURCHASE_BUTTON.1);
        self.input.move_relative(PURCHASE_NUDGE.0, PURCHASE_NUDGE.1);
        self.input.click(MouseButton::Left);
        stop.sleep(self.settings.purchase_delay);
    }

    fn handle_event(&self, event: PurchaseEvent, stats: &mut SessionStats, stop: &StopToken) {
        match (event.kind, event.price) {
            (EventKind::SixDigitPrice, Some(price)) if self.settings.limit.contains(price) => {
                info!("Price {} within limit, buying", price);
                self.buy(stop);
                stats.purchases += 1;
            }
            (EventKind::SixDigitPrice, price) => {
                debug!(?price, "price outside limit");
                stats.skipped += 1;
            }
            (kind, _) => {
                debug!(%kind, "dismissing");
                stats.dismissed += 1;
            }
        }
        self.press_esc();
    }

    /// Runs until `deadline` or an abort.
    pub fn run(&self, deadline: Instant) -> SessionStats {
        let stop = self.control.stop_token();
        let mut stats = SessionStats::default();
        let mut last_refresh = Instant::now();
        let mut operator_pause: Option<PauseGuard> = None;

        while Instant::now() < deadline && !stop.is_stopped() {
            if self.control.is_paused() {
                if operator_pause.is_none() {
                    operator_pause = Some(self.pauser.pause());
                }
                stop.sleep(OPERATOR_PAUSE_POLL);
                continue;
            }
            operator_pause = None;

            if last_refresh.elapsed() >= self.settings.refresh_interval {
                let refreshed = {
                    let _pause = self.pauser.pause();
                    self.refresher.refresh(stop, deadline)
                };
                last_refresh = Instant::now();
                stats.refreshes += 1;
                if refreshed {
                    if let Some(stale) = self.monitor.clear_pending() {
                        debug!(?stale, "dropped event from before refresh");
                    }
                }
                continue;
            }

            if let Some(event) = self.monitor.get_event(self.settings.event_timeout) {
                self.handle_event(event, &mut stats, stop);
            }
        }

        drop(operator_pause);
        info!(
            purchases = stats.purchases,
            skipped = stats.skipped,
            dismissed = stats.dismissed,
            refreshes = stats.refreshes,
            "Session finished"
        );
        stats
    }
}
