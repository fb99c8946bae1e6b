//! Purchase state monitor.
//!
//! Three signal watchers poll the screen in parallel. The first one to detect
//! its condition while the monitor is armed puts a single event into the slot
//! and disarms the monitor; concurrent detections are dropped. A fourth loop
//! re-arms the monitor once every signal has been clear for
//! `rearm_clear_consecutive` polls in a row.
//!
//! The armed flag and the event slot share one lock, so firing, draining and
//! re-arming are each atomic with respect to the others.

pub mod event;
pub mod signals;
pub mod watcher;

pub use event::{EventKind, PurchaseEvent};
pub use watcher::{ColorSignal, PriceSignal, Signal};

use anyhow::{bail, Context, Result};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::automation::task::{spawn_task, StopToken, TaskHandle};
use signals::SignalStatusTable;

/// Timing of the monitor loops.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Sleep between polls of each watcher (0 = yield only)
    pub poll_interval_ms: u64,
    /// All-clear polls required before re-arming
    pub rearm_clear_consecutive: u32,
    /// Bound on joining each loop during `stop`
    pub stop_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 0,
            rearm_clear_consecutive: 1,
            stop_timeout_ms: 1000,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

struct DispatchState {
    armed: bool,
    pending: Option<PurchaseEvent>,
}

/// Armed flag plus the single-event slot.
pub(crate) struct Dispatch {
    state: Mutex<DispatchState>,
    ready: Condvar,
}

impl Dispatch {
    fn new() -> Self {
        Self {
            state: Mutex::new(DispatchState {
                armed: true,
                pending: None,
            }),
            ready: Condvar::new(),
        }
    }

    /// Replaces the slot and disarms if armed. Returns whether the event was accepted.
    pub(crate) fn try_fire(&self, event: PurchaseEvent) -> bool {
        let mut state = self.state.lock();
        if !state.armed {
            return false;
        }
        state.pending = Some(event);
        state.armed = false;
        self.ready.notify_one();
        true
    }

    fn take(&self, timeout: Duration) -> Option<PurchaseEvent> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.pending.is_none() {
            if self.ready.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.pending.take()
    }

    fn clear(&self) -> Option<PurchaseEvent> {
        self.state.lock().pending.take()
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.state.lock().armed
    }

    pub(crate) fn rearm(&self) {
        self.state.lock().armed = true;
    }
}

/// State shared between the monitor loops and its handles.
pub(crate) struct Shared {
    pub(crate) dispatch: Dispatch,
    pub(crate) signals: SignalStatusTable,
}

/// Consumer side of the monitor. Cheap to clone.
#[derive(Clone)]
pub struct MonitorHandle {
    shared: Arc<Shared>,
}

impl MonitorHandle {
    /// Waits up to `timeout` for the next event.
    pub fn get_event(&self, timeout: Duration) -> Option<PurchaseEvent> {
        self.shared.dispatch.take(timeout)
    }

    /// Drops an unread event, if any. Returns what was dropped.
    pub fn clear_pending(&self) -> Option<PurchaseEvent> {
        self.shared.dispatch.clear()
    }

    pub fn is_armed(&self) -> bool {
        self.shared.dispatch.is_armed()
    }

    pub fn is_present(&self, kind: EventKind) -> bool {
        self.shared.signals.is_present(kind)
    }
}

/// Owns the watcher and re-arm loops.
pub struct PurchaseStateMonitor {
    config: MonitorConfig,
    shared: Arc<Shared>,
    signals: Option<Vec<Box<dyn Signal>>>,
    stop: StopToken,
    tasks: Vec<TaskHandle>,
}

impl PurchaseStateMonitor {
    pub fn new(config: MonitorConfig, signals: Vec<Box<dyn Signal>>) -> Self {
        Self {
            config,
            shared: Arc::new(Shared {
                dispatch: Dispatch::new(),
                signals: SignalStatusTable::default(),
            }),
            signals: Some(signals),
            stop: StopToken::new(),
            tasks: Vec::new(),
        }
    }

    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle {
            shared: self.shared.clone(),
        }
    }

    /// Launches one loop per signal and the re-arm loop.
    pub fn start(&mut self) -> Result<()> {
        let Some(signals) = self.signals.take() else {
            bail!("Monitor already started");
        };

        let poll_interval = self.config.poll_interval();
        for signal in signals {
            let name = format!("watch-{}", signal.kind());
            let shared = self.shared.clone();
            let stop = self.stop.clone();
            let task = spawn_task(&name, move || {
                watcher::run_signal_watcher(signal, shared, stop, poll_interval)
            });
            match task {
                Ok(task) => self.tasks.push(task),
                Err(e) => {
                    self.stop();
                    return Err(e).with_context(|| format!("Failed to spawn {}", name));
                }
            }
        }

        let shared = self.shared.clone();
        let stop = self.stop.clone();
        let threshold = self.config.rearm_clear_consecutive;
        let rearm = spawn_task("rearm", move || {
            watcher::run_rearm_watcher(shared, stop, poll_interval, threshold)
        });
        match rearm {
            Ok(task) => self.tasks.push(task),
            Err(e) => {
                self.stop();
                return Err(e).context("Failed to spawn re-arm loop");
            }
        }

        info!(
            loops = self.tasks.len(),
            poll_interval_ms = self.config.poll_interval_ms,
            rearm_clear_consecutive = self.config.rearm_clear_consecutive,
            "Monitor started"
        );
        Ok(())
    }

    /// Stops every loop, joining each with the configured bound.
    ///
    /// Returns `true` if all loops exited in time. Safe to call repeatedly.
    pub fn stop(&mut self) -> bool {
        self.stop.stop();
        if self.tasks.is_empty() {
            return true;
        }

        let timeout = self.config.stop_timeout();
        let mut clean = true;
        for task in self.tasks.drain(..) {
            clean &= task.join_timeout(timeout);
        }

        if clean {
            info!("Monitor stopped");
        } else {
            warn!("Monitor stopped with detached loops");
        }
        clean
    }

    pub fn get_event(&self, timeout: Duration) -> Option<PurchaseEvent> {
        self.shared.dispatch.take(timeout)
    }

    pub fn clear_pending(&self) -> Option<PurchaseEvent> {
        self.shared.dispatch.clear()
    }
}

impl Drop for PurchaseStateMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Barrier;
    use std::thread;

    /// Signal whose presence is toggled by the test.
    pub(crate) struct FlagSignal {
        pub(crate) kind: EventKind,
        pub(crate) present: Arc<AtomicBool>,
        pub(crate) price: Option<u32>,
    }

    impl FlagSignal {
        pub(crate) fn new(kind: EventKind, price: Option<u32>) -> (Self, Arc<AtomicBool>) {
            let present = Arc::new(AtomicBool::new(false));
            (
                Self {
                    kind,
                    present: present.clone(),
                    price,
                },
                present,
            )
        }
    }

    impl Signal for FlagSignal {
        fn kind(&self) -> EventKind {
            self.kind
        }

        fn sample(&mut self) -> Option<PurchaseEvent> {
            self.present.load(Ordering::SeqCst).then_some(PurchaseEvent {
                kind: self.kind,
                price: self.price,
            })
        }
    }

    pub(crate) fn test_config() -> MonitorConfig {
        MonitorConfig {
            poll_interval_ms: 1,
            rearm_clear_consecutive: 1,
            stop_timeout_ms: 1000,
        }
    }

    pub(crate) fn wait_for(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        condition()
    }

    #[test]
    fn test_fire_disarms_and_suppresses_until_rearm() {
        let dispatch = Dispatch::new();
        for event in [
            PurchaseEvent::price(450_000),
            PurchaseEvent::no_items(),
            PurchaseEvent::separator(),
        ] {
            assert!(dispatch.is_armed());
            assert!(dispatch.try_fire(event));
            assert!(!dispatch.is_armed());
            assert!(!dispatch.try_fire(PurchaseEvent::no_items()));

            assert_eq!(dispatch.take(Duration::from_millis(10)), Some(event));
            assert_eq!(dispatch.take(Duration::from_millis(10)), None);
            dispatch.rearm();
        }
    }

    #[test]
    fn test_fire_replaces_stale_event() {
        let dispatch = Dispatch::new();
        assert!(dispatch.try_fire(PurchaseEvent::no_items()));
        dispatch.rearm();
        assert!(dispatch.try_fire(PurchaseEvent::price(300_000)));
        assert_eq!(
            dispatch.take(Duration::from_millis(10)),
            Some(PurchaseEvent::price(300_000))
        );
        assert_eq!(dispatch.take(Duration::from_millis(10)), None);
    }

    #[test]
    fn test_concurrent_fires_yield_one_event() {
        for _ in 0..50 {
            let dispatch = Arc::new(Dispatch::new());
            let barrier = Arc::new(Barrier::new(3));
            let accepted = Arc::new(AtomicU32::new(0));

            let threads: Vec<_> = [
                PurchaseEvent::price(200_000),
                PurchaseEvent::no_items(),
                PurchaseEvent::separator(),
            ]
            .into_iter()
            .map(|event| {
                let dispatch = dispatch.clone();
                let barrier = barrier.clone();
                let accepted = accepted.clone();
                thread::spawn(move || {
                    barrier.wait();
                    if dispatch.try_fire(event) {
                        accepted.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
            for t in threads {
                t.join().unwrap();
            }

            assert_eq!(accepted.load(Ordering::SeqCst), 1);
            assert!(dispatch.take(Duration::from_millis(10)).is_some());
            assert_eq!(dispatch.take(Duration::from_millis(1)), None);
        }
    }

    #[test]
    fn test_empty_get_event_has_no_side_effects() {
        let monitor = PurchaseStateMonitor::new(test_config(), Vec::new());
        let handle = monitor.handle();
        for _ in 0..5 {
            assert_eq!(handle.get_event(Duration::from_millis(5)), None);
            assert!(handle.is_armed());
        }
        assert_eq!(handle.clear_pending(), None);
    }

    #[test]
    fn test_get_event_wakes_on_fire() {
        let dispatch = Arc::new(Dispatch::new());
        let firer = dispatch.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            firer.try_fire(PurchaseEvent::separator())
        });

        let started = Instant::now();
        assert_eq!(
            dispatch.take(Duration::from_secs(5)),
            Some(PurchaseEvent::separator())
        );
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(t.join().unwrap());
    }

    #[test]
    fn test_clear_pending_never_loses_a_concurrent_fire() {
        for _ in 0..200 {
            let dispatch = Arc::new(Dispatch::new());
            let barrier = Arc::new(Barrier::new(2));

            let firer = {
                let dispatch = dispatch.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    dispatch.try_fire(PurchaseEvent::no_items())
                })
            };
            barrier.wait();
            let cleared = dispatch.clear();
            let fired = firer.join().unwrap();
            let remaining = dispatch.take(Duration::ZERO);

            assert!(fired);
            // Exactly one of the two sides holds the event.
            assert_eq!(
                cleared.is_some() as u8 + remaining.is_some() as u8,
                1,
                "cleared={:?} remaining={:?}",
                cleared,
                remaining
            );
            assert!(!dispatch.is_armed());
        }
    }

    #[test]
    fn test_monitor_fires_once_then_rearms_after_clear() {
        let (signal, present) = FlagSignal::new(EventKind::SixDigitPrice, Some(450_000));
        let mut monitor = PurchaseStateMonitor::new(test_config(), vec![Box::new(signal)]);
        let handle = monitor.handle();
        monitor.start().unwrap();

        present.store(true, Ordering::SeqCst);
        assert_eq!(
            handle.get_event(Duration::from_secs(2)),
            Some(PurchaseEvent::price(450_000))
        );

        // Still present: suppressed, no second event.
        assert_eq!(handle.get_event(Duration::from_millis(50)), None);
        assert!(!handle.is_armed());

        present.store(false, Ordering::SeqCst);
        assert!(wait_for(|| handle.is_armed(), Duration::from_secs(2)));

        present.store(true, Ordering::SeqCst);
        assert_eq!(
            handle.get_event(Duration::from_secs(2)),
            Some(PurchaseEvent::price(450_000))
        );

        assert!(monitor.stop());
    }

    #[test]
    fn test_one_present_signal_blocks_rearm() {
        let (price, price_present) = FlagSignal::new(EventKind::SixDigitPrice, Some(120_000));
        let (no_items, no_items_present) = FlagSignal::new(EventKind::NoItemsAvailable, None);
        let mut monitor =
            PurchaseStateMonitor::new(test_config(), vec![Box::new(price), Box::new(no_items)]);
        let handle = monitor.handle();
        monitor.start().unwrap();

        no_items_present.store(true, Ordering::SeqCst);
        assert_eq!(
            handle.get_event(Duration::from_secs(2)),
            Some(PurchaseEvent::no_items())
        );

        // The price appearing while disarmed is dropped, and keeps the monitor disarmed.
        price_present.store(true, Ordering::SeqCst);
        assert!(wait_for(
            || handle.is_present(EventKind::SixDigitPrice),
            Duration::from_secs(2)
        ));
        no_items_present.store(false, Ordering::SeqCst);
        assert!(wait_for(
            || handle.is_present(EventKind::SixDigitPrice)
                && !handle.is_present(EventKind::NoItemsAvailable),
            Duration::from_secs(2)
        ));
        assert_eq!(handle.get_event(Duration::from_millis(50)), None);
        assert!(!handle.is_armed());

        price_present.store(false, Ordering::SeqCst);
        assert!(wait_for(|| handle.is_armed(), Duration::from_secs(2)));

        monitor.stop();
    }

    #[test]
    fn test_start_twice_is_an_error() {
        let mut monitor = PurchaseStateMonitor::new(test_config(), Vec::new());
        monitor.start().unwrap();
        assert!(monitor.start().is_err());
        monitor.stop();
    }

    #[test]
    fn test_stop_joins_and_is_idempotent() {
        let (signal, _present) = FlagSignal::new(EventKind::SevenDigitSeparator, None);
        let mut monitor = PurchaseStateMonitor::new(
            MonitorConfig {
                poll_interval_ms: 10_000,
                ..test_config()
            },
            vec![Box::new(signal)],
        );
        monitor.start().unwrap();

        let started = Instant::now();
        assert!(monitor.stop());
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(monitor.stop());
    }

    #[test]
    fn test_config_defaults_fill_missing_fields() {
        let config: MonitorConfig = serde_json::from_str(r#"{"poll_interval_ms": 5}"#).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(5));
        assert_eq!(config.rearm_clear_consecutive, 1);
        assert_eq!(config.stop_timeout(), Duration::from_secs(1));
    }
}
