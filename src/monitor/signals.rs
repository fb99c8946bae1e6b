//! Latest per-signal observations and the re-arm debounce counter.

use parking_lot::Mutex;

use super::event::EventKind;

/// Most recent presence observation of each tracked signal.
///
/// Locked independently of the dispatch state.
#[derive(Default)]
pub struct SignalStatusTable {
    present: Mutex<[bool; 3]>,
}

impl SignalStatusTable {
    pub fn publish(&self, kind: EventKind, present: bool) {
        self.present.lock()[kind.index()] = present;
    }

    pub fn is_present(&self, kind: EventKind) -> bool {
        self.present.lock()[kind.index()]
    }

    pub fn any_present(&self) -> bool {
        self.present.lock().iter().any(|&p| p)
    }
}

/// Counts contiguous all-clear observations while disarmed.
#[derive(Debug)]
pub struct RearmCounter {
    threshold: u32,
    clear: u32,
}

impl RearmCounter {
    /// A threshold of 0 behaves like 1: at least one all-clear poll is needed.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            clear: 0,
        }
    }

    /// Feeds one poll. Returns `true` when the monitor should re-arm.
    pub fn observe(&mut self, armed: bool, any_present: bool) -> bool {
        if armed || any_present {
            self.clear = 0;
            return false;
        }

        self.clear += 1;
        if self.clear >= self.threshold {
            self.clear = 0;
            return true;
        }
        false
    }

    pub fn clear_count(&self) -> u32 {
        self.clear
    }
}
