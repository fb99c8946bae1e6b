//! Input repeat worker.
//!
//! Clicks a fixed point at a fixed interval to keep the trading view
//! refreshing. Every click happens while holding the pause gate, so a
//! [`Pauser::pause`] call returns only once any in-flight click is complete
//! and no further click can start until every guard is dropped.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::config::Point;
use super::input::{InputInjector, MouseButton};
use super::task::{spawn_task, StopToken, TaskHandle};

/// Sleep between gate checks while paused.
const PAUSED_POLL: Duration = Duration::from_millis(50);

/// Shared pause control. Cheap to clone.
#[derive(Clone, Default)]
pub struct Pauser {
    /// Number of outstanding pause guards
    depth: Arc<Mutex<u32>>,
}

impl Pauser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pauses the worker until the returned guard is dropped. Pauses nest.
    pub fn pause(&self) -> PauseGuard {
        *self.depth.lock() += 1;
        PauseGuard {
            depth: self.depth.clone(),
        }
    }

    pub fn is_paused(&self) -> bool {
        *self.depth.lock() > 0
    }
}

/// Resumes the worker when dropped, unless other guards are still held.
#[must_use = "the worker resumes as soon as the guard is dropped"]
pub struct PauseGuard {
    depth: Arc<Mutex<u32>>,
}

impl Drop for PauseGuard {
    fn drop(&mut self) {
        let mut depth = self.depth.lock();
        *depth = depth.saturating_sub(1);
    }
}

pub struct InputRepeatWorker {
    pauser: Pauser,
    stop: StopToken,
    task: Option<TaskHandle>,
}

impl InputRepeatWorker {
    /// Starts clicking `target` every `interval`.
    pub fn start(
        injector: Arc<dyn InputInjector>,
        target: Point,
        interval: Duration,
        pauser: Pauser,
    ) -> std::io::Result<Self> {
        let stop = StopToken::new();
        let task = {
            let pauser = pauser.clone();
            let stop = stop.clone();
            spawn_task("clicker", move || {
                run_click_loop(injector.as_ref(), target, interval, &pauser, &stop)
            })?
        };

        info!(x = target.x, y = target.y, interval_ms = interval.as_millis() as u64, "Clicker started");
        Ok(Self {
            pauser,
            stop,
            task: Some(task),
        })
    }

    pub fn pauser(&self) -> &Pauser {
        &self.pauser
    }

    /// Stops the loop, waiting up to `timeout` for it to exit.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        self.stop.stop();
        match self.task.take() {
            Some(task) => {
                let clean = task.join_timeout(timeout);
                info!("Clicker stopped");
                clean
            }
            None => true,
        }
    }
}

impl Drop for InputRepeatWorker {
    fn drop(&mut self) {
        self.stop(Duration::from_secs(1));
    }
}

fn run_click_loop(
    injector: &dyn InputInjector,
    target: Point,
    interval: Duration,
    pauser: &Pauser,
    stop: &StopToken,
) {
    while !stop.is_stopped() {
        let clicked = {
            let depth = pauser.depth.lock();
            if *depth == 0 {
                injector.click_at(target.x, target.y, MouseButton::Left);
                true
            } else {
                false
            }
        };

        let wait = if clicked { interval } else { PAUSED_POLL };
        if stop.sleep(wait) {
            break;
        }
    }
    debug!("click loop exited");
}
