//! Cancellable background tasks.
//!
//! Every polling loop in the application runs as a named OS thread that owns a
//! clone of a [`StopToken`]. The loop checks the token at the top of each
//! iteration and sleeps through it, so raising the token wakes sleepers
//! immediately instead of waiting out their poll interval.

use parking_lot::{Condvar, Mutex};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::warn;

/// Shared cancellation flag for one or more tasks.
#[derive(Clone, Default)]
pub struct StopToken {
    inner: Arc<StopInner>,
}

#[derive(Default)]
struct StopInner {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag and wakes every task sleeping on this token.
    pub fn stop(&self) {
        let mut stopped = self.inner.stopped.lock();
        *stopped = true;
        self.inner.wake.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.stopped.lock()
    }

    /// Sleeps for `duration` or until the token is raised.
    ///
    /// Returns `true` if the token is raised. A zero duration only yields the
    /// thread, which keeps tight polling loops from starving their siblings.
    pub fn sleep(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            thread::yield_now();
            return self.is_stopped();
        }

        let deadline = Instant::now() + duration;
        let mut stopped = self.inner.stopped.lock();
        while !*stopped {
            if self
                .inner
                .wake
                .wait_until(&mut stopped, deadline)
                .timed_out()
            {
                break;
            }
        }
        *stopped
    }
}

/// Handle to a spawned task that can be joined with a bound.
pub struct TaskHandle {
    name: String,
    handle: JoinHandle<()>,
    finished: Receiver<()>,
}

/// Spawns `body` on a named thread.
pub fn spawn_task<F>(name: &str, body: F) -> std::io::Result<TaskHandle>
where
    F: FnOnce() + Send + 'static,
{
    let (finished_tx, finished) = mpsc::channel::<()>();
    let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
        // Dropped when the body returns or unwinds, which disconnects `finished`.
        let _finished_tx = finished_tx;
        body();
    })?;

    Ok(TaskHandle {
        name: name.to_string(),
        handle,
        finished,
    })
}

impl TaskHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits up to `timeout` for the task to finish.
    ///
    /// Returns `false` if the task did not finish in time; the thread is then
    /// detached and left to exit on its own.
    pub fn join_timeout(self, timeout: Duration) -> bool {
        match self.finished.recv_timeout(timeout) {
            Err(RecvTimeoutError::Disconnected) | Ok(()) => {
                if self.handle.join().is_err() {
                    warn!(task = %self.name, "task panicked");
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    task = %self.name,
                    timeout_ms = timeout.as_millis() as u64,
                    "task did not stop in time, detaching"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_sleep_wakes_on_stop() {
        let token = StopToken::new();
        let sleeper = token.clone();
        let started = Instant::now();
        let handle = spawn_task("sleeper", move || {
            assert!(sleeper.sleep(Duration::from_secs(30)));
        })
        .unwrap();

        thread::sleep(Duration::from_millis(50));
        token.stop();

        assert!(handle.join_timeout(Duration::from_secs(2)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_sleep_times_out_without_stop() {
        let token = StopToken::new();
        assert!(!token.sleep(Duration::from_millis(10)));
        assert!(!token.sleep(Duration::ZERO));
    }

    #[test]
    fn test_loop_exits_after_stop() {
        let token = StopToken::new();
        let counter = Arc::new(AtomicU32::new(0));

        let loop_token = token.clone();
        let loop_counter = counter.clone();
        let handle = spawn_task("counter", move || {
            while !loop_token.is_stopped() {
                loop_counter.fetch_add(1, Ordering::SeqCst);
                loop_token.sleep(Duration::from_millis(1));
            }
        })
        .unwrap();

        thread::sleep(Duration::from_millis(20));
        token.stop();
        assert!(handle.join_timeout(Duration::from_secs(1)));
        assert!(counter.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn test_join_timeout_detaches_unresponsive_task() {
        let release = StopToken::new();
        let blocked = release.clone();
        let handle = spawn_task("stuck", move || {
            // Ignores everything but its own release token.
            while !blocked.sleep(Duration::from_millis(5)) {}
        })
        .unwrap();

        assert_eq!(handle.name(), "stuck");
        assert!(!handle.join_timeout(Duration::from_millis(30)));
        release.stop();
    }

    #[test]
    fn test_join_reports_finished_after_panic() {
        let handle = spawn_task("panics", || panic!("boom")).unwrap();
        assert!(handle.join_timeout(Duration::from_secs(1)));
    }
}
