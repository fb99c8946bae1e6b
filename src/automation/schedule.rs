//! Daily start time handling.

use anyhow::{anyhow, Result};
use chrono::{Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime};
use std::time::Duration;
use tracing::info;

use super::task::StopToken;

/// Parses "HH:MM" or "HH:MM:SS".
pub fn parse_time_of_day(text: &str) -> Result<NaiveTime> {
    let text = text.trim();
    NaiveTime::parse_from_str(text, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
        .map_err(|_| anyhow!("invalid time of day {:?}, expected HH:MM or HH:MM:SS", text))
}

/// Next occurrence of `at` strictly after `now`: today if still ahead,
/// otherwise tomorrow.
pub fn next_run_after(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(at);
    if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    }
}

/// Blocks until the next occurrence of `at` in local time.
///
/// Returns `false` if `stop` is raised first.
pub fn wait_until(at: NaiveTime, stop: &StopToken) -> bool {
    let now = Local::now().naive_local();
    let start = next_run_after(now, at);
    let wait = (start - now).to_std().unwrap_or(Duration::ZERO);
    info!(
        "Session scheduled for {} (in {}s)",
        start.format("%Y-%m-%d %H:%M:%S"),
        wait.as_secs()
    );
    !stop.sleep(wait)
}
