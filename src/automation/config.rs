//! Configuration for the buyer.
//!
//! Loads settings from config.json at startup. Provides the game window
//! filter, the purchase price bounds, the repeat-click target, the session
//! schedule and tuning for the monitor and recognition layers.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::info;

use crate::capture::ScreenRect;
use crate::monitor::MonitorConfig;
use crate::recognition::ColorProbe;

/// Global configuration instance, initialized once at startup.
static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Which top-level window is the game client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Case-insensitive substring of the window title
    pub game_window_name: String,
    /// Smaller windows (launchers, splash screens) are ignored
    pub min_width: i32,
    pub min_height: i32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            game_window_name: "三角洲行动".to_string(),
            min_width: 1280,
            min_height: 720,
        }
    }
}

/// Inclusive price bounds for a purchase.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LimitConfig {
    pub price_low: u32,
    pub price_high: u32,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            price_low: 100_000,
            price_high: 500_000,
        }
    }
}

impl LimitConfig {
    pub fn contains(&self, price: u32) -> bool {
        (self.price_low..=self.price_high).contains(&price)
    }
}

/// A point in screen coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Default for Point {
    fn default() -> Self {
        // First favourites slot in the trading view
        Self { x: 660, y: 240 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Daily start time, "HH:MM" or "HH:MM:SS"
    pub execution_time: String,
    /// Seconds between UI refreshes
    pub execution_time_single: u64,
    /// Session length in seconds
    pub duration: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            execution_time: "00:00".to_string(),
            execution_time_single: 180,
            duration: 3600,
        }
    }
}

fn default_price_region() -> ScreenRect {
    ScreenRect::new(299, 176, 24, 17)
}

fn default_digit_width() -> u32 {
    11
}

fn default_confidence_threshold() -> f32 {
    0.95
}

fn default_no_items_probe() -> ColorProbe {
    ColorProbe::new(1630, 889, [75, 79, 82], 10.0)
}

fn default_separator_probe() -> ColorProbe {
    ColorProbe::new(313, 193, [179, 181, 183], 10.0)
}

/// Screen layout of the trading view signals.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecognitionConfig {
    /// Strip holding the two leading price digits
    #[serde(default = "default_price_region")]
    pub price_region: ScreenRect,
    #[serde(default = "default_digit_width")]
    pub digit_width: u32,
    /// Minimum template score for a digit to count as recognized
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_no_items_probe")]
    pub no_items_probe: ColorProbe,
    #[serde(default = "default_separator_probe")]
    pub separator_probe: ColorProbe,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            price_region: default_price_region(),
            digit_width: default_digit_width(),
            confidence_threshold: default_confidence_threshold(),
            no_items_probe: default_no_items_probe(),
            separator_probe: default_separator_probe(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Pause between repeat clicks
    pub click_interval_ms: u64,
    /// How long the session waits for each event
    pub event_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            click_interval_ms: 200,
            event_timeout_ms: 200,
        }
    }
}

impl TimingConfig {
    pub fn click_interval(&self) -> Duration {
        Duration::from_millis(self.click_interval_ms)
    }

    pub fn event_timeout(&self) -> Duration {
        Duration::from_millis(self.event_timeout_ms)
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub window: WindowConfig,
    pub limit: LimitConfig,
    /// Repeat-click target
    pub click_location: Point,
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub recognition: RecognitionConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.limit.price_low > self.limit.price_high {
            bail!(
                "limit.price_low ({}) is greater than limit.price_high ({})",
                self.limit.price_low,
                self.limit.price_high
            );
        }
        if self.recognition.digit_width == 0
            || self.recognition.digit_width > self.recognition.price_region.width
        {
            bail!(
                "recognition.digit_width ({}) must be between 1 and the price region width ({})",
                self.recognition.digit_width,
                self.recognition.price_region.width
            );
        }
        if self.schedule.duration == 0 {
            bail!("schedule.duration must be positive");
        }
        crate::automation::schedule::parse_time_of_day(&self.schedule.execution_time)?;
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.schedule.execution_time_single)
    }

    pub fn session_duration(&self) -> Duration {
        Duration::from_secs(self.schedule.duration)
    }
}

/// Returns config.json next to the executable, falling back to the working directory.
pub fn config_path() -> PathBuf {
    let beside_exe = crate::paths::get_config_path();
    if beside_exe.exists() {
        beside_exe
    } else {
        Path::new("config.json").to_path_buf()
    }
}

/// Loads and validates the configuration at `path`.
///
/// A missing file yields the defaults. A file that exists but cannot be read,
/// parsed or validated is an error.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    info!("Looking for config at: {}", path.display());

    if !path.exists() {
        info!("config.json not found. Using default config.");
        return Ok(AppConfig::default());
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: AppConfig = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;

    info!("Config loaded from {}", path.display());
    Ok(config)
}

/// Initializes the global configuration. Call once at startup.
pub fn init_config() -> Result<&'static AppConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }
    let config = load_config_from(&config_path())?;
    Ok(CONFIG.get_or_init(|| config))
}
