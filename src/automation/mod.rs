//! Trading-house automation.
//!
//! This module provides:
//! - Input injection and the background click loop
//! - Purchase decisions driven by monitor events
//! - Trading view recovery and coin balance reading
//! - Scheduling, hotkeys and configuration

pub mod balance;
pub mod clicker;
pub mod config;
pub mod hotkey;
pub mod input;
pub mod keys;
pub mod recovery;
pub mod runner;
pub mod schedule;
pub mod session;
pub mod task;

pub use config::{init_config, AppConfig};
pub use runner::{run_scheduled, run_session, Backends, Resources, SessionReport};
pub use session::SessionControl;
