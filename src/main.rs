//! Delta Buyer
//!
//! Watches the trading house of the 三角洲行动 client and buys the item under
//! the cursor whenever its unit price falls inside the configured band.
//! Runs once a day at the configured time for a fixed duration.

#![cfg_attr(not(windows), allow(dead_code))]

mod automation;
mod capture;
mod logging;
mod monitor;
mod ocr;
mod paths;
mod recognition;

use anyhow::Result;

#[cfg(windows)]
fn main() -> Result<()> {
    use anyhow::Context;
    use std::sync::Arc;
    use tracing::{error, info, warn};

    use automation::hotkey::HotkeyListener;
    use automation::input::SendInputInjector;
    use automation::{Backends, Resources, SessionControl};
    use capture::{GdiSampler, Win32WindowManager, WindowManager};
    use ocr::{TesseractReader, TextReader};
    use recognition::template::load_gray;
    use recognition::DigitTemplates;

    paths::ensure_directories().context("Failed to create output directories")?;
    let log_path = logging::init(&paths::get_logs_dir())?;
    logging::install_panic_hook();
    info!("Delta Buyer {} starting", env!("CARGO_PKG_VERSION"));
    info!("Logging to {}", log_path.display());

    let config = automation::init_config()?;

    let digits = DigitTemplates::load(&paths::get_digit_template_dir())
        .context("Failed to load digit templates")?;
    let coin = match load_gray(&paths::get_coin_template_path()) {
        Ok(img) => Some(img),
        Err(e) => {
            warn!("Coin template unavailable: {:#}", e);
            None
        }
    };

    let reader: Option<Arc<dyn TextReader>> = match ocr::ensure_tesseract() {
        Ok(paths) => Some(Arc::new(TesseractReader::new(paths))),
        Err(e) => {
            warn!("Failed to set up Tesseract: {:#}", e);
            warn!("Balance reading and screen text checks are disabled");
            None
        }
    };

    let window_manager: Arc<dyn WindowManager> = Arc::new(Win32WindowManager::new());
    let backends = Backends {
        sampler: Arc::new(GdiSampler::new()),
        input: Arc::new(SendInputInjector::new()),
        windows: window_manager.clone(),
        reader,
    };
    let resources = Resources {
        digits: Arc::new(digits),
        coin,
    };

    let control = SessionControl::new();
    let mut hotkeys = HotkeyListener::spawn(control.clone(), move |paused| {
        let w = &config.window;
        // Unpin while paused so the operator can use other windows
        if let Some(handle) =
            window_manager.find_target_window(&w.game_window_name, w.min_width, w.min_height)
        {
            window_manager.set_topmost(handle, !paused);
        }
    })?;

    let outcome = automation::run_scheduled(config, &backends, &resources, &control);
    hotkeys.stop();

    match outcome {
        Ok(Some(report)) => {
            info!(
                "Done: {} bought, {} skipped, {} dismissed, {} refreshes",
                report.stats.purchases,
                report.stats.skipped,
                report.stats.dismissed,
                report.stats.refreshes
            );
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => {
            error!("Session failed: {:#}", e);
            Err(e)
        }
    }
}

#[cfg(not(windows))]
fn main() -> Result<()> {
    Err(anyhow::anyhow!(
        "Delta Buyer drives a Windows game client and only runs on Windows"
    ))
}
