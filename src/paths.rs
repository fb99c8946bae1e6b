use std::path::PathBuf;
use std::sync::OnceLock;

static EXE_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the directory containing the executable.
pub fn get_exe_dir() -> &'static PathBuf {
    EXE_DIR.get_or_init(|| {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

/// Returns the logs directory: `<exe_dir>/logs/`
pub fn get_logs_dir() -> PathBuf {
    get_exe_dir().join("logs")
}

/// Returns the template directory: `<exe_dir>/resources/template/`
pub fn get_template_dir() -> PathBuf {
    get_exe_dir().join("resources").join("template")
}

/// Returns the digit template directory: `<exe_dir>/resources/template/digits/`
pub fn get_digit_template_dir() -> PathBuf {
    get_template_dir().join("digits")
}

/// Returns the coin icon template: `<exe_dir>/resources/template/coin_template.png`
pub fn get_coin_template_path() -> PathBuf {
    get_template_dir().join("coin_template.png")
}

/// Returns the config file path: `<exe_dir>/config.json`
pub fn get_config_path() -> PathBuf {
    get_exe_dir().join("config.json")
}

/// Ensures all output directories exist. Call at startup.
pub fn ensure_directories() -> std::io::Result<()> {
    std::fs::create_dir_all(get_logs_dir())?;
    Ok(())
}
