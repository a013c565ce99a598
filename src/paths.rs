//! Locations next to the executable.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const CONFIG_FILE_NAME: &str = "config.json";

static EXE_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Directory holding the running executable, `.` if it cannot be found.
pub fn get_exe_dir() -> &'static PathBuf {
    EXE_DIR.get_or_init(|| {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

/// `<exe_dir>/logs/`
pub fn get_logs_dir() -> PathBuf {
    get_exe_dir().join("logs")
}

/// `<exe_dir>/tesseract/`, for a bundled portable install
pub fn get_tesseract_dir() -> PathBuf {
    get_exe_dir().join("tesseract")
}

/// The config file to load: an explicit path as given, else
/// `<exe_dir>/config.json`. Lock persistence writes to the same file.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None => get_exe_dir().join(CONFIG_FILE_NAME),
    }
}

/// Creates the log directory. Call at startup.
pub fn ensure_directories() -> std::io::Result<()> {
    std::fs::create_dir_all(get_logs_dir())
}
