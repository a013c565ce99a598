//! Locating the tesseract executable.

use anyhow::{anyhow, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::paths;

#[cfg(windows)]
const TESSERACT_EXE: &str = "tesseract.exe";
#[cfg(not(windows))]
const TESSERACT_EXE: &str = "tesseract";

/// Returns the per-user directory for a portable Tesseract install.
pub fn get_user_tesseract_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("table-sense")
        .join("tesseract")
}

/// Resolves the configured tesseract path to something spawnable.
///
/// Order: the configured path (absolute, or relative to the exe dir), the
/// bundled `<exe_dir>/tesseract/`, the per-user data dir, and finally the
/// configured name as-is so the OS searches PATH.
pub fn resolve_tesseract_executable(configured: &str) -> PathBuf {
    let configured = configured.trim();
    let configured = if configured.is_empty() { "tesseract" } else { configured };

    let as_path = Path::new(configured);
    if as_path.is_absolute() {
        if as_path.exists() {
            return as_path.to_path_buf();
        }
    } else if as_path.components().count() > 1 {
        let relative = paths::get_exe_dir().join(as_path);
        if relative.exists() {
            return relative;
        }
    }

    let candidates = [
        paths::get_tesseract_dir().join(TESSERACT_EXE),
        get_user_tesseract_dir().join(TESSERACT_EXE),
    ];
    if let Some(found) = candidates.into_iter().find(|p| p.exists()) {
        return found;
    }

    PathBuf::from(configured)
}

/// Extracts the version number from `tesseract --version` output.
pub fn parse_version(output: &str) -> Result<String> {
    let re = Regex::new(r"(?i)tesseract\s+v?(\d+\.\d+(?:\.\d+)?)")?;
    re.captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| anyhow!("Unrecognized tesseract version output"))
}

/// Runs `<exe> --version`. Used once at startup so a missing install shows up
/// in the log before the first OCR cycle fails.
pub fn probe_tesseract(executable: &Path) -> Result<String> {
    let output = Command::new(executable)
        .arg("--version")
        .output()
        .map_err(|e| anyhow!("Tesseract not runnable at {}: {}", executable.display(), e))?;

    // Older builds print the banner to stderr.
    let mut text = String::from_utf8_lossy(&output.stdout).to_string();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    parse_version(&text)
}
