//! Console + file logger behind the `log` facade.
//!
//! Every line is `[HH:MM:SS.mmm] LEVEL message`, printed to stdout and
//! appended to the session log file.

use chrono::Local;
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

pub const LOG_FILE_NAME: &str = "table_sense.log";

struct TimestampLogger {
    level: LevelFilter,
    file: Mutex<Option<File>>,
}

impl Log for TimestampLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(record.level(), &record.args().to_string());
        print!("{}", line);
        if let Ok(mut guard) = self.file.lock() {
            if let Some(file) = guard.as_mut() {
                let _ = file.write_all(line.as_bytes());
            }
        }
    }

    fn flush(&self) {
        if let Ok(mut guard) = self.file.lock() {
            if let Some(file) = guard.as_mut() {
                let _ = file.flush();
            }
        }
    }
}

fn format_line(level: Level, msg: &str) -> String {
    let timestamp = Local::now().format("%H:%M:%S%.3f");
    format!("[{}] {:<5} {}\n", timestamp, level, msg)
}

/// Installs the logger. `log_dir` receives [`LOG_FILE_NAME`]; when it cannot
/// be opened the logger still writes to stdout.
///
/// Returns an error only if a logger was already installed.
pub fn init(log_dir: Option<&Path>, level: LevelFilter) -> anyhow::Result<()> {
    let file = log_dir.and_then(|dir| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(LOG_FILE_NAME))
            .ok()
    });

    let logger = TimestampLogger {
        level,
        file: Mutex::new(file),
    };
    log::set_boxed_logger(Box::new(logger))
        .map_err(|e| anyhow::anyhow!("Failed to install logger: {}", e))?;
    log::set_max_level(level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_line_shape() {
        let line = format_line(Level::Warn, "[CFG] hello");
        assert!(line.starts_with('['));
        assert!(line.contains("] WARN  [CFG] hello"));
        assert!(line.ends_with('\n'));
    }

    // The only test in the crate that installs the global logger.
    #[test]
    fn test_init_writes_file_and_installs_once() {
        let dir = tempfile::tempdir().unwrap();
        init(Some(dir.path()), LevelFilter::Info).unwrap();
        log::info!("[CFG] logger ready");
        log::debug!("[CFG] filtered out");
        log::logger().flush();

        let contents = std::fs::read_to_string(dir.path().join(LOG_FILE_NAME)).unwrap();
        assert!(contents.contains("INFO  [CFG] logger ready"));
        assert!(!contents.contains("filtered out"));

        assert!(init(None, LevelFilter::Debug).is_err());
    }
}
