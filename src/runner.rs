//! Tick driver: frame source, OCR cycle and session wired together, with
//! config hot reload.

use anyhow::{Context, Result};
use image::{ImageBuffer, Rgba};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::config::{load_config, Config};
use crate::ocr::{FrameSource, OcrCycle};
use crate::session::{HostIo, Session};
use crate::status::TickReport;

/// Replays `*.png` files from a directory in file name order, one per
/// capture. Returns `None` once every file has been handed out.
pub struct DirectoryFrames {
    files: Vec<PathBuf>,
    next: usize,
}

impl DirectoryFrames {
    pub fn open(dir: &Path) -> Result<Self> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("Failed to read frame directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("png"))
            })
            .collect();
        files.sort();
        log::info!("Loaded {} frame(s) from {}", files.len(), dir.display());
        Ok(Self { files, next: 0 })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn is_exhausted(&self) -> bool {
        self.next >= self.files.len()
    }
}

impl FrameSource for DirectoryFrames {
    fn capture(&mut self) -> Result<Option<ImageBuffer<Rgba<u8>, Vec<u8>>>> {
        let Some(path) = self.files.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;
        let frame = image::open(path)
            .with_context(|| format!("Failed to decode frame {}", path.display()))?
            .to_rgba8();
        Ok(Some(frame))
    }
}

/// Notices edits to the config file by modification time.
#[derive(Debug)]
pub struct ConfigWatcher {
    path: PathBuf,
    modified: Option<SystemTime>,
}

impl ConfigWatcher {
    /// Starts watching from the file's current state, so the first poll
    /// only fires on a later edit.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let modified = modified_at(&path);
        Self { path, modified }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the freshly loaded config when the file changed since the
    /// last poll. A deleted file counts as a change back to defaults.
    pub fn poll(&mut self) -> Option<Config> {
        let modified = modified_at(&self.path);
        if modified == self.modified {
            return None;
        }
        self.modified = modified;
        log::info!("[CFG] Config file changed, reloading");
        Some(load_config(&self.path))
    }
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// One session fed by one frame source.
pub struct Monitor<F: FrameSource> {
    session: Session,
    ocr: OcrCycle,
    frames: F,
    watcher: Option<ConfigWatcher>,
}

impl<F: FrameSource> Monitor<F> {
    pub fn new(config: Config, frames: F, watcher: Option<ConfigWatcher>, now_ms: u64) -> Self {
        Self {
            session: Session::new(config, now_ms),
            ocr: OcrCycle::new(),
            frames,
            watcher,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn frames(&self) -> &F {
        &self.frames
    }

    pub fn is_ocr_running(&self) -> bool {
        self.ocr.is_running()
    }

    /// Applies a new config: the in-flight OCR job is dropped and every
    /// piece of session state starts over.
    pub fn reload(&mut self, config: Config, now_ms: u64) {
        self.ocr.cancel();
        self.session.reload(config, now_ms);
    }

    pub fn tick(&mut self, now_ms: u64, io: &mut HostIo) -> &TickReport {
        if let Some(config) = self.watcher.as_mut().and_then(|w| w.poll()) {
            self.reload(config, now_ms);
        }
        let outcome = self
            .ocr
            .poll(now_ms, &mut self.frames, self.session.config(), &mut *io.notify);
        self.session.tick(now_ms, outcome, io)
    }
}
