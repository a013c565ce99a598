//! OCR cycle scheduling: capture, start a job, poll it on later ticks.

use image::{ImageBuffer, Rgba};
use std::path::PathBuf;

use super::engine::{JobStatus, OcrJob};
use super::preprocess::{crop_region, opacity_hint};
use super::setup::resolve_tesseract_executable;
use super::OcrOutcome;
use crate::config::Config;
use crate::error::OcrError;
use crate::notify::{NotificationSink, Notice};

/// Supplies screen frames for OCR.
pub trait FrameSource {
    /// Returns the current frame, or `None` when there is nothing to read
    /// right now (e.g. the game window is not in the foreground).
    fn capture(&mut self) -> anyhow::Result<Option<ImageBuffer<Rgba<u8>, Vec<u8>>>>;
}

struct RunningJob {
    job: OcrJob,
    opacity_hint: f32,
}

/// Owns at most one in-flight OCR job and the start-failure streak.
#[derive(Default)]
pub struct OcrCycle {
    running: Option<RunningJob>,
    next_start_at_ms: u64,
    start_failures: u32,
    warned: bool,
    executable: Option<PathBuf>,
}

impl OcrCycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Kills any in-flight job and forgets all scheduling state.
    pub fn cancel(&mut self) {
        if let Some(mut running) = self.running.take() {
            running.job.cancel();
            log::info!("[OCR] In-flight OCR process terminated");
        }
        *self = Self::default();
    }

    /// Advances the cycle by one tick.
    ///
    /// Returns `Some` when a cycle completed or failed this tick, `None` while
    /// idle or still waiting on the process.
    pub fn poll(
        &mut self,
        now_ms: u64,
        frames: &mut dyn FrameSource,
        config: &Config,
        notify: &mut dyn NotificationSink,
    ) -> Option<OcrOutcome> {
        if !config.ocr.enabled {
            if self.running.is_some() {
                self.cancel();
            }
            return None;
        }

        if let Some(running) = self.running.as_mut() {
            let polled = running.job.poll(now_ms, config.ocr.process_timeout_ms);
            let opacity_hint = running.opacity_hint;
            return match polled {
                Ok(JobStatus::Running) => None,
                Ok(JobStatus::Finished(text)) => {
                    self.running = None;
                    Some(OcrOutcome::Text { text, opacity_hint })
                }
                Err(e) => {
                    self.running = None;
                    log::debug!("[OCR] Cycle failed: {}", e);
                    Some(OcrOutcome::Failed(e))
                }
            };
        }

        if now_ms < self.next_start_at_ms {
            return None;
        }

        let frame = match frames.capture() {
            Ok(Some(frame)) => frame,
            // Nothing on screen to read; try again next tick.
            Ok(None) => return None,
            Err(e) => {
                self.next_start_at_ms = now_ms + config.ocr.interval_ms;
                let err = OcrError::Capture(e.to_string());
                self.note_start_failure(&err, config, notify);
                return Some(OcrOutcome::Failed(err));
            }
        };
        self.next_start_at_ms = now_ms + config.ocr.interval_ms;

        let opacity_hint = opacity_hint(&frame, &config.opacity);
        let regions = [
            crop_region(&frame, &config.ocr.bottom_left),
            crop_region(&frame, &config.ocr.top_right),
        ];
        let executable = self
            .executable
            .get_or_insert_with(|| resolve_tesseract_executable(&config.ocr.tesseract_path))
            .clone();

        match OcrJob::start(&regions, &executable, config.ocr.psm, now_ms) {
            Ok(job) => {
                self.start_failures = 0;
                self.warned = false;
                self.running = Some(RunningJob { job, opacity_hint });
                None
            }
            Err(e) => {
                self.note_start_failure(&e, config, notify);
                Some(OcrOutcome::Failed(e))
            }
        }
    }

    fn note_start_failure(
        &mut self,
        err: &OcrError,
        config: &Config,
        notify: &mut dyn NotificationSink,
    ) {
        self.start_failures += 1;
        if self.start_failures >= config.ocr.start_failure_warn_after && !self.warned {
            self.warned = true;
            log::warn!(
                "[OCR] WARNING: Failed to start OCR process repeatedly ({}, tesseract='{}')",
                err,
                config.ocr.tesseract_path
            );
            notify.post(Notice::OcrUnavailable);
        }
    }
}
