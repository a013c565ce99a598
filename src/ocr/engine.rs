//! Tesseract as a background process, polled without blocking.
//!
//! Each region image is written to a temp dir and gets its own tesseract
//! child. The tick loop calls [`OcrJob::poll`] until every child exited or
//! the timeout kills them.

use image::{ImageBuffer, Rgba};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use tempfile::TempDir;

use crate::error::OcrError;

/// Progress of a running job.
#[derive(Debug)]
pub enum JobStatus {
    Running,
    /// Text of every region that produced output, joined by newlines
    Finished(String),
}

struct RegionRun {
    child: Child,
    output: PathBuf,
    exit: Option<ExitStatus>,
}

pub struct OcrJob {
    runs: Vec<RegionRun>,
    started_at_ms: u64,
    // Keeps the images and outputs alive until the job is dropped.
    _workdir: TempDir,
}

impl OcrJob {
    /// Writes the region images to disk and spawns one tesseract per region.
    pub fn start(
        regions: &[ImageBuffer<Rgba<u8>, Vec<u8>>],
        executable: &Path,
        psm: u8,
        now_ms: u64,
    ) -> Result<Self, OcrError> {
        let workdir = tempfile::Builder::new()
            .prefix("table-sense-ocr")
            .tempdir()
            .map_err(OcrError::Spawn)?;

        let mut runs: Vec<RegionRun> = Vec::with_capacity(regions.len());
        for (i, region) in regions.iter().enumerate() {
            let input = workdir.path().join(format!("region_{}.png", i));
            let output_base = workdir.path().join(format!("region_{}", i));
            region
                .save(&input)
                .map_err(|e| OcrError::Capture(e.to_string()))?;

            let spawned = Command::new(executable)
                .arg(&input)
                .arg(&output_base)
                .arg("--psm")
                .arg(psm.to_string())
                .arg("-l")
                .arg("eng")
                .arg("quiet")
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn();

            match spawned {
                Ok(child) => runs.push(RegionRun {
                    child,
                    output: output_base.with_extension("txt"),
                    exit: None,
                }),
                Err(e) => {
                    for run in &mut runs {
                        let _ = run.child.kill();
                        let _ = run.child.wait();
                    }
                    return Err(OcrError::Spawn(e));
                }
            }
        }

        Ok(Self {
            runs,
            started_at_ms: now_ms,
            _workdir: workdir,
        })
    }

    pub fn started_at_ms(&self) -> u64 {
        self.started_at_ms
    }

    /// Checks the children without waiting. Past `timeout_ms` every child is
    /// killed and the job fails.
    pub fn poll(&mut self, now_ms: u64, timeout_ms: u64) -> Result<JobStatus, OcrError> {
        let mut pending = false;
        let mut lost = false;
        for run in self.runs.iter_mut().filter(|r| r.exit.is_none()) {
            match run.child.try_wait() {
                Ok(Some(status)) => run.exit = Some(status),
                Ok(None) => pending = true,
                Err(_) => lost = true,
            }
        }
        if lost {
            self.cancel();
            return Err(OcrError::Unreadable);
        }

        if pending {
            if now_ms.saturating_sub(self.started_at_ms) >= timeout_ms {
                self.cancel();
                return Err(OcrError::Timeout(timeout_ms));
            }
            return Ok(JobStatus::Running);
        }

        let texts: Vec<String> = self
            .runs
            .iter()
            .filter_map(|run| std::fs::read_to_string(&run.output).ok())
            .collect();
        if texts.is_empty() {
            let failed = self
                .runs
                .iter()
                .filter_map(|run| run.exit)
                .find(|status| !status.success());
            return Err(match failed {
                Some(status) => OcrError::Exited(status),
                None => OcrError::Unreadable,
            });
        }
        Ok(JobStatus::Finished(texts.join("\n")))
    }

    /// Kills every child that is still running.
    pub fn cancel(&mut self) {
        for run in &mut self.runs {
            if run.exit.is_none() {
                let _ = run.child.kill();
                if let Ok(status) = run.child.wait() {
                    run.exit = Some(status);
                }
            }
        }
    }
}

impl Drop for OcrJob {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-tesseract.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn wait_for(job: &mut OcrJob, timeout_ms: u64) -> Result<JobStatus, OcrError> {
        let start = std::time::Instant::now();
        loop {
            let now = start.elapsed().as_millis() as u64;
            match job.poll(now, timeout_ms) {
                Ok(JobStatus::Running) => std::thread::sleep(std::time::Duration::from_millis(10)),
                other => return other,
            }
        }
    }

    fn regions() -> Vec<ImageBuffer<Rgba<u8>, Vec<u8>>> {
        vec![ImageBuffer::new(4, 4), ImageBuffer::new(4, 4)]
    }

    #[test]
    fn test_job_reads_region_outputs() {
        let dir = tempfile::tempdir().unwrap();
        // $2 is the output base; tesseract appends .txt
        let exe = script(dir.path(), "echo \"pot \\$5\" > \"$2.txt\"");
        let mut job = OcrJob::start(&regions(), &exe, 11, 0).unwrap();

        match wait_for(&mut job, 5000) {
            Ok(JobStatus::Finished(text)) => {
                assert_eq!(text.matches("pot $5").count(), 2);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_job_without_output_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let exe = script(dir.path(), "exit 0");
        let mut job = OcrJob::start(&regions(), &exe, 11, 0).unwrap();
        assert!(matches!(wait_for(&mut job, 5000), Err(OcrError::Unreadable)));
    }

    #[test]
    fn test_job_times_out_and_kills() {
        let dir = tempfile::tempdir().unwrap();
        let exe = script(dir.path(), "sleep 5");
        let mut job = OcrJob::start(&regions(), &exe, 11, 0).unwrap();
        assert!(matches!(job.poll(0, 1000), Ok(JobStatus::Running)));
        assert!(matches!(job.poll(1000, 1000), Err(OcrError::Timeout(1000))));
    }

    #[test]
    fn test_missing_executable_is_spawn_error() {
        let err = OcrJob::start(&regions(), Path::new("/nonexistent/tesseract"), 11, 0)
            .err()
            .unwrap();
        assert!(err.is_start_failure());
    }
}
