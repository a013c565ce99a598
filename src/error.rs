//! Typed failures of the core pipeline.
//!
//! Neither error is fatal: a [`ReadFault`] degrades to "candidate unreadable"
//! and an [`OcrError`] degrades to a gated (frozen) detection cycle.

use thiserror::Error;

/// Failure reading one index of the external integer store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReadFault {
    /// The index does not exist in the store. Permanent.
    #[error("index {0} not found")]
    Missing(i32),
    /// The read raised an access fault. May be transient.
    #[error("access fault reading index {0}")]
    Fault(i32),
}

impl ReadFault {
    pub fn index(&self) -> i32 {
        match self {
            ReadFault::Missing(i) | ReadFault::Fault(i) => *i,
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, ReadFault::Fault(_))
    }
}

/// Failure of one OCR cycle. All variants collapse into a single
/// "scan failed" gate for the phase scorer.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("failed to capture frame: {0}")]
    Capture(String),
    #[error("failed to start tesseract: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("tesseract timed out after {0} ms")]
    Timeout(u64),
    #[error("tesseract exited with {0}")]
    Exited(std::process::ExitStatus),
    #[error("tesseract produced no readable output")]
    Unreadable,
}

impl OcrError {
    /// True for failures that happened before a process was running.
    pub fn is_start_failure(&self) -> bool {
        matches!(self, OcrError::Spawn(_) | OcrError::Capture(_))
    }
}
