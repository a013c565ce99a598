//! Phase detection: OCR tokens to a debounced table phase.

pub mod phase;
pub mod scorer;
pub mod tracker;

pub use phase::{Phase, PhaseScores, PHASE_COUNT};
pub use scorer::{score, DetectionInput, DetectionScore, Gate};
pub use tracker::{PhaseTracker, Transition};
