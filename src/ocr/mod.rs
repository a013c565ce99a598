pub mod cycle;
pub mod engine;
pub mod money;
pub mod normalize;
pub mod preprocess;
pub mod setup;
pub mod snapshot;

pub use cycle::{FrameSource, OcrCycle};
pub use normalize::{normalize, NormalizedText};
pub use snapshot::{build_snapshot, OcrSnapshot, PotSource};

use crate::error::OcrError;

/// Result of one completed OCR cycle.
#[derive(Debug)]
pub enum OcrOutcome {
    /// Text of both regions plus the opacity hint sampled with the frame
    Text { text: String, opacity_hint: f32 },
    /// Process failed, timed out, or produced nothing readable
    Failed(OcrError),
}
