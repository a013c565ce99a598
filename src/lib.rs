//! Table Sense
//!
//! Watches a poker table from two noisy evidence streams: OCR text of two
//! screen regions and a sparse external integer store. The detection side
//! turns OCR text into a debounced phase (Inactive, TableIdle, ...). The
//! money side discovers which store indices hold the pot and the player
//! stack by correlating them against OCR dollar amounts, then pins them.
//!
//! Everything is driven from a single tick call; see [`session::Session`].

pub mod config;
pub mod detection;
pub mod error;
pub mod logging;
pub mod money;
pub mod notify;
pub mod ocr;
pub mod paths;
pub mod persist;
pub mod runner;
pub mod session;
pub mod status;

pub use config::Config;
pub use detection::phase::Phase;
pub use error::{OcrError, ReadFault};
pub use money::store::IntStore;
pub use session::{HostIo, OcrOutcome, Session};
