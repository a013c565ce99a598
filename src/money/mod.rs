//! Money discovery: which store indices hold the pot and the player stack.

pub mod candidate;
pub mod lock;
pub mod payout;
pub mod ranking;
pub mod scanner;
pub mod store;

pub use candidate::MoneyCandidate;
pub use lock::SourceLocks;
pub use payout::{LedgerWallet, PayoutPreview, PayoutSink, PayoutSource, PayoutState};
pub use ranking::{rank, RankMode, Ranked, Ranking};
pub use scanner::{Scanner, ScannerStatus};
pub use store::{IntStore, MemoryStore};
