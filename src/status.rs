//! Read-only per-tick status for overlays and replay reports.

use serde::Serialize;

use crate::detection::{Gate, Phase, Transition};
use crate::money::candidate::MoneyCandidate;
use crate::money::ranking::{RankMode, Ranked};
use crate::money::{PayoutPreview, ScannerStatus};
use crate::ocr::OcrSnapshot;

#[derive(Debug, Clone, Serialize)]
pub struct CandidateView {
    #[serde(flatten)]
    pub candidate: MoneyCandidate,
    pub score: f32,
    pub plausible: bool,
    pub changes_per_sec: f32,
}

impl CandidateView {
    pub fn from_ranked(ranked: &Ranked, now_ms: u64) -> Self {
        Self {
            candidate: ranked.candidate.clone(),
            score: ranked.score,
            plausible: ranked.plausible,
            changes_per_sec: ranked.candidate.changes_per_sec(now_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LockStatus {
    pub pot_index: Option<i32>,
    pub pot_pinned: bool,
    pub player_index: Option<i32>,
    pub player_pinned: bool,
}

/// Where an overlay value was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    /// Live read of the effective store index
    Store,
    /// Fresh OCR amount
    Ocr,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OverlayLine {
    pub source: ValueSource,
    pub cents: i64,
    pub boosted_cents: i64,
}

impl OverlayLine {
    pub fn new(source: ValueSource, cents: i64, multiplier: f32) -> Self {
        Self {
            source,
            cents,
            boosted_cents: (cents as f64 * multiplier as f64).round() as i64,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct OverlayPreview {
    pub multiplier: f32,
    pub player: Option<OverlayLine>,
    pub pot: Option<OverlayLine>,
}

/// Everything one tick produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickReport {
    pub now_ms: u64,
    pub phase: Phase,
    pub confidence: f32,
    pub candidate_stable_ms: u64,
    pub anchor: bool,
    pub gate: Gate,
    pub reasons: String,
    /// Set on the tick a transition was confirmed
    pub transition: Option<Transition>,
    /// Latest money snapshot, if any OCR cycle produced one
    pub money: Option<OcrSnapshot>,
    pub rank_mode: RankMode,
    /// Top `money.top_n` ranked candidates
    pub candidates: Vec<CandidateView>,
    pub locks: LockStatus,
    pub payout: Option<PayoutPreview>,
    /// Bonus credited on this tick
    pub payout_applied: Option<i64>,
    pub scanner: ScannerStatus,
    pub overlay: OverlayPreview,
}

impl TickReport {
    pub fn is_active(&self) -> bool {
        self.phase.is_active()
    }
}
