//! Money snapshot: the dollar amounts one OCR cycle yielded.

use serde::Serialize;

use super::money::{amounts_match, is_npc_context, AmountParser};
use super::normalize::{normalize, NormalizedText};
use crate::config::Config;

/// Which heuristic supplied the pot amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PotSource {
    #[default]
    None,
    /// Main pot plus side pot
    MainPlusSide,
    Main,
    Side,
    /// A `$` after any "pot"
    Generic,
    /// Largest amount on screen; unreliable
    Fallback,
}

impl PotSource {
    pub fn label(&self) -> &'static str {
        match self {
            PotSource::None => "none",
            PotSource::MainPlusSide => "main+side",
            PotSource::Main => "main",
            PotSource::Side => "side",
            PotSource::Generic => "pot",
            PotSource::Fallback => "fallback",
        }
    }

    /// True for tiers linked to an explicit pot label.
    pub fn is_trustworthy(&self) -> bool {
        !matches!(self, PotSource::None | PotSource::Fallback)
    }
}

/// One parse result. Superseded, never mutated, by the next one.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OcrSnapshot {
    /// Monotonic per session; 0 means "no snapshot yet"
    pub sample_id: u64,
    pub taken_at_ms: u64,
    pub raw_text: String,
    #[serde(skip)]
    pub normalized: NormalizedText,
    pub pot: Option<i64>,
    pub pot_source: PotSource,
    pub main_pot: Option<i64>,
    pub side_pot: Option<i64>,
    pub generic_pot: Option<i64>,
    pub wins: Option<i64>,
    pub player: Option<i64>,
    /// Other seats' stacks, sorted ascending
    pub npc: Vec<i64>,
    /// Every parsed amount, sorted and unique
    pub amounts: Vec<i64>,
}

impl OcrSnapshot {
    pub fn is_fresh(&self, now_ms: u64, max_age_ms: u64) -> bool {
        self.sample_id > 0
            && now_ms >= self.taken_at_ms
            && now_ms - self.taken_at_ms <= max_age_ms
    }

    /// Pot amount only if it came from an explicit pot label.
    pub fn trusted_pot(&self) -> Option<i64> {
        self.pot.filter(|_| self.pot_source.is_trustworthy())
    }

    /// Disambiguation reference for the next parse: wins, else pot.
    pub fn reference(&self) -> Option<i64> {
        self.wins.or(self.pot)
    }

    /// Pot-tier references in the order they are correlated.
    pub fn pot_refs(&self) -> [Option<i64>; 4] {
        [self.pot, self.main_pot, self.side_pot, self.generic_pot]
    }

    pub fn has_payout_marker(&self) -> bool {
        self.wins.is_some() || text_has_payout_marker(&self.raw_text)
    }
}

/// Payout words in lowercased OCR text.
pub fn text_has_payout_marker(text: &str) -> bool {
    ["wins", "winner", "collect", "collected", "payout"]
        .iter()
        .any(|m| text.contains(m))
}

/// Parses lowercased OCR text into a new snapshot.
///
/// `reference` is the previous snapshot's wins-or-pot amount, used to bias
/// dollars/cents disambiguation.
pub fn build_snapshot(
    text: &str,
    sample_id: u64,
    now_ms: u64,
    reference: Option<i64>,
    config: &Config,
) -> OcrSnapshot {
    let parser = AmountParser::new(&config.amounts, reference);
    let player_hint = config.ocr.player_name_hint.as_str();

    let mut amounts = Vec::new();
    let mut npc_context = Vec::new();
    for (i, _) in text.match_indices('$') {
        if let Some(cents) = parser.parse_after_dollar(text, i) {
            amounts.push(cents);
            if is_npc_context(text, i, player_hint) {
                npc_context.push(cents);
            }
        }
    }
    amounts.sort_unstable();
    amounts.dedup();

    let main_pot = parser.find_after(text, "main pot", 36, false);
    let side_pot = parser.find_after(text, "side pot", 36, false);
    let generic_pot = parser.find_after(text, "pot", 28, true);

    let wins = parser
        .find_near(text, "wins", 36, 18)
        .or_else(|| parser.find_near(text, "won", 20, 10))
        .or_else(|| parser.find_near(text, "collected", 32, 10))
        .or_else(|| parser.find_near(text, "collect", 24, 10))
        .or_else(|| parser.find_near(text, "winner", 30, 10));

    let player = Some(player_hint)
        .filter(|h| !h.is_empty())
        .and_then(|h| parser.find_near(text, h, 40, 28))
        .or_else(|| parser.find_near(text, "you", 28, 20));

    let (pot, pot_source) = match (main_pot, side_pot, generic_pot) {
        (Some(m), Some(s), _) => (Some(m + s), PotSource::MainPlusSide),
        (Some(m), None, _) => (Some(m), PotSource::Main),
        (None, Some(s), _) => (Some(s), PotSource::Side),
        (None, None, Some(g)) => (Some(g), PotSource::Generic),
        (None, None, None) => match amounts.last() {
            Some(&max) => (Some(max), PotSource::Fallback),
            None => (None, PotSource::None),
        },
    };

    let tolerance = config.money.ocr_match_tolerance_cents.max(0);
    let refs = [pot, main_pot, side_pot, generic_pot, wins, player];
    let mut npc: Vec<i64> = amounts
        .iter()
        .copied()
        .filter(|a| config.money.in_value_range(*a))
        .filter(|a| npc_context.contains(a))
        .filter(|a| !refs.iter().flatten().any(|r| amounts_match(*a, *r, tolerance)))
        .collect();
    let keep = config.money.npc_track_max;
    if keep > 0 && npc.len() > keep {
        npc.drain(..npc.len() - keep);
    }

    OcrSnapshot {
        sample_id,
        taken_at_ms: now_ms,
        raw_text: text.to_string(),
        normalized: normalize(text),
        pot,
        pot_source,
        main_pot,
        side_pot,
        generic_pot,
        wins,
        player,
        npc,
        amounts,
    }
}
