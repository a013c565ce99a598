//! One tracked store index and the evidence gathered about it.

use serde::Serialize;

use crate::config::MoneyConfig;
use crate::ocr::OcrSnapshot;

/// A candidate counts as "recently matched" this long after an OCR match.
pub const RECENT_MATCH_MS: u64 = 12_000;

/// True if a raw store value equals an OCR amount in cents, either
/// directly or with the store holding whole dollars.
pub fn value_matches(value: i64, amount_cents: i64, tolerance: i64) -> bool {
    if amount_cents <= 0 {
        return false;
    }
    let tolerance = tolerance.max(0);
    (value - amount_cents).abs() <= tolerance || (value * 100 - amount_cents).abs() <= tolerance
}

fn fits_grid(abs_delta: i64, min_unit: i64, step_unit: i64) -> bool {
    abs_delta > 0 && step_unit > 0 && abs_delta >= min_unit && abs_delta % step_unit == 0
}

/// True if a value change looks like a legal bet, in whole dollars or in cents.
pub fn is_bet_grid_delta(abs_delta: i64, config: &MoneyConfig) -> bool {
    let step = config.bet_step_dollars as i64;
    if step <= 0 {
        return false;
    }
    let min = (config.bet_min_dollars as i64).max(step);
    fits_grid(abs_delta, min, step) || fits_grid(abs_delta, min * 100, step * 100)
}

#[derive(Debug, Clone, Serialize)]
pub struct MoneyCandidate {
    pub index: i32,
    pub value: i32,
    pub last_delta: i64,
    pub changes: u32,
    pub bet_matches: u32,
    pub bet_mismatches: u32,
    pub any_matches: u32,
    pub pot_matches: u32,
    pub player_matches: u32,
    pub npc_matches: u32,
    pub first_seen_ms: u64,
    pub last_seen_ms: u64,
    pub last_change_ms: Option<u64>,
    pub last_ocr_match_ms: Option<u64>,
    #[serde(skip)]
    any_sample: u64,
    #[serde(skip)]
    pot_sample: u64,
    #[serde(skip)]
    player_sample: u64,
    #[serde(skip)]
    npc_sample: u64,
    #[serde(skip)]
    pub(crate) fault_strikes: u32,
}

impl MoneyCandidate {
    pub fn new(index: i32, value: i32, now_ms: u64) -> Self {
        Self {
            index,
            value,
            last_delta: 0,
            changes: 0,
            bet_matches: 0,
            bet_mismatches: 0,
            any_matches: 0,
            pot_matches: 0,
            player_matches: 0,
            npc_matches: 0,
            first_seen_ms: now_ms,
            last_seen_ms: now_ms,
            last_change_ms: None,
            last_ocr_match_ms: None,
            any_sample: 0,
            pot_sample: 0,
            player_sample: 0,
            npc_sample: 0,
            fault_strikes: 0,
        }
    }

    /// Tests the current value against one snapshot. Each category counts
    /// at most once per `sample_id`, however often this is called.
    pub fn correlate(&mut self, snapshot: &OcrSnapshot, tolerance: i64, now_ms: u64) {
        let id = snapshot.sample_id;
        if id == 0 || snapshot.amounts.is_empty() {
            return;
        }
        let value = self.value as i64;
        let hit = |amount: i64| value_matches(value, amount, tolerance);

        if snapshot.amounts.iter().any(|&a| hit(a)) && self.any_sample != id {
            self.any_matches += 1;
            self.any_sample = id;
            self.last_ocr_match_ms = Some(now_ms);
        }

        let player = snapshot.player.filter(|&p| p > 0);
        let player_match = player.is_some_and(hit);
        if player_match && self.player_sample != id {
            self.player_matches += 1;
            self.player_sample = id;
            self.last_ocr_match_ms = Some(now_ms);
        }

        let pot_match = snapshot
            .pot_refs()
            .into_iter()
            .flatten()
            .filter(|&r| r > 0)
            // A pot figure that is really the player's stack only counts once.
            .filter(|&r| !(player_match && player.is_some_and(|p| value_matches(r, p, tolerance))))
            .any(hit);
        if pot_match && self.pot_sample != id {
            self.pot_matches += 1;
            self.pot_sample = id;
            self.last_ocr_match_ms = Some(now_ms);
        }

        if snapshot.npc.iter().any(|&a| hit(a)) && self.npc_sample != id {
            self.npc_matches += 1;
            self.npc_sample = id;
            self.last_ocr_match_ms = Some(now_ms);
        }
    }

    /// Records a fresh read. Returns true if the value changed.
    pub fn observe(&mut self, value: i32, now_ms: u64, config: &MoneyConfig) -> bool {
        self.last_seen_ms = now_ms;
        self.fault_strikes = 0;
        if value == self.value {
            return false;
        }
        let delta = value as i64 - self.value as i64;
        self.changes += 1;
        self.last_delta = delta;
        if is_bet_grid_delta(delta.abs(), config) {
            self.bet_matches += 1;
        } else {
            self.bet_mismatches += 1;
        }
        self.value = value;
        self.last_change_ms = Some(now_ms);
        true
    }

    pub fn has_ocr_match(&self) -> bool {
        self.any_matches > 0 || self.pot_matches > 0 || self.player_matches > 0 || self.npc_matches > 0
    }

    pub fn matched_within(&self, now_ms: u64, window_ms: u64) -> bool {
        self.last_ocr_match_ms
            .is_some_and(|at| now_ms.saturating_sub(at) <= window_ms)
    }

    pub fn bet_total(&self) -> u32 {
        self.bet_matches + self.bet_mismatches
    }

    /// Share of deltas that fit the bet grid; `None` before the first change.
    pub fn bet_ratio(&self) -> Option<f32> {
        let total = self.bet_total();
        (total > 0).then(|| self.bet_matches as f32 / total as f32)
    }

    pub fn changes_per_sec(&self, now_ms: u64) -> f32 {
        if now_ms <= self.first_seen_ms {
            return 0.0;
        }
        self.changes as f32 / ((now_ms - self.first_seen_ms) as f32 / 1000.0)
    }

    /// Changed at least once, not too often, and mostly in bet-sized steps.
    pub fn is_plausible(&self, now_ms: u64, config: &MoneyConfig) -> bool {
        if self.changes == 0 {
            return false;
        }
        let max_cps = config.likely_max_changes_per_sec;
        if max_cps > 0.0 && self.changes_per_sec(now_ms) > max_cps {
            return false;
        }
        if config.bet_step_filter_enabled {
            let total = self.bet_total();
            if total >= 5 && self.bet_matches * 2 < total {
                return false;
            }
        }
        true
    }

    pub fn rank_score(&self, now_ms: u64, config: &MoneyConfig) -> f32 {
        let mut score = self.pot_matches as f32 * 18.0
            + self.player_matches as f32 * 3.0
            + self.npc_matches as f32 * 4.5
            + self.any_matches as f32 * 1.2;
        if self.player_matches > self.pot_matches * 2 {
            score -= 6.0;
        }
        if self.is_plausible(now_ms, config) {
            score += 3.0;
        }
        score += self.changes.min(64) as f32 * 0.08;
        if config.bet_step_filter_enabled {
            score += self.bet_matches.min(48) as f32 * 0.35;
            score -= self.bet_mismatches.min(48) as f32 * 0.28;
            if let Some(ratio) = self.bet_ratio() {
                score += (ratio - 0.5) * 8.0;
            }
        }
        if self.matched_within(now_ms, RECENT_MATCH_MS) {
            score += 2.0;
        }
        score
    }
}
