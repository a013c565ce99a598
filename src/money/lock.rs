//! Auto-lock: pinning a store index as the pot or player stack source.
//!
//! A lock is set at most once per session and never reassigned. Configured
//! pins take precedence and disable the matching auto-lock.

use serde::Serialize;
use serde_json::json;

use super::candidate::{value_matches, MoneyCandidate, RECENT_MATCH_MS};
use super::ranking::Ranked;
use crate::config::MoneyConfig;
use crate::notify::{NotificationSink, Notice};
use crate::ocr::{OcrSnapshot, PotSource};
use crate::persist::PersistenceSink;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceLocks {
    pot: Option<i32>,
    player: Option<i32>,
}

/// Pot lock evidence checks that do not depend on the current snapshot.
pub fn passes_pot_checks(c: &MoneyCandidate, now_ms: u64, config: &MoneyConfig) -> bool {
    if c.pot_matches < config.auto_lock_pot_min_matches || c.changes < 2 {
        return false;
    }
    if !c.is_plausible(now_ms, config) {
        return false;
    }
    if c.player_matches * 2 > c.pot_matches {
        return false;
    }
    if c.any_matches > 0 && c.pot_matches * 2 < c.any_matches {
        return false;
    }
    if config.bet_step_filter_enabled {
        let total = c.bet_total();
        if total >= 4 && c.bet_matches * 2 < total {
            return false;
        }
    }
    true
}

fn player_lock_score(c: &MoneyCandidate) -> f32 {
    c.player_matches as f32 * 12.0 - c.pot_matches as f32 * 7.0 - c.npc_matches as f32 * 2.5
        + c.any_matches as f32 * 0.5
}

impl SourceLocks {
    pub fn pot(&self) -> Option<i32> {
        self.pot
    }

    pub fn player(&self) -> Option<i32> {
        self.player
    }

    pub fn effective_pot(&self, config: &MoneyConfig) -> Option<i32> {
        config.pot_pin().or(self.pot)
    }

    pub fn effective_player(&self, config: &MoneyConfig) -> Option<i32> {
        config.player_pin().or(self.player)
    }

    /// Locks the pot to the first ranked candidate with enough evidence.
    pub fn try_lock_pot(
        &mut self,
        ranked: &[Ranked],
        snapshot: &OcrSnapshot,
        now_ms: u64,
        config: &MoneyConfig,
        persist: &mut dyn PersistenceSink,
        notify: &mut dyn NotificationSink,
    ) -> Option<i32> {
        if !config.auto_lock_pot || config.pot_pin().is_some() || self.pot.is_some() {
            return None;
        }
        // The largest-amount guess is too ambiguous to lock against.
        if snapshot.pot_source == PotSource::Fallback {
            return None;
        }
        let tolerance = config.ocr_match_tolerance_cents;
        let ocr_pot = snapshot.trusted_pot();

        let chosen = ranked.iter().map(|r| r.candidate).find(|c| {
            passes_pot_checks(c, now_ms, config)
                && ocr_pot.is_none_or(|pot| value_matches(c.value as i64, pot, tolerance))
                && c.matched_within(now_ms, RECENT_MATCH_MS)
        })?;

        self.pot = Some(chosen.index);
        log::info!(
            "[LOCK] Pot locked to idx={} (ocrPot={} ocrAny={} changes={} val={})",
            chosen.index,
            chosen.pot_matches,
            chosen.any_matches,
            chosen.changes,
            chosen.value
        );
        persist_index(persist, "pot_index", chosen.index);
        notify.post(Notice::PotLocked {
            index: chosen.index,
        });
        self.pot
    }

    /// Locks the player stack to the best player-matching candidate.
    pub fn try_lock_player<'a, I>(
        &mut self,
        candidates: I,
        snapshot: &OcrSnapshot,
        now_ms: u64,
        config: &MoneyConfig,
        persist: &mut dyn PersistenceSink,
        notify: &mut dyn NotificationSink,
    ) -> Option<i32>
    where
        I: IntoIterator<Item = &'a MoneyCandidate>,
    {
        if !config.auto_lock_player || config.player_pin().is_some() || self.player.is_some() {
            return None;
        }
        if snapshot.player.is_none_or(|p| p <= 0) {
            return None;
        }

        let mut best: Option<(&MoneyCandidate, f32)> = None;
        for c in candidates {
            if c.player_matches < config.auto_lock_player_min_matches
                || !c.matched_within(now_ms, RECENT_MATCH_MS)
            {
                continue;
            }
            let score = player_lock_score(c);
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((c, score));
            }
        }
        let (chosen, _) = best?;

        self.player = Some(chosen.index);
        log::info!(
            "[LOCK] Player stack locked to idx={} (ocrPlayer={} ocrPot={} ocrAny={} val={})",
            chosen.index,
            chosen.player_matches,
            chosen.pot_matches,
            chosen.any_matches,
            chosen.value
        );
        persist_index(persist, "player_index", chosen.index);
        notify.post(Notice::PlayerLocked {
            index: chosen.index,
        });
        self.player
    }
}

fn persist_index(persist: &mut dyn PersistenceSink, key: &str, index: i32) {
    match persist.set("money", key, json!(index)) {
        Ok(()) => log::info!("[LOCK] Persisted money.{}={}", key, index),
        Err(e) => log::warn!("[LOCK] Failed to persist money.{}={}: {:#}", key, index, e),
    }
}
