//! Phase state machine.
//!
//! Raw score vectors are averaged over the last few cycles; the leading
//! phase must hold its lead for a configured time before it is confirmed.
//! Leaving the table is additionally guarded by a fade hold and a payout
//! hold.

use serde::Serialize;
use std::collections::VecDeque;

use super::phase::{Phase, PhaseScores, PHASE_COUNT};
use super::scorer::{DetectionScore, Gate};
use crate::config::PhaseConfig;

/// Number of score vectors averaged.
pub const HISTORY_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: Phase,
    pub to: Phase,
}

#[derive(Debug, Clone, Default)]
pub struct PhaseTracker {
    phase: Phase,
    confidence: f32,
    candidate: Phase,
    candidate_since: Option<u64>,
    history: VecDeque<PhaseScores>,
    last_anchor_at: Option<u64>,
    payout_hold_until: u64,
    settlement_serial: u64,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn is_active(&self) -> bool {
        self.phase.is_active()
    }

    /// Bumped on every confirmed entry into PayoutSettlement.
    pub fn settlement_serial(&self) -> u64 {
        self.settlement_serial
    }

    pub fn payout_hold_until(&self) -> u64 {
        self.payout_hold_until
    }

    pub fn note_anchor(&mut self, now_ms: u64) {
        self.last_anchor_at = Some(now_ms);
    }

    /// Opens (or extends) the payout hold window.
    pub fn arm_payout_hold(&mut self, now_ms: u64, config: &PhaseConfig) {
        let until = now_ms + config.payout_marker_grace_ms + config.payout_out_extra_ms;
        self.payout_hold_until = self.payout_hold_until.max(until);
    }

    fn smoothed(&self) -> PhaseScores {
        let mut avg: PhaseScores = [0.0; PHASE_COUNT];
        for scores in &self.history {
            for (slot, value) in avg.iter_mut().zip(scores) {
                *slot += value;
            }
        }
        let n = self.history.len().max(1) as f32;
        for slot in &mut avg {
            *slot /= n;
        }
        avg
    }

    /// Feeds one scored cycle. Fills in the smoothed scores, guess,
    /// confidence, stable time and gate of `score`, and returns the
    /// transition if one was confirmed.
    pub fn update(
        &mut self,
        score: &mut DetectionScore,
        now_ms: u64,
        config: &PhaseConfig,
    ) -> Option<Transition> {
        if score.is_gate_fail() {
            score.guess = self.phase;
            score.confidence = self.confidence;
            score.candidate_stable_ms = 0;
            return None;
        }

        self.history.push_back(score.scores);
        while self.history.len() > HISTORY_LEN {
            self.history.pop_front();
        }

        let smooth = self.smoothed();
        let mut best = 0;
        for i in 1..PHASE_COUNT {
            if smooth[i] > smooth[best] {
                best = i;
            }
        }
        let sum: f32 = smooth.iter().sum::<f32>().max(0.0001);

        score.scores = smooth;
        score.guess = Phase::from_index(best).unwrap_or_default();
        score.confidence = (smooth[best] / sum).clamp(0.0, 1.0);

        if self.candidate != score.guess {
            self.candidate = score.guess;
            self.candidate_since = Some(now_ms);
        }
        let stable = self
            .candidate_since
            .map_or(0, |since| now_ms.saturating_sub(since));
        score.candidate_stable_ms = stable;

        let confident = score.confidence >= config.confidence_threshold;
        let should_transition = if score.guess == Phase::Inactive {
            self.leave_allowed(score, now_ms, config)
        } else {
            confident
                && score.anchor
                && stable >= config.in_stable_ms
                && self.phase.can_transition(score.guess)
        };

        let mut transition = None;
        if should_transition && self.phase != score.guess {
            log::info!(
                "[PHASE] transition {} -> {} conf={:.2}",
                self.phase,
                score.guess,
                score.confidence
            );
            transition = Some(Transition {
                from: self.phase,
                to: score.guess,
            });
            self.phase = score.guess;
            if self.phase == Phase::PayoutSettlement {
                self.settlement_serial += 1;
                self.arm_payout_hold(now_ms, config);
            }
        }

        self.confidence = score.confidence;
        transition
    }

    /// Decides whether Inactive may be confirmed, recording a hold in the
    /// score's gate when one blocks it.
    fn leave_allowed(&self, score: &mut DetectionScore, now_ms: u64, config: &PhaseConfig) -> bool {
        let stable = score.candidate_stable_ms;
        let at_table = self.phase.is_active();
        let mut required = config.out_stable_ms;

        let fade_likely = config.blackout_guard_enabled
            && score.opacity_hint <= config.blackout_opacity_threshold;
        if fade_likely {
            required += config.blackout_out_extra_ms;
        }
        let recent_anchor = config.blackout_guard_enabled
            && at_table
            && self
                .last_anchor_at
                .is_some_and(|at| now_ms.saturating_sub(at) <= config.blackout_anchor_grace_ms);
        let fade_hold = fade_likely && recent_anchor && stable < required + config.blackout_max_hold_ms;

        let payout_window =
            config.payout_guard_enabled && at_table && self.payout_hold_until > now_ms;
        if payout_window {
            required += config.payout_out_extra_ms;
        }
        let payout_hold = payout_window && stable < required;

        if !score.anchor
            && score.confidence >= config.confidence_threshold
            && stable >= required
            && !fade_hold
            && !payout_hold
        {
            return true;
        }

        let hold = if fade_hold {
            Some((Gate::FadeHold, "fade_hold"))
        } else if payout_hold {
            Some((Gate::PayoutHold, "payout_hold"))
        } else {
            None
        };
        if let Some((gate, label)) = hold {
            score.gate = gate;
            if score.reasons.is_empty() || score.reasons == "-" {
                score.reasons = label.to_string();
            } else {
                score.reasons.push_str(", ");
                score.reasons.push_str(label);
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP: u64 = 100;

    fn scored(phase: Phase, anchor: bool, opacity: f32) -> DetectionScore {
        let mut scores = [0.0; PHASE_COUNT];
        scores[phase.index()] = 6.0;
        if phase != Phase::Inactive {
            scores[Phase::Inactive.index()] = 0.4;
        }
        DetectionScore {
            scores,
            anchor,
            opacity_hint: opacity,
            reasons: "-".to_string(),
            ..DetectionScore::default()
        }
    }

    /// Feeds `phase` every STEP from `from` up to and including `until`.
    fn feed(
        tracker: &mut PhaseTracker,
        config: &PhaseConfig,
        phase: Phase,
        anchor: bool,
        opacity: f32,
        from: u64,
        until: u64,
    ) -> Vec<(u64, Transition)> {
        let mut transitions = Vec::new();
        let mut t = from;
        while t <= until {
            let mut s = scored(phase, anchor, opacity);
            if anchor {
                tracker.note_anchor(t);
            }
            if let Some(tr) = tracker.update(&mut s, t, config) {
                transitions.push((t, tr));
            }
            t += STEP;
        }
        transitions
    }

    fn enter_decision(tracker: &mut PhaseTracker, config: &PhaseConfig) {
        let tr = feed(tracker, config, Phase::PlayerDecision, true, 0.8, 1000, 3000);
        assert_eq!(tracker.phase(), Phase::PlayerDecision);
        assert_eq!(tr.len(), 1);
    }

    #[test]
    fn test_enter_requires_stable_time_and_fires_once() {
        let config = PhaseConfig::default();
        let mut tracker = PhaseTracker::new();

        let mut first = scored(Phase::PlayerDecision, true, 0.8);
        assert!(tracker.update(&mut first, 1000, &config).is_none());
        assert_eq!(first.candidate_stable_ms, 0);
        assert_eq!(tracker.phase(), Phase::Inactive);

        let transitions = feed(&mut tracker, &config, Phase::PlayerDecision, true, 0.8, 1100, 5000);
        assert_eq!(transitions.len(), 1);
        let (at, tr) = transitions[0];
        assert_eq!(at, 1000 + config.in_stable_ms);
        assert_eq!(
            tr,
            Transition {
                from: Phase::Inactive,
                to: Phase::PlayerDecision
            }
        );
    }

    #[test]
    fn test_enter_requires_anchor() {
        let config = PhaseConfig::default();
        let mut tracker = PhaseTracker::new();
        let tr = feed(&mut tracker, &config, Phase::PlayerDecision, false, 0.8, 1000, 6000);
        assert!(tr.is_empty());
    }

    #[test]
    fn test_transition_table_blocks_reveal_from_inactive() {
        let config = PhaseConfig::default();
        let mut tracker = PhaseTracker::new();
        let tr = feed(&mut tracker, &config, Phase::ShowdownReveal, true, 0.5, 1000, 6000);
        assert!(tr.is_empty());
        assert_eq!(tracker.phase(), Phase::Inactive);
    }

    #[test]
    fn test_gate_fail_freezes() {
        let config = PhaseConfig::default();
        let mut tracker = PhaseTracker::new();
        enter_decision(&mut tracker, &config);
        let confidence = tracker.confidence();

        let mut failed = DetectionScore::failed(0.5);
        assert!(tracker.update(&mut failed, 3100, &config).is_none());
        assert_eq!(failed.guess, Phase::PlayerDecision);
        assert_eq!(failed.confidence, confidence);
        assert_eq!(failed.candidate_stable_ms, 0);
        assert_eq!(tracker.phase(), Phase::PlayerDecision);
    }

    #[test]
    fn test_leave_after_out_stable() {
        let config = PhaseConfig::default();
        let mut tracker = PhaseTracker::new();
        enter_decision(&mut tracker, &config);
        // Bright frame, no anchor: no holds apply
        let tr = feed(&mut tracker, &config, Phase::Inactive, false, 0.5, 3100, 12_000);
        assert_eq!(tr.len(), 1);
        assert_eq!(tracker.phase(), Phase::Inactive);
    }

    #[test]
    fn test_fade_hold_until_budget_exhausted() {
        let config = PhaseConfig {
            blackout_anchor_grace_ms: 20_000,
            ..PhaseConfig::default()
        };
        let mut tracker = PhaseTracker::new();
        enter_decision(&mut tracker, &config);

        let tr = feed(&mut tracker, &config, Phase::Inactive, false, 0.1, 3100, 11_300);
        assert!(tr.is_empty());
        assert_eq!(tracker.phase(), Phase::PlayerDecision);

        let mut s = scored(Phase::Inactive, false, 0.1);
        tracker.update(&mut s, 11_400, &config);
        assert!(s.candidate_stable_ms > config.out_stable_ms + config.blackout_out_extra_ms);
        assert_eq!(s.gate, Gate::FadeHold);
        assert!(s.reasons.contains("fade_hold"));

        let required = config.out_stable_ms + config.blackout_out_extra_ms + config.blackout_max_hold_ms;
        let tr = feed(&mut tracker, &config, Phase::Inactive, false, 0.1, 11_500, 3300 + required + 1000);
        assert_eq!(tr.len(), 1);
        assert_eq!(tracker.phase(), Phase::Inactive);
    }

    #[test]
    fn test_fade_hold_ends_with_anchor_grace() {
        let config = PhaseConfig::default();
        let mut tracker = PhaseTracker::new();
        enter_decision(&mut tracker, &config);

        // Last anchor at 3000; grace of 6000 ends at 9000, before the
        // max hold budget would.
        let tr = feed(&mut tracker, &config, Phase::Inactive, false, 0.1, 3100, 12_000);
        assert_eq!(tr.len(), 1);
        let (at, _) = tr[0];
        assert!(at > 3000 + config.blackout_anchor_grace_ms);
        assert!(at < 3300 + config.out_stable_ms + config.blackout_out_extra_ms + config.blackout_max_hold_ms);
    }

    #[test]
    fn test_payout_hold_extends_exit() {
        let config = PhaseConfig::default();
        let mut tracker = PhaseTracker::new();
        enter_decision(&mut tracker, &config);
        tracker.arm_payout_hold(3000, &config);

        feed(&mut tracker, &config, Phase::Inactive, false, 0.5, 3100, 9200);
        let mut s = scored(Phase::Inactive, false, 0.5);
        tracker.update(&mut s, 9300, &config);
        assert!(s.candidate_stable_ms > config.out_stable_ms);
        assert_eq!(s.gate, Gate::PayoutHold);
        assert_eq!(tracker.phase(), Phase::PlayerDecision);

        let tr = feed(&mut tracker, &config, Phase::Inactive, false, 0.5, 9400, 14_000);
        assert_eq!(tr.len(), 1);
        assert_eq!(tracker.phase(), Phase::Inactive);
    }

    #[test]
    fn test_settlement_serial_and_hold_on_payout_entry() {
        let config = PhaseConfig::default();
        let mut tracker = PhaseTracker::new();
        enter_decision(&mut tracker, &config);
        assert_eq!(tracker.settlement_serial(), 0);

        let tr = feed(&mut tracker, &config, Phase::PayoutSettlement, true, 0.5, 3100, 6000);
        assert_eq!(tr.len(), 1);
        assert_eq!(tracker.phase(), Phase::PayoutSettlement);
        assert_eq!(tracker.settlement_serial(), 1);
        let (at, _) = tr[0];
        assert_eq!(
            tracker.payout_hold_until(),
            at + config.payout_marker_grace_ms + config.payout_out_extra_ms
        );
    }
}
