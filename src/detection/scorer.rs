//! Per-phase weighted scoring of one OCR cycle.
//!
//! Each rule adds a fixed weight to one phase when its phrase or token is
//! present. The opacity hint adds a secondary nudge, and the Inactive slot
//! gets a bias whenever the capture looks sparse.

use serde::Serialize;

use self::Cue::{EitherToken, Phrase, Raw, Token};
use super::phase::Phase::{
    Inactive, PayoutSettlement, PlayerDecision, ShowdownReveal, TableIdle, WaitingAction,
};
use super::phase::{Phase, PhaseScores, PHASE_COUNT};
use crate::ocr::normalize::NormalizedText;

const HIGH_OPACITY: f32 = 0.70;
const LOW_OPACITY: f32 = 0.30;
const MAX_REASONS: usize = 4;

/// Why a cycle did or did not move the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    #[default]
    Ok,
    /// OCR failed or timed out; state frozen
    OcrFail,
    /// Leaving the table held back by a fade with a recent anchor
    FadeHold,
    /// Leaving the table held back by a recent payout marker
    PayoutHold,
    /// No OCR result this tick
    Waiting,
}

impl Gate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gate::Ok => "ok",
            Gate::OcrFail => "ocr_fail",
            Gate::FadeHold => "fade_hold",
            Gate::PayoutHold => "payout_hold",
            Gate::Waiting => "waiting",
        }
    }
}

/// What the scorer sees of one completed OCR cycle.
#[derive(Debug, Clone, Copy)]
pub struct DetectionInput<'a> {
    /// Lowercased text of both regions
    pub raw_text: &'a str,
    pub normalized: &'a NormalizedText,
    pub keyword_hits: usize,
    pub opacity_hint: f32,
    /// False when the opacity hint is disabled and carries no signal
    pub opacity_enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DetectionScore {
    /// Raw scores from the scorer; replaced by the smoothed window in the tracker
    pub scores: PhaseScores,
    pub guess: Phase,
    pub confidence: f32,
    /// Any anchor token present
    pub anchor: bool,
    pub anchor_hits: usize,
    pub keyword_hits: usize,
    pub candidate_stable_ms: u64,
    pub opacity_hint: f32,
    pub gate: Gate,
    /// Top matched rules, e.g. `take your turn(2.6), call(1.1)`
    pub reasons: String,
}

impl DetectionScore {
    /// Score of a failed OCR cycle. The tracker freezes on it.
    pub fn failed(opacity_hint: f32) -> Self {
        Self {
            gate: Gate::OcrFail,
            opacity_hint,
            reasons: "-".to_string(),
            ..Self::default()
        }
    }

    pub fn is_gate_fail(&self) -> bool {
        self.gate == Gate::OcrFail
    }
}

#[derive(Clone, Copy)]
enum Cue {
    Phrase(&'static str),
    Token(&'static str),
    EitherToken(&'static str, &'static str),
    /// Substring of the raw lowercased text
    Raw(&'static str),
}

struct Rule {
    phase: Phase,
    weight: f32,
    cue: Cue,
    label: &'static str,
}

const fn rule(phase: Phase, weight: f32, cue: Cue, label: &'static str) -> Rule {
    Rule {
        phase,
        weight,
        cue,
        label,
    }
}

const RULES: &[Rule] = &[
    rule(TableIdle, 2.2, Phrase("small blind"), "small blind"),
    rule(TableIdle, 2.2, Phrase("big blind"), "big blind"),
    rule(TableIdle, 0.8, Token("blind"), "blind"),
    rule(TableIdle, 1.2, Token("pot"), "pot"),
    rule(PlayerDecision, 2.4, Phrase("your cards"), "your cards"),
    rule(PlayerDecision, 2.6, Phrase("take your turn"), "take your turn"),
    rule(PlayerDecision, 1.1, EitherToken("call", "called"), "call"),
    rule(PlayerDecision, 1.1, EitherToken("fold", "folded"), "fold"),
    rule(PlayerDecision, 1.1, EitherToken("check", "checked"), "check"),
    rule(PlayerDecision, 1.1, EitherToken("raise", "raised"), "raise"),
    rule(PlayerDecision, 1.1, Token("bet"), "bet"),
    rule(PlayerDecision, 0.9, Token("amount"), "amount"),
    rule(WaitingAction, 2.0, Token("skip"), "skip"),
    rule(WaitingAction, 2.2, Phrase("auto bet"), "auto bet"),
    rule(WaitingAction, 0.7, Token("leave"), "leave"),
    rule(WaitingAction, 1.0, Token("waiting"), "waiting"),
    rule(ShowdownReveal, 1.6, Token("pair"), "pair"),
    rule(ShowdownReveal, 1.8, Token("straight"), "straight"),
    rule(ShowdownReveal, 1.8, Token("flush"), "flush"),
    rule(ShowdownReveal, 1.6, Token("muck"), "muck"),
    rule(ShowdownReveal, 1.4, Token("reveal"), "reveal"),
    rule(ShowdownReveal, 2.2, Phrase("waiting to reveal"), "waiting reveal"),
    rule(ShowdownReveal, 1.2, Phrase("community cards"), "community cards"),
    rule(PayoutSettlement, 3.0, Raw("wins $"), "wins $"),
    rule(PayoutSettlement, 1.8, Token("wins"), "wins"),
];

fn cue_matches(cue: Cue, input: &DetectionInput) -> bool {
    let n = input.normalized;
    match cue {
        Phrase(p) => n.has_phrase(p),
        Token(t) => n.has(t),
        EitherToken(a, b) => n.has(a) || n.has(b),
        Raw(s) => input.raw_text.contains(s),
    }
}

/// Scores one successful OCR cycle. The result has no guess yet; the
/// tracker smooths it and picks the leading phase.
pub fn score(input: &DetectionInput) -> DetectionScore {
    let mut scores: PhaseScores = [0.0; PHASE_COUNT];
    let mut reasons: Vec<(f32, &'static str)> = Vec::new();
    let mut add = |phase: Phase, weight: f32, label: &'static str| {
        scores[phase.index()] += weight;
        reasons.push((weight, label));
    };

    for rule in RULES.iter().filter(|r| cue_matches(r.cue, input)) {
        add(rule.phase, rule.weight, rule.label);
    }

    if input.opacity_enabled {
        if input.opacity_hint >= HIGH_OPACITY {
            add(PlayerDecision, 0.9, "opacity:active");
            add(TableIdle, 0.3, "opacity:active");
        } else if input.opacity_hint <= LOW_OPACITY {
            add(WaitingAction, 0.6, "opacity:faded");
            add(ShowdownReveal, 0.6, "opacity:faded");
            add(PayoutSettlement, 0.4, "opacity:faded");
        }
    }

    let anchor_hits = input.normalized.anchor_hits();
    let anchor = anchor_hits > 0;

    let mut out_bias = 0.4;
    if !anchor {
        out_bias += 2.2;
    }
    if input.normalized.len() < 6 {
        out_bias += 0.7;
    }
    if input.opacity_hint < 0.25 {
        out_bias += 0.3;
    }
    if input.normalized.has("leave") {
        out_bias += 0.4;
    }
    scores[Inactive.index()] += out_bias;

    DetectionScore {
        scores,
        guess: Inactive,
        confidence: 0.0,
        anchor,
        anchor_hits,
        keyword_hits: input.keyword_hits,
        candidate_stable_ms: 0,
        opacity_hint: input.opacity_hint,
        gate: Gate::Ok,
        reasons: summarize_reasons(reasons),
    }
}

fn summarize_reasons(mut reasons: Vec<(f32, &'static str)>) -> String {
    if reasons.is_empty() {
        return "-".to_string();
    }
    reasons.sort_by(|a, b| b.0.total_cmp(&a.0));
    let mut seen: Vec<&str> = Vec::with_capacity(MAX_REASONS);
    let mut parts = Vec::with_capacity(MAX_REASONS);
    for (weight, label) in reasons {
        if seen.contains(&label) {
            continue;
        }
        seen.push(label);
        parts.push(format!("{}({:.1})", label, weight));
        if parts.len() == MAX_REASONS {
            break;
        }
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::normalize::normalize;

    fn run(text: &str, opacity: f32) -> DetectionScore {
        let normalized = normalize(text);
        score(&DetectionInput {
            raw_text: text,
            normalized: &normalized,
            keyword_hits: 0,
            opacity_hint: opacity,
            opacity_enabled: true,
        })
    }

    fn slot(s: &DetectionScore, phase: Phase) -> f32 {
        s.scores[phase.index()]
    }

    #[test]
    fn test_decision_text_scores() {
        let s = run("small blind $5 your cards take your turn call $10", 0.8);
        assert!(s.anchor);
        assert!((slot(&s, PlayerDecision) - (2.4 + 2.6 + 1.1 + 0.9)).abs() < 1e-4);
        assert!((slot(&s, TableIdle) - (2.2 + 0.8 + 0.3)).abs() < 1e-4);
        assert!((slot(&s, Inactive) - 0.4).abs() < 1e-4);
        assert!(s.reasons.starts_with("take your turn(2.6), your cards(2.4)"));
    }

    #[test]
    fn test_empty_capture_biases_inactive() {
        let s = run("", 0.1);
        assert!(!s.anchor);
        // 0.4 base + 2.2 no anchor + 0.7 short + 0.3 dark
        assert!((slot(&s, Inactive) - 3.6).abs() < 1e-4);
        assert!((slot(&s, WaitingAction) - 0.6).abs() < 1e-4);
    }

    #[test]
    fn test_payout_markers() {
        let s = run("rosa wins $30", 0.5);
        assert!((slot(&s, PayoutSettlement) - 4.8).abs() < 1e-4);
    }

    #[test]
    fn test_opacity_disabled_adds_nothing() {
        let normalized = normalize("hello");
        let s = score(&DetectionInput {
            raw_text: "hello",
            normalized: &normalized,
            keyword_hits: 0,
            opacity_hint: 0.9,
            opacity_enabled: false,
        });
        assert_eq!(slot(&s, PlayerDecision), 0.0);
        assert_eq!(s.reasons, "-");
    }

    #[test]
    fn test_reasons_are_unique_and_capped() {
        let s = run("skip auto bet waiting leave pair flush straight", 0.1);
        let parts: Vec<&str> = s.reasons.split(", ").collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "auto bet(2.2)");
        let opacity_entries = parts.iter().filter(|p| p.starts_with("opacity")).count();
        assert!(opacity_entries <= 1);
    }

    #[test]
    fn test_failed_score() {
        let s = DetectionScore::failed(0.3);
        assert!(s.is_gate_fail());
        assert_eq!(s.gate.as_str(), "ocr_fail");
    }
}
