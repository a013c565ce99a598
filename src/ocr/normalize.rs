//! OCR text normalisation.
//!
//! Raw OCR output is lowercased and flattened so that only `[a-z0-9$]`
//! survive; everything else separates tokens. Common misreads of the fixed
//! keyword set are corrected per token.

use std::collections::HashMap;

/// Tokens that indicate the table UI is on screen.
pub const ANCHOR_TOKENS: &[&str] = &[
    "blind", "cards", "community", "pot", "call", "fold", "raise", "bet", "check", "turn",
    "pair", "straight", "flush", "wins", "amount", "called", "raised", "folded", "checked",
    "skip", "auto",
];

/// Normalised token stream plus a token-frequency map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedText {
    /// Corrected tokens joined by single spaces
    pub text: String,
    pub counts: HashMap<String, u32>,
}

impl NormalizedText {
    pub fn has(&self, token: &str) -> bool {
        self.counts.contains_key(token)
    }

    pub fn count(&self, token: &str) -> u32 {
        self.counts.get(token).copied().unwrap_or(0)
    }

    /// Whole-token phrase match, e.g. `"small blind"`.
    pub fn has_phrase(&self, phrase: &str) -> bool {
        let padded = format!(" {} ", self.text);
        padded.contains(&format!(" {} ", phrase))
    }

    /// Number of distinct anchor tokens present.
    pub fn anchor_hits(&self) -> usize {
        ANCHOR_TOKENS.iter().filter(|a| self.has(a)).count()
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Maps a known OCR misread to the intended keyword.
pub fn correct_token(token: &str) -> &str {
    match token {
        "comunity" | "communiry" | "communi" | "ommunity" => "community",
        "caros" | "cars" | "carns" | "car" | "card" => "cards",
        "calied" | "cailed" => "called",
        "fould" | "foid" => "fold",
        "checl" | "chec" => "check",
        "raisedd" => "raised",
        other => other,
    }
}

/// Flattens raw OCR text into corrected tokens. Tokens shorter than two
/// characters are dropped.
pub fn normalize(raw: &str) -> NormalizedText {
    let flat: String = raw
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '$' {
                c
            } else {
                ' '
            }
        })
        .collect();

    let mut out = NormalizedText::default();
    for token in flat.split_whitespace() {
        let token = correct_token(token);
        if token.len() < 2 {
            continue;
        }
        *out.counts.entry(token.to_string()).or_insert(0) += 1;
        if !out.text.is_empty() {
            out.text.push(' ');
        }
        out.text.push_str(token);
    }
    out
}

/// Lowercases ASCII and replaces every non-ASCII character with a space so
/// byte offsets can be sliced freely by the amount parser.
pub fn to_ascii_lower(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii() { c.to_ascii_lowercase() } else { ' ' })
        .collect()
}

/// Counts configured keywords occurring anywhere in the lowercased text.
pub fn keyword_hits(lowered: &str, keywords: &[String]) -> usize {
    keywords
        .iter()
        .filter(|k| !k.is_empty() && lowered.contains(k.as_str()))
        .count()
}
