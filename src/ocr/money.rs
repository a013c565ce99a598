//! Dollar amount extraction from lowercased OCR text.
//!
//! All amounts are integer cents. Input text must be ASCII (see
//! [`super::normalize::to_ascii_lower`]) so byte offsets are char boundaries.

use crate::config::AmountConfig;

/// Longest digit run consumed after a `$`.
const MAX_TOKEN_DIGITS: usize = 16;

/// NPC context window around a `$`, in bytes.
const NPC_LOOKBEHIND: usize = 22;
const NPC_LOOKAHEAD: usize = 42;

/// Words that mark an amount as belonging to the pot, a winner or an action
/// row rather than a seat label.
const NPC_REJECT_TOKENS: &[&str] = &[
    "pot", "main pot", "side pot", "wins", "winner", "collect", "blind", "called", "check",
    "checked", "bet", "raised", "raise", "fold", "turn",
];

/// Maps an OCR lookalike letter to the digit it was most likely meant as.
pub fn ocr_digit(c: u8) -> Option<u8> {
    match c {
        b'o' | b'O' | b'q' | b'Q' | b'd' | b'D' => Some(b'0'),
        b'i' | b'I' | b'l' | b'L' | b'|' | b'!' => Some(b'1'),
        b'z' | b'Z' => Some(b'2'),
        b's' | b'S' => Some(b'5'),
        b'b' | b'B' => Some(b'8'),
        _ => None,
    }
}

/// True if `amount` is within `tolerance` of `reference`. Non-positive values
/// never match.
pub fn amounts_match(amount: i64, reference: i64, tolerance: i64) -> bool {
    amount > 0 && reference > 0 && (amount - reference).abs() <= tolerance
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Parses `$` amounts, biased toward a recent reference amount when a token
/// has no decimal separator.
#[derive(Debug, Clone, Copy)]
pub struct AmountParser<'a> {
    tuning: &'a AmountConfig,
    reference: Option<i64>,
}

impl<'a> AmountParser<'a> {
    pub fn new(tuning: &'a AmountConfig, reference: Option<i64>) -> Self {
        Self {
            tuning,
            reference: reference.filter(|r| *r > 0),
        }
    }

    /// Converts a digit token (optionally with one `.`/`,` separator) to cents.
    ///
    /// Without a separator, ≤2 digits are dollars while 3 and 4+ digits default
    /// to cents. The dollars form wins only when the reference clearly favours
    /// it and stays within the configured magnitude guard (3 and exactly 4
    /// digits only). Results outside `1..=max_cents` are rejected.
    pub fn parse_token(&self, token: &str) -> Option<i64> {
        let cents = match token.find(['.', ',']) {
            Some(sep) => {
                let (left, right) = (&token[..sep], &token[sep + 1..]);
                if !all_digits(left) || !all_digits(right) {
                    return None;
                }
                let dollars: i64 = left.parse().ok()?;
                let digits = right.as_bytes();
                let frac = if digits.len() == 1 {
                    (digits[0] - b'0') as i64 * 10
                } else {
                    (digits[0] - b'0') as i64 * 10 + (digits[1] - b'0') as i64
                };
                dollars.checked_mul(100)?.checked_add(frac)?
            }
            None => {
                if !all_digits(token) {
                    return None;
                }
                let raw: i64 = token.parse().ok()?;
                let as_cents = raw;
                let as_dollars = raw.checked_mul(100)?;
                let t = self.tuning;
                match token.len() {
                    0..=2 => as_dollars,
                    3 => self.pick(
                        as_cents,
                        as_dollars,
                        t.three_digit_margin_cents,
                        t.three_digit_ratio,
                        t.three_digit_slack_cents,
                    ),
                    4 => self.pick(
                        as_cents,
                        as_dollars,
                        t.four_digit_margin_cents,
                        t.four_digit_ratio,
                        t.four_digit_slack_cents,
                    ),
                    _ => as_cents,
                }
            }
        };

        (cents > 0 && cents <= self.tuning.max_cents).then_some(cents)
    }

    fn pick(&self, as_cents: i64, as_dollars: i64, margin: i64, ratio: i64, slack: i64) -> i64 {
        let Some(reference) = self.reference else {
            return as_cents;
        };
        let diff_cents = (as_cents - reference).abs();
        let diff_dollars = (as_dollars - reference).abs();
        let ceiling = reference.saturating_mul(ratio).saturating_add(slack);
        if diff_dollars.saturating_add(margin) < diff_cents && as_dollars <= ceiling {
            as_dollars
        } else {
            as_cents
        }
    }

    /// Reads the amount that follows the `$` at byte `dollar`.
    ///
    /// Lookalike letters become digits, one embedded space is tolerated and
    /// one separator is kept. A lookalike letter after a space ends the token
    /// so the next word is not pulled in.
    pub fn parse_after_dollar(&self, text: &str, dollar: usize) -> Option<i64> {
        let bytes = text.as_bytes();
        if bytes.get(dollar) != Some(&b'$') {
            return None;
        }

        let mut i = dollar + 1;
        while i < bytes.len() && bytes[i] == b' ' {
            i += 1;
        }

        let mut token = String::with_capacity(MAX_TOKEN_DIGITS + 2);
        let mut seen_sep = false;
        let mut seen_digit = false;
        let mut space_run = 0;

        while i < bytes.len() {
            let c = bytes[i];
            if c.is_ascii_digit() {
                token.push(c as char);
                seen_digit = true;
                space_run = 0;
                i += 1;
                if token.len() >= MAX_TOKEN_DIGITS {
                    break;
                }
                continue;
            }
            if let Some(mapped) = ocr_digit(c) {
                if seen_digit && space_run > 0 {
                    break;
                }
                token.push(mapped as char);
                seen_digit = true;
                space_run = 0;
                i += 1;
                if token.len() >= MAX_TOKEN_DIGITS {
                    break;
                }
                continue;
            }
            if (c == b'.' || c == b',') && !seen_sep {
                if space_run > 0 {
                    break;
                }
                seen_sep = true;
                token.push('.');
                i += 1;
                continue;
            }
            if c == b' ' {
                if !seen_digit {
                    i += 1;
                    continue;
                }
                space_run += 1;
                if space_run <= 1 {
                    i += 1;
                    continue;
                }
            }
            break;
        }

        if !seen_digit {
            return None;
        }
        let token = token.trim_end_matches('.');
        if token.is_empty() {
            return None;
        }
        self.parse_token(token)
    }

    /// Amount at the first `$` within `lookahead` bytes after an occurrence of
    /// `token`. With `choose_max`, the largest over all occurrences.
    pub fn find_after(&self, text: &str, token: &str, lookahead: usize, choose_max: bool) -> Option<i64> {
        if token.is_empty() {
            return None;
        }
        let mut best: Option<i64> = None;
        let mut from = 0;
        while let Some(found) = text[from..].find(token) {
            let pos = from + found;
            let after = pos + token.len();
            let end = text.len().min(after + lookahead);
            if let Some(offset) = text[after..].find('$') {
                let dollar = after + offset;
                if dollar < end {
                    if let Some(cents) = self.parse_after_dollar(text, dollar) {
                        if !choose_max {
                            return Some(cents);
                        }
                        best = Some(best.map_or(cents, |b| b.max(cents)));
                    }
                }
            }
            from = after;
        }
        best
    }

    /// Amount at the nearest `$` within `lookback` bytes before an occurrence
    /// of `token`.
    pub fn find_before(&self, text: &str, token: &str, lookback: usize) -> Option<i64> {
        if token.is_empty() {
            return None;
        }
        let mut from = 0;
        while let Some(found) = text[from..].find(token) {
            let pos = from + found;
            let begin = pos.saturating_sub(lookback);
            if let Some(dollar) = text[..pos].rfind('$') {
                if dollar >= begin {
                    if let Some(cents) = self.parse_after_dollar(text, dollar) {
                        return Some(cents);
                    }
                }
            }
            from = pos + token.len();
        }
        None
    }

    /// [`find_after`](Self::find_after), falling back to
    /// [`find_before`](Self::find_before).
    pub fn find_near(&self, text: &str, token: &str, lookahead: usize, lookback: usize) -> Option<i64> {
        self.find_after(text, token, lookahead, false)
            .or_else(|| self.find_before(text, token, lookback))
    }
}

fn window_contains(text: &str, begin: usize, end: usize, token: &str) -> bool {
    let end = end.min(text.len());
    if token.is_empty() || begin >= end {
        return false;
    }
    text[begin..]
        .find(token)
        .is_some_and(|at| begin + at < end)
}

/// A comma followed by optional spaces and at least three letters, as in
/// `"$1,250 , rosa"` seat rows.
fn window_has_comma_name(text: &str, begin: usize, end: usize) -> bool {
    let bytes = text.as_bytes();
    let end = end.min(bytes.len());
    if begin >= end {
        return false;
    }
    for comma in (begin..end).filter(|&i| bytes[i] == b',') {
        let mut j = comma + 1;
        while j < end && bytes[j] == b' ' {
            j += 1;
        }
        let letters = bytes[j..end]
            .iter()
            .take_while(|b| b.is_ascii_lowercase())
            .count();
        if letters >= 3 {
            return true;
        }
    }
    false
}

/// True if the `$` at `dollar` sits in a seat-label row of another player.
pub fn is_npc_context(text: &str, dollar: usize, player_hint: &str) -> bool {
    if text.as_bytes().get(dollar) != Some(&b'$') {
        return false;
    }
    let begin = dollar.saturating_sub(NPC_LOOKBEHIND);
    let end = text.len().min(dollar + NPC_LOOKAHEAD);

    if NPC_REJECT_TOKENS
        .iter()
        .any(|t| window_contains(text, begin, end, t))
    {
        return false;
    }
    if window_contains(text, begin, end, player_hint) || window_contains(text, begin, end, "you") {
        return false;
    }
    if ["oc,", "0c,", "qc,"]
        .iter()
        .any(|t| window_contains(text, begin, end, t))
    {
        return true;
    }
    window_has_comma_name(text, begin, end)
}
