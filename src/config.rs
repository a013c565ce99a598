//! Configuration types and loading.
//!
//! Loads settings from config.json at startup (and again on reload). Every
//! section falls back to defaults field by field, and [`Config::sanitize`]
//! clamps each tunable into its valid domain, reporting what it changed.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::fs;
use std::path::Path;

/// A rectangle in relative coordinates (0.0 to 1.0).
/// Used for defining screen regions that scale with window size.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelativeRect {
    /// X position of top-left corner (0.0 = left edge, 1.0 = right edge)
    pub x: f32,
    /// Y position of top-left corner (0.0 = top edge, 1.0 = bottom edge)
    pub y: f32,
    /// Width as fraction of window width
    pub width: f32,
    /// Height as fraction of window height
    pub height: f32,
}

impl RelativeRect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

impl Default for RelativeRect {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.1, 0.1)
    }
}

/// OCR capture and process settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub enabled: bool,
    /// Minimum time between OCR cycle starts
    pub interval_ms: u64,
    /// The tesseract process is killed after this long
    pub process_timeout_ms: u64,
    /// Tesseract page segmentation mode
    pub psm: u8,
    pub tesseract_path: String,
    /// Region with the action log and seat labels
    pub bottom_left: RelativeRect,
    /// Region with the pot readout
    pub top_right: RelativeRect,
    /// Comma separated keywords counted as keyword hits
    pub keywords: String,
    /// Seat name of the local player, matched before "you"
    pub player_name_hint: String,
    /// Consecutive start failures before the "OCR unavailable" warning
    pub start_failure_warn_after: u32,
    /// Period of the OCR/phase summary log, 0 disables it
    pub log_every_ms: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 1000,
            process_timeout_ms: 2000,
            psm: 11,
            tesseract_path: "tesseract".to_string(),
            bottom_left: RelativeRect::new(0.0, 0.34, 0.34, 0.66),
            top_right: RelativeRect::new(0.72, 0.0, 0.28, 0.30),
            keywords: "poker,ante,call,fold,raise,check,bet,pot,blind,cards,community,turn"
                .to_string(),
            player_name_hint: "arthur".to_string(),
            start_failure_warn_after: 3,
            log_every_ms: 0,
        }
    }
}

impl OcrConfig {
    /// Splits the keyword list on commas, semicolons and whitespace.
    pub fn keyword_list(&self) -> Vec<String> {
        self.keywords
            .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .map(|k| k.trim().to_ascii_lowercase())
            .filter(|k| !k.is_empty())
            .collect()
    }
}

/// Opacity hint: luma spread of a screen region, normalised to 0..1.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OpacityConfig {
    pub enabled: bool,
    pub region: RelativeRect,
    /// Luma standard deviation mapped to 0.0
    pub low: f32,
    /// Luma standard deviation mapped to 1.0
    pub high: f32,
}

impl Default for OpacityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            region: RelativeRect::new(0.72, 0.66, 0.27, 0.30),
            low: 8.0,
            high: 28.0,
        }
    }
}

/// Phase detection timing and hold guards.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseConfig {
    pub check_interval_ms: u64,
    pub enter_cooldown_ms: u64,
    pub in_stable_ms: u64,
    pub out_stable_ms: u64,
    pub confidence_threshold: f32,
    pub blackout_guard_enabled: bool,
    pub blackout_opacity_threshold: f32,
    pub blackout_anchor_grace_ms: u64,
    pub blackout_out_extra_ms: u64,
    pub blackout_max_hold_ms: u64,
    pub payout_guard_enabled: bool,
    pub payout_marker_grace_ms: u64,
    pub payout_out_extra_ms: u64,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 100,
            enter_cooldown_ms: 3000,
            in_stable_ms: 1800,
            out_stable_ms: 4200,
            confidence_threshold: 0.62,
            blackout_guard_enabled: true,
            blackout_opacity_threshold: 0.18,
            blackout_anchor_grace_ms: 6000,
            blackout_out_extra_ms: 2500,
            blackout_max_hold_ms: 2500,
            payout_guard_enabled: true,
            payout_marker_grace_ms: 9000,
            payout_out_extra_ms: 5000,
        }
    }
}

/// Candidate scanning, correlation and auto-lock settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MoneyConfig {
    pub scan_enabled: bool,
    pub scan_start: i32,
    /// Exclusive end of the scanned index range
    pub scan_end: i32,
    pub scan_batch: u32,
    pub scan_interval_ms: u64,
    pub scan_max_reads_per_step: u32,
    pub scan_max_step_ms: u64,
    /// Smallest raw store value kept as a candidate
    pub value_min: i32,
    /// Largest raw store value kept as a candidate
    pub value_max: i32,
    pub top_n: usize,
    /// Candidates that never changed are dropped after this long
    pub prune_ms: u64,
    pub log_enabled: bool,
    pub log_interval_ms: u64,
    pub log_top_n: usize,
    pub log_only_on_change: bool,
    /// 0 disables the change-rate ceiling
    pub likely_max_changes_per_sec: f32,
    pub bet_step_filter_enabled: bool,
    pub bet_step_dollars: i32,
    pub bet_min_dollars: i32,
    pub exception_log_cooldown_ms: u64,
    pub skip_fault_runs: bool,
    pub ocr_match_tolerance_cents: i64,
    pub npc_track_max: usize,
    pub auto_lock_pot: bool,
    pub auto_lock_pot_min_matches: u32,
    pub auto_lock_player: bool,
    pub auto_lock_player_min_matches: u32,
    /// Pinned pot index, -1 when unset
    pub pot_index: i32,
    /// Pinned player stack index, -1 when unset
    pub player_index: i32,
    pub overlay_multiplier: f32,
}

impl Default for MoneyConfig {
    fn default() -> Self {
        Self {
            scan_enabled: true,
            scan_start: 0,
            scan_end: 100_000,
            scan_batch: 512,
            scan_interval_ms: 20,
            scan_max_reads_per_step: 512,
            scan_max_step_ms: 4,
            value_min: 1,
            value_max: 500_000,
            top_n: 10,
            prune_ms: 300_000,
            log_enabled: true,
            log_interval_ms: 3000,
            log_top_n: 5,
            log_only_on_change: true,
            likely_max_changes_per_sec: 1.5,
            bet_step_filter_enabled: true,
            bet_step_dollars: 5,
            bet_min_dollars: 10,
            exception_log_cooldown_ms: 30_000,
            skip_fault_runs: true,
            ocr_match_tolerance_cents: 6,
            npc_track_max: 5,
            auto_lock_pot: true,
            auto_lock_pot_min_matches: 10,
            auto_lock_player: true,
            auto_lock_player_min_matches: 8,
            pot_index: -1,
            player_index: -1,
            overlay_multiplier: 2.0,
        }
    }
}

impl MoneyConfig {
    pub fn pot_pin(&self) -> Option<i32> {
        (self.pot_index >= 0).then_some(self.pot_index)
    }

    pub fn player_pin(&self) -> Option<i32> {
        (self.player_index >= 0).then_some(self.player_index)
    }

    pub fn in_value_range(&self, value: i64) -> bool {
        value >= self.value_min as i64 && value <= self.value_max as i64
    }

    /// Rescans run at twice the discovery cadence.
    pub fn rescan_interval_ms(&self) -> u64 {
        (self.scan_interval_ms / 2).max(1)
    }
}

/// Payout bonus settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PayoutConfig {
    pub enabled: bool,
    pub multiplier: f32,
    pub use_wins_amount: bool,
    pub fallback_to_pot: bool,
    pub cooldown_ms: u64,
    pub min_phase_confidence: f32,
    /// OCR amounts older than this are not used as a payout source
    pub fresh_ms: u64,
}

impl Default for PayoutConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            multiplier: 2.0,
            use_wins_amount: true,
            fallback_to_pot: true,
            cooldown_ms: 6000,
            min_phase_confidence: 0.55,
            fresh_ms: 10_000,
        }
    }
}

/// Dollars/cents disambiguation for amounts OCR read without a separator.
///
/// A 3-digit token is read as dollars only when the dollars form is closer
/// to the reference by more than `three_digit_margin_cents` and stays within
/// `reference * three_digit_ratio + three_digit_slack_cents`. The 4-digit rule
/// is the same with its own constants.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AmountConfig {
    pub max_cents: i64,
    pub three_digit_margin_cents: i64,
    pub three_digit_ratio: i64,
    pub three_digit_slack_cents: i64,
    pub four_digit_margin_cents: i64,
    pub four_digit_ratio: i64,
    pub four_digit_slack_cents: i64,
}

impl Default for AmountConfig {
    fn default() -> Self {
        Self {
            max_cents: 50_000_000,
            three_digit_margin_cents: 200,
            three_digit_ratio: 3,
            three_digit_slack_cents: 10_000,
            four_digit_margin_cents: 300,
            four_digit_ratio: 4,
            four_digit_slack_cents: 20_000,
        }
    }
}

/// Complete configuration, one section per subsystem.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ocr: OcrConfig,
    pub opacity: OpacityConfig,
    pub phase: PhaseConfig,
    pub money: MoneyConfig,
    pub payout: PayoutConfig,
    pub amounts: AmountConfig,
}

/// One tunable that was outside its domain and got clamped.
#[derive(Clone, Debug, PartialEq)]
pub struct ClampNotice {
    pub key: String,
    pub from: String,
    pub to: String,
}

fn clamp_field<T>(notices: &mut Vec<ClampNotice>, key: &str, value: &mut T, lo: T, hi: T)
where
    T: PartialOrd + Copy + Display,
{
    let clamped = if *value < lo {
        lo
    } else if *value > hi {
        hi
    } else {
        return;
    };
    notices.push(ClampNotice {
        key: key.to_string(),
        from: value.to_string(),
        to: clamped.to_string(),
    });
    *value = clamped;
}

fn raise_to<T>(notices: &mut Vec<ClampNotice>, key: &str, value: &mut T, floor: T)
where
    T: PartialOrd + Copy + Display,
{
    if *value < floor {
        notices.push(ClampNotice {
            key: key.to_string(),
            from: value.to_string(),
            to: floor.to_string(),
        });
        *value = floor;
    }
}

impl Config {
    /// Clamps every tunable into its valid range.
    ///
    /// Returns one notice per adjusted field and logs each as a warning.
    pub fn sanitize(&mut self) -> Vec<ClampNotice> {
        let mut n = Vec::new();

        let ocr = &mut self.ocr;
        clamp_field(&mut n, "ocr.interval_ms", &mut ocr.interval_ms, 200, 30_000);
        clamp_field(&mut n, "ocr.process_timeout_ms", &mut ocr.process_timeout_ms, 250, 10_000);
        clamp_field(&mut n, "ocr.psm", &mut ocr.psm, 3, 13);
        clamp_field(&mut n, "ocr.start_failure_warn_after", &mut ocr.start_failure_warn_after, 1, 100);
        clamp_field(&mut n, "ocr.log_every_ms", &mut ocr.log_every_ms, 0, 60_000);
        ocr.player_name_hint = ocr.player_name_hint.trim().to_ascii_lowercase();

        let op = &mut self.opacity;
        clamp_field(&mut n, "opacity.low", &mut op.low, 0.0, 255.0);
        clamp_field(&mut n, "opacity.high", &mut op.high, 0.0, 255.0);
        raise_to(&mut n, "opacity.high", &mut op.high, op.low + 0.1);

        let ph = &mut self.phase;
        clamp_field(&mut n, "phase.check_interval_ms", &mut ph.check_interval_ms, 10, 5000);
        clamp_field(&mut n, "phase.enter_cooldown_ms", &mut ph.enter_cooldown_ms, 0, 60_000);
        clamp_field(&mut n, "phase.in_stable_ms", &mut ph.in_stable_ms, 250, 15_000);
        clamp_field(&mut n, "phase.out_stable_ms", &mut ph.out_stable_ms, 500, 30_000);
        clamp_field(&mut n, "phase.confidence_threshold", &mut ph.confidence_threshold, 0.20, 0.95);
        clamp_field(&mut n, "phase.blackout_opacity_threshold", &mut ph.blackout_opacity_threshold, 0.0, 1.0);
        clamp_field(&mut n, "phase.blackout_anchor_grace_ms", &mut ph.blackout_anchor_grace_ms, 0, 60_000);
        clamp_field(&mut n, "phase.blackout_out_extra_ms", &mut ph.blackout_out_extra_ms, 0, 60_000);
        clamp_field(&mut n, "phase.blackout_max_hold_ms", &mut ph.blackout_max_hold_ms, 0, 60_000);
        clamp_field(&mut n, "phase.payout_marker_grace_ms", &mut ph.payout_marker_grace_ms, 0, 60_000);
        clamp_field(&mut n, "phase.payout_out_extra_ms", &mut ph.payout_out_extra_ms, 0, 60_000);

        let m = &mut self.money;
        raise_to(&mut n, "money.scan_start", &mut m.scan_start, 0);
        if m.scan_end <= m.scan_start {
            let end = m.scan_start.saturating_add(1);
            n.push(ClampNotice {
                key: "money.scan_end".to_string(),
                from: m.scan_end.to_string(),
                to: end.to_string(),
            });
            m.scan_end = end;
        }
        clamp_field(&mut n, "money.scan_batch", &mut m.scan_batch, 1, 1_000_000);
        clamp_field(&mut n, "money.scan_interval_ms", &mut m.scan_interval_ms, 1, 10_000);
        clamp_field(&mut n, "money.scan_max_reads_per_step", &mut m.scan_max_reads_per_step, 1, 1_000_000);
        clamp_field(&mut n, "money.scan_max_step_ms", &mut m.scan_max_step_ms, 1, 1000);
        raise_to(&mut n, "money.value_max", &mut m.value_max, m.value_min);
        clamp_field(&mut n, "money.top_n", &mut m.top_n, 1, 100);
        clamp_field(&mut n, "money.prune_ms", &mut m.prune_ms, 1000, 3_600_000);
        clamp_field(&mut n, "money.log_interval_ms", &mut m.log_interval_ms, 250, 600_000);
        clamp_field(&mut n, "money.log_top_n", &mut m.log_top_n, 1, 50);
        clamp_field(&mut n, "money.likely_max_changes_per_sec", &mut m.likely_max_changes_per_sec, 0.0, 1000.0);
        clamp_field(&mut n, "money.bet_step_dollars", &mut m.bet_step_dollars, 1, 1000);
        raise_to(&mut n, "money.bet_min_dollars", &mut m.bet_min_dollars, m.bet_step_dollars);
        clamp_field(&mut n, "money.exception_log_cooldown_ms", &mut m.exception_log_cooldown_ms, 0, 600_000);
        clamp_field(&mut n, "money.ocr_match_tolerance_cents", &mut m.ocr_match_tolerance_cents, 0, 2500);
        clamp_field(&mut n, "money.npc_track_max", &mut m.npc_track_max, 0, 32);
        clamp_field(&mut n, "money.auto_lock_pot_min_matches", &mut m.auto_lock_pot_min_matches, 1, 1000);
        clamp_field(&mut n, "money.auto_lock_player_min_matches", &mut m.auto_lock_player_min_matches, 1, 1000);
        raise_to(&mut n, "money.pot_index", &mut m.pot_index, -1);
        raise_to(&mut n, "money.player_index", &mut m.player_index, -1);
        clamp_field(&mut n, "money.overlay_multiplier", &mut m.overlay_multiplier, 0.1, 1000.0);

        let p = &mut self.payout;
        clamp_field(&mut n, "payout.multiplier", &mut p.multiplier, 1.0, 1000.0);
        clamp_field(&mut n, "payout.cooldown_ms", &mut p.cooldown_ms, 250, 600_000);
        clamp_field(&mut n, "payout.min_phase_confidence", &mut p.min_phase_confidence, 0.20, 0.99);
        clamp_field(&mut n, "payout.fresh_ms", &mut p.fresh_ms, 1000, 120_000);

        let a = &mut self.amounts;
        clamp_field(&mut n, "amounts.max_cents", &mut a.max_cents, 1, i32::MAX as i64);
        raise_to(&mut n, "amounts.three_digit_ratio", &mut a.three_digit_ratio, 1);
        raise_to(&mut n, "amounts.four_digit_ratio", &mut a.four_digit_ratio, 1);

        for notice in &n {
            log::warn!(
                "[CFG] WARNING: {} out of range ({}). Clamped to {}.",
                notice.key,
                notice.from,
                notice.to
            );
        }
        n
    }
}

/// Loads configuration from `path` or returns defaults, then sanitizes it.
///
/// A missing or malformed file is never fatal: the problem is logged and
/// defaults are used.
pub fn load_config(path: &Path) -> Config {
    log::info!("[CFG] Looking for config at: {}", path.display());

    let mut config = if path.exists() {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Config>(&contents) {
                Ok(config) => {
                    log::info!("[CFG] Config loaded from {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("[CFG] Failed to parse config: {}. Using defaults.", e);
                    Config::default()
                }
            },
            Err(e) => {
                log::warn!("[CFG] Failed to read config: {}. Using defaults.", e);
                Config::default()
            }
        }
    } else {
        log::info!("[CFG] Config not found. Using default config.");
        Config::default()
    };

    config.sanitize();
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_in_range() {
        let mut config = Config::default();
        assert!(config.sanitize().is_empty());
    }

    #[test]
    fn test_sanitize_reports_clamps() {
        let mut config = Config::default();
        config.ocr.interval_ms = 5;
        config.phase.confidence_threshold = 2.0;
        config.money.scan_start = 500;
        config.money.scan_end = 100;

        let notices = config.sanitize();

        assert_eq!(config.ocr.interval_ms, 200);
        assert!((config.phase.confidence_threshold - 0.95).abs() < 1e-6);
        assert_eq!(config.money.scan_end, 501);
        let keys: Vec<&str> = notices.iter().map(|n| n.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["ocr.interval_ms", "phase.confidence_threshold", "money.scan_end"]
        );
        assert_eq!(notices[0].from, "5");
        assert_eq!(notices[0].to, "200");
    }

    #[test]
    fn test_sanitize_keeps_dependent_bounds() {
        let mut config = Config::default();
        config.opacity.low = 40.0;
        config.opacity.high = 20.0;
        config.money.bet_step_dollars = 25;
        config.money.bet_min_dollars = 10;
        config.money.value_min = 100;
        config.money.value_max = 50;

        config.sanitize();

        assert!(config.opacity.high >= config.opacity.low + 0.1 - 1e-4);
        assert_eq!(config.money.bet_min_dollars, 25);
        assert_eq!(config.money.value_max, 100);
    }

    #[test]
    fn test_player_hint_is_normalized() {
        let mut config = Config::default();
        config.ocr.player_name_hint = "  Arthur ".to_string();
        config.sanitize();
        assert_eq!(config.ocr.player_name_hint, "arthur");
    }

    #[test]
    fn test_keyword_list_splits_and_lowercases() {
        let mut ocr = OcrConfig::default();
        ocr.keywords = "Poker, ante;CALL\n\nfold,,".to_string();
        assert_eq!(ocr.keyword_list(), vec!["poker", "ante", "call", "fold"]);
    }

    #[test]
    fn test_pins() {
        let mut money = MoneyConfig::default();
        assert_eq!(money.pot_pin(), None);
        money.pot_index = 42;
        assert_eq!(money.pot_pin(), Some(42));
    }

    #[test]
    fn test_load_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "money": { "scan_end": 2048, "top_n": 0 } }"#).unwrap();

        let config = load_config(&path);

        assert_eq!(config.money.scan_end, 2048);
        assert_eq!(config.money.top_n, 1);
        assert_eq!(config.money.scan_batch, 512);
        assert_eq!(config.ocr.psm, 11);
    }

    #[test]
    fn test_load_malformed_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let config = load_config(&path);
        assert_eq!(config.phase.in_stable_ms, 1800);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.json"));
        assert_eq!(config.money.scan_end, 100_000);
    }
}
