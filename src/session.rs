//! The tick-driven session: one struct owning every piece of detector,
//! scanner and lock state.
//!
//! The host calls [`Session::tick`] at its own cadence, handing over the
//! OCR outcome that completed since the last tick (if any) and its I/O
//! adapters. Nothing here blocks or spawns threads.

use crate::config::Config;
use crate::detection::{score, DetectionInput, DetectionScore, Gate, Phase, PhaseTracker, Transition};
use crate::money::payout::{self, PayoutSink, PayoutState};
use crate::money::ranking::{rank, Ranking};
use crate::money::{IntStore, Scanner, SourceLocks};
use crate::notify::{NotificationSink, Notice};
use crate::ocr::normalize::{keyword_hits, normalize, to_ascii_lower};
use crate::ocr::preprocess::NEUTRAL_OPACITY;
use crate::ocr::snapshot::text_has_payout_marker;
use crate::ocr::{build_snapshot, OcrSnapshot};
use crate::persist::PersistenceSink;
use crate::status::{CandidateView, LockStatus, OverlayLine, OverlayPreview, TickReport, ValueSource};

pub use crate::ocr::OcrOutcome;

/// The host-side adapters a tick may touch.
pub struct HostIo<'a> {
    pub store: &'a mut dyn IntStore,
    pub persist: &'a mut dyn PersistenceSink,
    pub notify: &'a mut dyn NotificationSink,
    pub wallet: &'a mut dyn PayoutSink,
}

const HEARTBEAT_MIN_MS: u64 = 15_000;
const CANDIDATE_COUNT_LOG_DELTA: usize = 256;

/// Throttle for the ranked-candidate log.
#[derive(Debug, Default)]
struct MoneyLog {
    next_at_ms: u64,
    last_logged_ms: Option<u64>,
    last_top: Option<(i32, i32)>,
    last_count: Option<usize>,
}

impl MoneyLog {
    fn maybe_log(&mut self, ranking: &Ranking, scanner: &Scanner, now_ms: u64, config: &Config) {
        let m = &config.money;
        if !m.log_enabled || now_ms < self.next_at_ms {
            return;
        }
        self.next_at_ms = now_ms + m.log_interval_ms;

        let top = ranking.top().map(|r| (r.candidate.index, r.candidate.value));
        let count = scanner.len();
        if m.log_only_on_change {
            let heartbeat = HEARTBEAT_MIN_MS.max(m.log_interval_ms * 10);
            let heartbeat_due = self
                .last_logged_ms
                .is_none_or(|at| now_ms.saturating_sub(at) >= heartbeat);
            let count_moved = self
                .last_count
                .is_none_or(|last| last.abs_diff(count) >= CANDIDATE_COUNT_LOG_DELTA);
            if !heartbeat_due && !count_moved && top == self.last_top {
                return;
            }
        }
        self.last_logged_ms = Some(now_ms);
        self.last_top = top;
        self.last_count = Some(count);

        let status = scanner.status();
        log::info!(
            "[MONEY] Snapshot: cands={} cursor={}/{} wraps={} mode={}",
            count,
            status.cursor,
            status.scan_end,
            status.wraps,
            ranking.mode.as_str()
        );
        for r in ranking.entries.iter().take(m.log_top_n) {
            let c = r.candidate;
            log::info!(
                "[MONEY] Cand idx={} val={} (~{:.2} if cents) changes={} rate={:.2}/s step={}/{} ratio={:.2} lastDelta={:+} ocrAny={} ocrPot={} ocrPlayer={} ocrNpc={} score={:.1}",
                c.index,
                c.value,
                c.value as f64 / 100.0,
                c.changes,
                c.changes_per_sec(now_ms),
                c.bet_matches,
                c.bet_mismatches,
                c.bet_ratio().unwrap_or(-1.0),
                c.last_delta,
                c.any_matches,
                c.pot_matches,
                c.player_matches,
                c.npc_matches,
                r.score
            );
        }
    }
}

pub struct Session {
    config: Config,
    tracker: PhaseTracker,
    last_score: DetectionScore,
    snapshot: OcrSnapshot,
    next_sample_id: u64,
    pending: Option<OcrOutcome>,
    next_detect_ms: u64,
    last_enter_notice_ms: Option<u64>,
    next_summary_log_ms: u64,
    scanner: Scanner,
    locks: SourceLocks,
    payout: PayoutState,
    money_log: MoneyLog,
    report: TickReport,
}

impl Session {
    pub fn new(config: Config, now_ms: u64) -> Self {
        let scanner = Scanner::new(&config.money, now_ms);
        Self {
            tracker: PhaseTracker::new(),
            last_score: DetectionScore {
                opacity_hint: NEUTRAL_OPACITY,
                reasons: "-".to_string(),
                gate: Gate::Waiting,
                ..DetectionScore::default()
            },
            snapshot: OcrSnapshot::default(),
            next_sample_id: 1,
            pending: None,
            next_detect_ms: now_ms,
            last_enter_notice_ms: None,
            next_summary_log_ms: now_ms,
            scanner,
            locks: SourceLocks::default(),
            payout: PayoutState::default(),
            money_log: MoneyLog::default(),
            report: TickReport::default(),
            config,
        }
    }

    /// Replaces the configuration and restarts the whole pipeline.
    /// The caller is responsible for cancelling any in-flight OCR job.
    pub fn reload(&mut self, config: Config, now_ms: u64) {
        log::info!("[CFG] Reloaded; detector, scanner and locks reset");
        *self = Self::new(config, now_ms);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.tracker.phase()
    }

    pub fn tracker(&self) -> &PhaseTracker {
        &self.tracker
    }

    pub fn snapshot(&self) -> &OcrSnapshot {
        &self.snapshot
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    pub fn locks(&self) -> &SourceLocks {
        &self.locks
    }

    pub fn report(&self) -> &TickReport {
        &self.report
    }

    /// Advances the session by one host tick.
    pub fn tick(&mut self, now_ms: u64, outcome: Option<OcrOutcome>, io: &mut HostIo) -> &TickReport {
        if outcome.is_some() {
            self.pending = outcome;
        }

        let mut transition = None;
        if now_ms >= self.next_detect_ms {
            self.next_detect_ms = now_ms + self.config.phase.check_interval_ms;
            match self.pending.take() {
                Some(outcome) => {
                    transition = self.detect(outcome, now_ms);
                    self.log_summary(now_ms);
                }
                None => self.last_score.gate = Gate::Waiting,
            }
        }

        if let Some(t) = transition {
            self.on_transition(t, now_ms, io.notify);
        }

        self.report = TickReport {
            now_ms,
            phase: self.tracker.phase(),
            confidence: self.last_score.confidence,
            candidate_stable_ms: self.last_score.candidate_stable_ms,
            anchor: self.last_score.anchor,
            gate: self.last_score.gate,
            reasons: self.last_score.reasons.clone(),
            transition,
            money: (self.snapshot.sample_id > 0).then(|| self.snapshot.clone()),
            ..TickReport::default()
        };

        if self.tracker.is_active() {
            self.money_tick(now_ms, io);
        }
        self.report.scanner = self.scanner.status();
        self.report.locks = LockStatus {
            pot_index: self.locks.effective_pot(&self.config.money),
            pot_pinned: self.config.money.pot_pin().is_some(),
            player_index: self.locks.effective_player(&self.config.money),
            player_pinned: self.config.money.player_pin().is_some(),
        };
        &self.report
    }

    /// Scores one completed OCR cycle and feeds the state machine.
    fn detect(&mut self, outcome: OcrOutcome, now_ms: u64) -> Option<Transition> {
        let (text, opacity_hint) = match outcome {
            OcrOutcome::Text { text, opacity_hint } => (text, opacity_hint),
            OcrOutcome::Failed(e) => {
                log::debug!("[OCR] Gate fail: {}", e);
                let mut failed = DetectionScore::failed(self.last_score.opacity_hint);
                let transition = self.tracker.update(&mut failed, now_ms, &self.config.phase);
                self.last_score = failed;
                return transition;
            }
        };

        let lowered = to_ascii_lower(&text);
        let normalized = normalize(&lowered);
        let hits = keyword_hits(&lowered, &self.config.ocr.keyword_list());
        let mut scored = score(&DetectionInput {
            raw_text: &lowered,
            normalized: &normalized,
            keyword_hits: hits,
            opacity_hint,
            opacity_enabled: self.config.opacity.enabled,
        });
        if scored.anchor {
            self.tracker.note_anchor(now_ms);
        }

        let phase_cfg = &self.config.phase;
        let fade_likely =
            phase_cfg.blackout_guard_enabled && opacity_hint <= phase_cfg.blackout_opacity_threshold;
        let payout_marker = if fade_likely && !lowered.contains('$') {
            // A faded frame without amounts keeps the last good snapshot.
            text_has_payout_marker(&lowered)
        } else {
            let snapshot = build_snapshot(
                &lowered,
                self.next_sample_id,
                now_ms,
                self.snapshot.reference(),
                &self.config,
            );
            self.next_sample_id += 1;
            self.snapshot = snapshot;
            if self.tracker.is_active() {
                self.scanner.correlate_all(
                    &self.snapshot,
                    self.config.money.ocr_match_tolerance_cents,
                    now_ms,
                );
            }
            self.snapshot.has_payout_marker()
        };
        if payout_marker && self.config.phase.payout_guard_enabled {
            self.tracker.arm_payout_hold(now_ms, &self.config.phase);
        }

        let transition = self.tracker.update(&mut scored, now_ms, &self.config.phase);
        self.last_score = scored;
        transition
    }

    fn on_transition(&mut self, t: Transition, now_ms: u64, notify: &mut dyn NotificationSink) {
        if !t.from.is_active() && t.to.is_active() {
            let cooldown = self.config.phase.enter_cooldown_ms;
            let due = self
                .last_enter_notice_ms
                .is_none_or(|at| now_ms.saturating_sub(at) >= cooldown);
            log::info!("[PHASE] Entered table ({})", t.to);
            if due {
                notify.post(Notice::EnteredTable);
                self.last_enter_notice_ms = Some(now_ms);
                // A quick re-entry keeps the candidates gathered so far.
                self.scanner.reset(&self.config.money, now_ms);
            }
        } else if t.from.is_active() && !t.to.is_active() {
            log::info!("[PHASE] Left table (was {})", t.from);
            notify.post(Notice::LeftTable);
        }
    }

    fn money_tick(&mut self, now_ms: u64, io: &mut HostIo) {
        let config = &self.config;
        self.scanner
            .step(&mut *io.store, &self.snapshot, now_ms, &config.money);

        let ranking = rank(self.scanner.candidates(), now_ms, &config.money);
        self.money_log
            .maybe_log(&ranking, &self.scanner, now_ms, config);
        self.locks.try_lock_pot(
            &ranking.entries,
            &self.snapshot,
            now_ms,
            &config.money,
            &mut *io.persist,
            &mut *io.notify,
        );
        self.locks.try_lock_player(
            self.scanner.candidates(),
            &self.snapshot,
            now_ms,
            &config.money,
            &mut *io.persist,
            &mut *io.notify,
        );
        self.report.rank_mode = ranking.mode;
        self.report.candidates = ranking
            .entries
            .iter()
            .take(config.money.top_n)
            .map(|r| CandidateView::from_ranked(r, now_ms))
            .collect();

        let pot_value = read_index(io.store, self.locks.effective_pot(&config.money));
        let player_value = read_index(io.store, self.locks.effective_player(&config.money));
        let fresh = self.snapshot.is_fresh(now_ms, config.payout.fresh_ms);
        let multiplier = config.money.overlay_multiplier;
        let overlay_line = |store: Option<i64>, ocr: Option<i64>| {
            store
                .map(|v| OverlayLine::new(ValueSource::Store, v, multiplier))
                .or_else(|| {
                    ocr.filter(|&v| fresh && v > 0)
                        .map(|v| OverlayLine::new(ValueSource::Ocr, v, multiplier))
                })
        };
        self.report.overlay = OverlayPreview {
            multiplier,
            player: overlay_line(player_value, self.snapshot.player),
            pot: overlay_line(pot_value, self.snapshot.pot),
        };

        if config.payout.enabled {
            let preview = payout::preview(&self.snapshot, pot_value, now_ms, config);
            self.report.payout = preview;
            self.report.payout_applied = self.payout.try_apply(
                self.tracker.phase(),
                self.tracker.confidence(),
                self.tracker.settlement_serial(),
                preview,
                now_ms,
                &config.payout,
                &mut *io.wallet,
                &mut *io.notify,
            );
        }
    }

    fn log_summary(&mut self, now_ms: u64) {
        let every = self.config.ocr.log_every_ms;
        if every == 0 || now_ms < self.next_summary_log_ms {
            return;
        }
        self.next_summary_log_ms = now_ms + every;
        let s = &self.last_score;
        log::info!(
            "[OCR] phase={} guess={} conf={:.2} stable={}ms anchor={} kw={} opacity={:.2} gate={} reasons={}",
            self.tracker.phase(),
            s.guess,
            s.confidence,
            s.candidate_stable_ms,
            s.anchor,
            s.keyword_hits,
            s.opacity_hint,
            s.gate.as_str(),
            s.reasons
        );
    }
}

/// Live value of an effective index; unreadable counts as absent.
fn read_index(store: &mut dyn IntStore, index: Option<i32>) -> Option<i64> {
    let index = index?;
    match store.read(index) {
        Ok(value) if value > 0 => Some(value as i64),
        Ok(_) => None,
        Err(e) => {
            log::debug!("[MONEY] Locked index unreadable: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OcrError;
    use crate::money::{LedgerWallet, MemoryStore};
    use crate::persist::MemorySettings;

    // "small blind $5 your cards call $10" alone scores about 0.54 confidence,
    // under the 0.62 threshold; "take your turn" makes the decision phase clear.
    const DECISION_TEXT: &str = "small blind $5 your cards take your turn call $10";

    #[derive(Default)]
    struct Host {
        store: MemoryStore,
        persist: MemorySettings,
        notices: Vec<Notice>,
        wallet: LedgerWallet,
    }

    impl Host {
        fn io(&mut self) -> HostIo<'_> {
            HostIo {
                store: &mut self.store,
                persist: &mut self.persist,
                notify: &mut self.notices,
                wallet: &mut self.wallet,
            }
        }
    }

    fn text(t: &str, opacity: f32) -> Option<OcrOutcome> {
        Some(OcrOutcome::Text {
            text: t.to_string(),
            opacity_hint: opacity,
        })
    }

    fn small_scan() -> Config {
        let mut config = Config::default();
        config.money.scan_end = 200;
        config.money.scan_max_step_ms = 1000;
        config
    }

    /// Ticks every 100 ms with the same OCR text, from `from` to `until`.
    fn run(session: &mut Session, host: &mut Host, t: &str, opacity: f32, from: u64, until: u64) {
        let mut now = from;
        while now <= until {
            session.tick(now, text(t, opacity), &mut host.io());
            now += 100;
        }
    }

    #[test]
    fn test_enter_and_leave_table() {
        let config = small_scan();
        let (in_stable, out_stable, fade_extra) = (
            config.phase.in_stable_ms,
            config.phase.out_stable_ms,
            config.phase.blackout_out_extra_ms,
        );
        let mut session = Session::new(config, 0);
        let mut host = Host::default();

        run(&mut session, &mut host, DECISION_TEXT, 0.8, 1000, 1000 + in_stable);
        assert_eq!(session.phase(), Phase::PlayerDecision);
        assert!(session.report().anchor);
        assert_eq!(host.notices, vec![Notice::EnteredTable]);

        let start = 1100 + in_stable;
        run(&mut session, &mut host, "", 0.1, start, start + out_stable + fade_extra + 1000);
        assert_eq!(session.phase(), Phase::Inactive);
        assert_eq!(host.notices, vec![Notice::EnteredTable, Notice::LeftTable]);
    }

    #[test]
    fn test_blinds_and_cards_alone_stay_inactive() {
        let config = small_scan();
        let in_stable = config.phase.in_stable_ms;
        let mut session = Session::new(config, 0);
        let mut host = Host::default();

        let t = "small blind $5 your cards call $10";
        run(&mut session, &mut host, t, 0.8, 1000, 3000 + in_stable);
        assert_eq!(session.phase(), Phase::Inactive);
        assert!(session.report().anchor);
        assert!(session.report().confidence < session.config().phase.confidence_threshold);
        assert!(host.notices.is_empty());
    }

    /// Enters, leaves, and re-enters; returns the re-entry time.
    fn enter_leave_reenter(session: &mut Session, host: &mut Host) -> u64 {
        let phase = session.config().phase.clone();
        run(session, host, DECISION_TEXT, 0.8, 1000, 1000 + phase.in_stable_ms);
        assert!(session.tracker().is_active());

        let leave = 1100 + phase.in_stable_ms;
        let back = leave + phase.out_stable_ms + phase.blackout_out_extra_ms + 1000;
        run(session, host, "", 0.1, leave, back);
        assert_eq!(session.phase(), Phase::Inactive);

        let mut now = back + 100;
        while !session.tracker().is_active() {
            session.tick(now, text(DECISION_TEXT, 0.8), &mut host.io());
            now += 100;
            assert!(now < back + 10_000);
        }
        now - 100
    }

    #[test]
    fn test_reentry_within_cooldown_keeps_candidates() {
        let mut config = small_scan();
        config.phase.enter_cooldown_ms = 60_000;
        let mut session = Session::new(config, 0);
        let mut host = Host::default();
        host.store.set(50, 1234);

        let reentered_at = enter_leave_reenter(&mut session, &mut host);
        let c = session.scanner().candidate(50).unwrap();
        assert!(c.first_seen_ms < reentered_at);
        assert_eq!(host.notices, vec![Notice::EnteredTable, Notice::LeftTable]);
    }

    #[test]
    fn test_reentry_after_cooldown_resets_scan() {
        let mut config = small_scan();
        config.phase.enter_cooldown_ms = 0;
        let mut session = Session::new(config, 0);
        let mut host = Host::default();
        host.store.set(50, 1234);

        let reentered_at = enter_leave_reenter(&mut session, &mut host);
        let c = session.scanner().candidate(50).unwrap();
        assert_eq!(c.first_seen_ms, reentered_at);
        assert_eq!(
            host.notices,
            vec![Notice::EnteredTable, Notice::LeftTable, Notice::EnteredTable]
        );
    }

    #[test]
    fn test_single_spike_does_not_enter() {
        let mut session = Session::new(small_scan(), 0);
        let mut host = Host::default();
        session.tick(1000, text(DECISION_TEXT, 0.8), &mut host.io());
        run(&mut session, &mut host, "", 0.5, 1100, 4000);
        assert_eq!(session.phase(), Phase::Inactive);
        assert!(host.notices.is_empty());
    }

    #[test]
    fn test_ocr_failure_freezes_phase() {
        let mut session = Session::new(small_scan(), 0);
        let mut host = Host::default();
        run(&mut session, &mut host, DECISION_TEXT, 0.8, 1000, 3000);
        assert_eq!(session.phase(), Phase::PlayerDecision);
        let confidence = session.report().confidence;

        for i in 0..80 {
            let report = session.tick(
                3100 + i * 100,
                Some(OcrOutcome::Failed(OcrError::Timeout(2000))),
                &mut host.io(),
            );
            assert_eq!(report.gate, Gate::OcrFail);
            assert_eq!(report.phase, Phase::PlayerDecision);
            assert_eq!(report.confidence, confidence);
        }
    }

    #[test]
    fn test_waiting_gate_without_outcome() {
        let mut session = Session::new(small_scan(), 0);
        let mut host = Host::default();
        let report = session.tick(0, None, &mut host.io());
        assert_eq!(report.gate, Gate::Waiting);
        assert!(report.money.is_none());
    }

    #[test]
    fn test_fade_keeps_previous_snapshot() {
        let mut session = Session::new(small_scan(), 0);
        let mut host = Host::default();
        session.tick(1000, text("pot $40", 0.8), &mut host.io());
        assert_eq!(session.snapshot().pot, Some(4000));
        let id = session.snapshot().sample_id;

        session.tick(1100, text("pot", 0.05), &mut host.io());
        assert_eq!(session.snapshot().sample_id, id);

        // Bright frames replace it even without amounts
        session.tick(1200, text("pot", 0.8), &mut host.io());
        assert_eq!(session.snapshot().pot, None);
    }

    #[test]
    fn test_payout_marker_arms_hold() {
        let mut session = Session::new(small_scan(), 0);
        let mut host = Host::default();
        session.tick(1000, text("rosa wins $30", 0.5), &mut host.io());
        let hold = session.tracker().payout_hold_until();
        let phase = &session.config().phase;
        assert_eq!(hold, 1000 + phase.payout_marker_grace_ms + phase.payout_out_extra_ms);
    }

    #[test]
    fn test_pot_auto_lock_end_to_end() {
        let mut session = Session::new(small_scan(), 0);
        let mut host = Host::default();

        let mut now = 1000;
        while now <= 9000 {
            // The pot grows by $10 every second; index 77 tracks it in cents.
            let dollars = 40 + 10 * ((now - 1000) / 1000) as i64;
            host.store.set(77, (dollars * 100) as i32);
            let t = format!("small blind big blind community cards pot ${}", dollars);
            session.tick(now, text(&t, 0.8), &mut host.io());
            now += 100;
        }

        assert_eq!(session.phase(), Phase::TableIdle);
        assert_eq!(session.locks().pot(), Some(77));
        assert!(host.notices.contains(&Notice::PotLocked { index: 77 }));
        assert_eq!(host.persist.writes.len(), 1);
        let report = session.report();
        assert_eq!(report.locks.pot_index, Some(77));
        assert_eq!(report.candidates[0].candidate.index, 77);
        let pot = report.overlay.pot.unwrap();
        assert_eq!(pot.source, ValueSource::Store);
        assert_eq!(pot.boosted_cents, pot.cents * 2);
    }

    #[test]
    fn test_pinned_pot_feeds_overlay() {
        let mut config = small_scan();
        config.money.pot_index = 5;
        let mut session = Session::new(config, 0);
        let mut host = Host::default();
        host.store.set(5, 2500);

        run(&mut session, &mut host, DECISION_TEXT, 0.8, 1000, 3000);
        let report = session.report();
        assert!(report.locks.pot_pinned);
        assert_eq!(report.overlay.pot.map(|l| l.cents), Some(2500));
    }

    #[test]
    fn test_reload_resets_everything() {
        let mut session = Session::new(small_scan(), 0);
        let mut host = Host::default();
        run(&mut session, &mut host, DECISION_TEXT, 0.8, 1000, 3000);
        assert!(session.tracker().is_active());

        session.reload(small_scan(), 3100);
        assert_eq!(session.phase(), Phase::Inactive);
        assert_eq!(session.snapshot().sample_id, 0);
        assert!(session.scanner().is_empty());
    }

    #[test]
    fn test_payout_applied_once_per_settlement() {
        let mut config = small_scan();
        config.payout.enabled = true;
        let mut session = Session::new(config, 0);
        let mut host = Host::default();

        run(&mut session, &mut host, DECISION_TEXT, 0.8, 1000, 3000);
        run(&mut session, &mut host, "pot $40 rosa wins $40", 0.5, 3100, 7000);
        assert_eq!(session.phase(), Phase::PayoutSettlement);
        assert_eq!(host.wallet.credits, 1);
        assert_eq!(host.wallet.credited_cents, 4000);
        assert!(host.notices.contains(&Notice::PayoutApplied { bonus_cents: 4000 }));
    }
}
