//! Payout bonus during PayoutSettlement.

use serde::Serialize;

use crate::config::{Config, PayoutConfig};
use crate::detection::Phase;
use crate::notify::{NotificationSink, Notice};
use crate::ocr::OcrSnapshot;

/// Credits a bonus to the player. A failed credit is logged and tried
/// again on a later tick.
pub trait PayoutSink {
    fn credit(&mut self, cents: i64) -> anyhow::Result<()>;
}

/// Keeps a running total; used by replays and tests.
#[derive(Debug, Default)]
pub struct LedgerWallet {
    pub credited_cents: i64,
    pub credits: u32,
}

impl PayoutSink for LedgerWallet {
    fn credit(&mut self, cents: i64) -> anyhow::Result<()> {
        self.credited_cents += cents;
        self.credits += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PayoutSource {
    #[serde(rename = "wins")]
    Wins,
    #[serde(rename = "potOCR")]
    PotOcr,
    #[serde(rename = "potGlobal")]
    PotGlobal,
}

impl PayoutSource {
    pub fn label(&self) -> &'static str {
        match self {
            PayoutSource::Wins => "wins",
            PayoutSource::PotOcr => "potOCR",
            PayoutSource::PotGlobal => "potGlobal",
        }
    }
}

/// What a payout would pay right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PayoutPreview {
    pub source: PayoutSource,
    pub source_cents: i64,
    pub bonus_cents: i64,
}

/// `round(source * multiplier) - source`.
pub fn bonus_for(source_cents: i64, multiplier: f32) -> i64 {
    (source_cents as f64 * multiplier as f64).round() as i64 - source_cents
}

/// Rejects amounts beyond the store ceiling, or far from a trusted OCR pot.
pub fn is_plausible_amount(cents: i64, snapshot: &OcrSnapshot, config: &Config) -> bool {
    if cents <= 0 || cents > config.money.value_max as i64 * 4 {
        return false;
    }
    match snapshot.trusted_pot().filter(|&p| p > 0) {
        Some(pot) => cents <= pot * 2 && cents * 3 >= pot,
        None => true,
    }
}

/// Picks the payout source: fresh OCR wins (if plausible), then fresh OCR
/// pot, then the live value of the locked pot index.
pub fn select_source(
    snapshot: &OcrSnapshot,
    locked_pot_cents: Option<i64>,
    now_ms: u64,
    config: &Config,
) -> Option<(PayoutSource, i64)> {
    let p: &PayoutConfig = &config.payout;
    let fresh = snapshot.is_fresh(now_ms, p.fresh_ms);
    let plausible = |cents: i64| is_plausible_amount(cents, snapshot, config);

    if p.use_wins_amount && fresh {
        if let Some(wins) = snapshot.wins.filter(|&w| plausible(w)) {
            return Some((PayoutSource::Wins, wins));
        }
    }
    if !p.fallback_to_pot {
        return None;
    }
    if fresh {
        if let Some(pot) = snapshot.trusted_pot().filter(|&c| c > 0) {
            return Some((PayoutSource::PotOcr, pot));
        }
    }
    // The OCR pot may be from an earlier hand here, so it cannot vet the live value.
    locked_pot_cents
        .filter(|&c| c > 0)
        .map(|c| (PayoutSource::PotGlobal, c))
}

pub fn preview(
    snapshot: &OcrSnapshot,
    locked_pot_cents: Option<i64>,
    now_ms: u64,
    config: &Config,
) -> Option<PayoutPreview> {
    let (source, source_cents) = select_source(snapshot, locked_pot_cents, now_ms, config)?;
    let bonus_cents = bonus_for(source_cents, config.payout.multiplier);
    (bonus_cents > 0).then_some(PayoutPreview {
        source,
        source_cents,
        bonus_cents,
    })
}

/// Pays at most once per settlement, with a cooldown between payouts.
#[derive(Debug, Clone, Default)]
pub struct PayoutState {
    last_paid_serial: u64,
    next_allowed_ms: u64,
}

impl PayoutState {
    #[allow(clippy::too_many_arguments)]
    pub fn try_apply(
        &mut self,
        phase: Phase,
        confidence: f32,
        settlement_serial: u64,
        preview: Option<PayoutPreview>,
        now_ms: u64,
        config: &PayoutConfig,
        wallet: &mut dyn PayoutSink,
        notify: &mut dyn NotificationSink,
    ) -> Option<i64> {
        if !config.enabled
            || phase != Phase::PayoutSettlement
            || confidence < config.min_phase_confidence
            || settlement_serial == self.last_paid_serial
            || now_ms < self.next_allowed_ms
        {
            return None;
        }
        let p = preview?;

        if let Err(e) = wallet.credit(p.bonus_cents) {
            log::warn!(
                "[PAYOUT] FAILED source={} src={}(${:.2}) bonus={}(${:.2}) mul={:.2}: {:#}",
                p.source.label(),
                p.source_cents,
                p.source_cents as f64 / 100.0,
                p.bonus_cents,
                p.bonus_cents as f64 / 100.0,
                config.multiplier,
                e
            );
            return None;
        }

        let target = p.source_cents + p.bonus_cents;
        log::info!(
            "[PAYOUT] Applied source={} src={}(${:.2}) bonus={}(${:.2}) target={}(${:.2}) mul={:.2}",
            p.source.label(),
            p.source_cents,
            p.source_cents as f64 / 100.0,
            p.bonus_cents,
            p.bonus_cents as f64 / 100.0,
            target,
            target as f64 / 100.0,
            config.multiplier
        );
        notify.post(Notice::PayoutApplied {
            bonus_cents: p.bonus_cents,
        });
        self.last_paid_serial = settlement_serial;
        self.next_allowed_ms = now_ms + config.cooldown_ms;
        Some(p.bonus_cents)
    }
}
