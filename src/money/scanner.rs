//! Budgeted discovery of money candidates in the external store.
//!
//! Discovery walks `[scan_start, scan_end)` a batch at a time, bounded per
//! step by a read cap and a wall-clock budget. A faster rescan pass re-reads
//! the tracked candidates to pick up value changes.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use super::candidate::MoneyCandidate;
use super::store::{FaultLog, IntStore};
use crate::config::MoneyConfig;
use crate::error::ReadFault;
use crate::ocr::OcrSnapshot;

/// Consecutive faults that mark a dead region.
pub const FAULT_RUN_THRESHOLD: u32 = 16;
/// Indices jumped over once a dead region is detected.
pub const FAULT_RUN_SKIP_SPAN: i32 = 256;
const SKIP_LOG_INTERVAL_MS: u64 = 2000;
/// Rescan faults in a row before a candidate is dropped.
const MAX_FAULT_STRIKES: u32 = 2;

/// What one discovery step did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoverStats {
    pub reads: u32,
    pub added: u32,
    pub faults: u32,
    pub skipped_fault_run: bool,
    pub wrapped: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ScannerStatus {
    pub cursor: i32,
    pub scan_end: i32,
    pub wraps: u32,
    pub tracked: usize,
    pub fault_skips: u32,
}

#[derive(Debug, Default)]
pub struct Scanner {
    candidates: BTreeMap<i32, MoneyCandidate>,
    cursor: i32,
    scan_end: i32,
    wraps: u32,
    pass_started_ms: u64,
    fault_skips: u32,
    next_skip_log_ms: u64,
    rescan_from: i32,
    next_discover_ms: u64,
    next_rescan_ms: u64,
    faults: FaultLog,
}

impl Scanner {
    pub fn new(config: &MoneyConfig, now_ms: u64) -> Self {
        let mut scanner = Self::default();
        scanner.reset(config, now_ms);
        scanner
    }

    /// Drops every candidate and restarts the walk from `scan_start`.
    pub fn reset(&mut self, config: &MoneyConfig, now_ms: u64) {
        *self = Self {
            cursor: config.scan_start,
            scan_end: config.scan_end,
            rescan_from: config.scan_start,
            pass_started_ms: now_ms,
            next_discover_ms: now_ms,
            next_rescan_ms: now_ms,
            next_skip_log_ms: now_ms,
            ..Self::default()
        };
        log::info!(
            "[MONEY] Reset scan. Range=[{}..{}) Batch={} IntervalMs={} ValueRange=[{}..{}]",
            config.scan_start,
            config.scan_end,
            config.scan_batch,
            config.scan_interval_ms,
            config.value_min,
            config.value_max
        );
    }

    pub fn candidates(&self) -> impl Iterator<Item = &MoneyCandidate> {
        self.candidates.values()
    }

    pub fn candidate(&self, index: i32) -> Option<&MoneyCandidate> {
        self.candidates.get(&index)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn cursor(&self) -> i32 {
        self.cursor
    }

    pub fn wraps(&self) -> u32 {
        self.wraps
    }

    pub fn status(&self) -> ScannerStatus {
        ScannerStatus {
            cursor: self.cursor,
            scan_end: self.scan_end,
            wraps: self.wraps,
            tracked: self.candidates.len(),
            fault_skips: self.fault_skips,
        }
    }

    /// Runs whatever passes are due at `now_ms`: discovery every
    /// `scan_interval_ms`, rescan every half of that, pruning after each
    /// rescan.
    pub fn step(
        &mut self,
        store: &mut dyn IntStore,
        snapshot: &OcrSnapshot,
        now_ms: u64,
        config: &MoneyConfig,
    ) {
        if config.scan_enabled && now_ms >= self.next_discover_ms {
            self.next_discover_ms = now_ms + config.scan_interval_ms;
            self.discover(store, snapshot, now_ms, config);
        }
        if now_ms >= self.next_rescan_ms {
            self.next_rescan_ms = now_ms + config.rescan_interval_ms();
            self.rescan(store, snapshot, now_ms, config);
            self.prune(now_ms, config);
        }
    }

    /// Correlates every tracked candidate against a new snapshot.
    pub fn correlate_all(&mut self, snapshot: &OcrSnapshot, tolerance: i64, now_ms: u64) {
        for candidate in self.candidates.values_mut() {
            candidate.correlate(snapshot, tolerance, now_ms);
        }
    }

    /// One bounded discovery step from the cursor.
    pub fn discover(
        &mut self,
        store: &mut dyn IntStore,
        snapshot: &OcrSnapshot,
        now_ms: u64,
        config: &MoneyConfig,
    ) -> DiscoverStats {
        let started = Instant::now();
        let budget = Duration::from_millis(config.scan_max_step_ms);
        let (start, end) = (config.scan_start, config.scan_end);
        let tolerance = config.ocr_match_tolerance_cents;
        let mut stats = DiscoverStats::default();

        if self.cursor < start || self.cursor >= end {
            self.cursor = start;
        }
        self.scan_end = end;
        let batch_end = self
            .cursor
            .saturating_add(config.scan_batch.min(i32::MAX as u32) as i32)
            .min(end);
        let mut consecutive_faults = 0;

        let mut i = self.cursor;
        while i < batch_end {
            if stats.reads >= config.scan_max_reads_per_step {
                break;
            }
            if stats.reads > 0 && started.elapsed() >= budget {
                break;
            }
            if self.candidates.contains_key(&i) {
                i += 1;
                continue;
            }

            stats.reads += 1;
            match store.read(i) {
                Ok(value) => {
                    consecutive_faults = 0;
                    if config.in_value_range(value as i64) {
                        let mut candidate = MoneyCandidate::new(i, value, now_ms);
                        candidate.correlate(snapshot, tolerance, now_ms);
                        self.candidates.insert(i, candidate);
                        stats.added += 1;
                    }
                }
                Err(ReadFault::Missing(_)) => consecutive_faults = 0,
                Err(fault) => {
                    consecutive_faults += 1;
                    stats.faults += 1;
                    self.faults
                        .note(&fault, "scan", now_ms, config.exception_log_cooldown_ms);
                    if config.skip_fault_runs && consecutive_faults >= FAULT_RUN_THRESHOLD {
                        let from = i + 1;
                        let to = i.saturating_add(FAULT_RUN_SKIP_SPAN + 1).min(end);
                        if now_ms >= self.next_skip_log_ms {
                            log::info!(
                                "[MONEY] SkipFaultRuns: {} consecutive faults near idx={}. cursor {} -> {}.",
                                consecutive_faults,
                                i,
                                from,
                                to
                            );
                            self.next_skip_log_ms = now_ms + SKIP_LOG_INTERVAL_MS;
                        }
                        self.fault_skips += 1;
                        stats.skipped_fault_run = true;
                        i = to;
                        break;
                    }
                }
            }
            i += 1;
        }
        self.cursor = i;

        if self.cursor >= end {
            self.cursor = start;
            self.wraps += 1;
            stats.wrapped = true;
            if self.wraps == 1 {
                log::info!(
                    "[MONEY] First full scan wrap complete in {:.1}s. candidates={} wraps={}",
                    now_ms.saturating_sub(self.pass_started_ms) as f64 / 1000.0,
                    self.candidates.len(),
                    self.wraps
                );
            }
            self.pass_started_ms = now_ms;
        }
        stats
    }

    /// Re-reads tracked candidates, at most `scan_max_reads_per_step` of
    /// them, continuing where the previous rescan stopped.
    pub fn rescan(
        &mut self,
        store: &mut dyn IntStore,
        snapshot: &OcrSnapshot,
        now_ms: u64,
        config: &MoneyConfig,
    ) {
        let limit = config.scan_max_reads_per_step as usize;
        let order: Vec<i32> = self
            .candidates
            .range(self.rescan_from..)
            .chain(self.candidates.range(..self.rescan_from))
            .map(|(&idx, _)| idx)
            .take(limit)
            .collect();
        let tolerance = config.ocr_match_tolerance_cents;
        let mut doomed = Vec::new();

        for &idx in &order {
            let Some(candidate) = self.candidates.get_mut(&idx) else {
                continue;
            };
            match store.read(idx) {
                Ok(value) if config.in_value_range(value as i64) => {
                    candidate.observe(value, now_ms, config);
                    candidate.correlate(snapshot, tolerance, now_ms);
                }
                Ok(_) | Err(ReadFault::Missing(_)) => doomed.push(idx),
                Err(fault) => {
                    self.faults
                        .note(&fault, "rescan", now_ms, config.exception_log_cooldown_ms);
                    candidate.fault_strikes += 1;
                    if candidate.fault_strikes >= MAX_FAULT_STRIKES {
                        doomed.push(idx);
                    }
                }
            }
        }
        if let Some(&last) = order.last() {
            self.rescan_from = last.saturating_add(1);
        }
        for idx in doomed {
            self.candidates.remove(&idx);
        }
    }

    /// Drops stale and hyperactive candidates. Returns how many went.
    pub fn prune(&mut self, now_ms: u64, config: &MoneyConfig) -> usize {
        let before = self.candidates.len();
        let max_cps = config.likely_max_changes_per_sec;
        self.candidates.retain(|_, c| {
            let stale = c.changes == 0 && now_ms.saturating_sub(c.first_seen_ms) > config.prune_ms;
            let hyperactive = c.any_matches == 0
                && c.pot_matches == 0
                && c.changes > 4
                && max_cps > 0.0
                && c.changes_per_sec(now_ms) > max_cps * 6.0;
            !(stale || hyperactive)
        });
        before - self.candidates.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::store::MemoryStore;

    fn config(start: i32, end: i32) -> MoneyConfig {
        MoneyConfig {
            scan_start: start,
            scan_end: end,
            scan_batch: 64,
            scan_max_reads_per_step: 64,
            scan_max_step_ms: 1000,
            ..MoneyConfig::default()
        }
    }

    #[test]
    fn test_discover_keeps_in_range_values() {
        let cfg = config(0, 32);
        let mut store = MemoryStore::new();
        store.set(3, 4000);
        store.set(5, 0);
        store.set(9, 900_000);
        store.set(20, 125);
        let mut scanner = Scanner::new(&cfg, 0);

        let stats = scanner.discover(&mut store, &OcrSnapshot::default(), 10, &cfg);
        assert_eq!(stats.reads, 32);
        assert_eq!(stats.added, 2);
        assert!(stats.wrapped);
        assert_eq!(scanner.wraps(), 1);
        assert_eq!(scanner.cursor(), 0);
        assert!(scanner.candidate(3).is_some());
        assert!(scanner.candidate(20).is_some());

        // Tracked indices are not read again
        let stats = scanner.discover(&mut store, &OcrSnapshot::default(), 20, &cfg);
        assert_eq!(stats.reads, 30);
        assert_eq!(scanner.len(), 2);
    }

    #[test]
    fn test_read_cap_bounds_step() {
        let mut cfg = config(0, 1000);
        cfg.scan_batch = 500;
        cfg.scan_max_reads_per_step = 40;
        let mut store = MemoryStore::new();
        let mut scanner = Scanner::new(&cfg, 0);

        let stats = scanner.discover(&mut store, &OcrSnapshot::default(), 0, &cfg);
        assert_eq!(stats.reads, 40);
        assert_eq!(scanner.cursor(), 40);
    }

    #[test]
    fn test_fault_storm_skips_ahead() {
        let cfg = config(0, 10_000);
        let mut store = MemoryStore::new();
        for i in 0..2000 {
            store.set_fault(i, true);
        }
        let mut scanner = Scanner::new(&cfg, 0);

        let stats = scanner.discover(&mut store, &OcrSnapshot::default(), 0, &cfg);
        assert!(stats.skipped_fault_run);
        assert_eq!(stats.reads, FAULT_RUN_THRESHOLD);
        // Fault at 15 triggers the jump to 15 + 256 + 1
        assert_eq!(scanner.cursor(), 15 + FAULT_RUN_SKIP_SPAN + 1);

        let before = scanner.cursor();
        scanner.discover(&mut store, &OcrSnapshot::default(), 10, &cfg);
        assert!(scanner.cursor() > before + 1);
    }

    #[test]
    fn test_missing_resets_fault_run() {
        let cfg = config(0, 64);
        let mut store = MemoryStore::new();
        for i in 0..64 {
            if i % 10 != 0 {
                store.set_fault(i, true);
            }
        }
        let mut scanner = Scanner::new(&cfg, 0);
        let stats = scanner.discover(&mut store, &OcrSnapshot::default(), 0, &cfg);
        assert!(!stats.skipped_fault_run);
        assert_eq!(stats.reads, 64);
    }

    #[test]
    fn test_skip_disabled_walks_every_index() {
        let mut cfg = config(0, 64);
        cfg.skip_fault_runs = false;
        let mut store = MemoryStore::new();
        for i in 0..64 {
            store.set_fault(i, true);
        }
        let mut scanner = Scanner::new(&cfg, 0);
        let stats = scanner.discover(&mut store, &OcrSnapshot::default(), 0, &cfg);
        assert_eq!(stats.reads, 64);
        assert_eq!(stats.faults, 64);
    }

    #[test]
    fn test_rescan_tracks_changes_and_removals() {
        let cfg = config(0, 16);
        let mut store = MemoryStore::new();
        store.set(1, 100);
        store.set(2, 200);
        store.set(3, 300);
        let mut scanner = Scanner::new(&cfg, 0);
        scanner.discover(&mut store, &OcrSnapshot::default(), 0, &cfg);
        assert_eq!(scanner.len(), 3);

        store.set(1, 110);
        store.remove(2);
        store.set(3, 0);
        scanner.rescan(&mut store, &OcrSnapshot::default(), 500, &cfg);

        assert_eq!(scanner.len(), 1);
        let c = scanner.candidate(1).unwrap();
        assert_eq!(c.changes, 1);
        assert_eq!(c.value, 110);
        assert_eq!(c.bet_matches, 1);
    }

    #[test]
    fn test_rescan_fault_needs_two_strikes() {
        let cfg = config(0, 16);
        let mut store = MemoryStore::new();
        store.set(4, 100);
        store.set(5, 100);
        let mut scanner = Scanner::new(&cfg, 0);
        scanner.discover(&mut store, &OcrSnapshot::default(), 0, &cfg);

        store.set_fault(4, true);
        store.set_fault(5, true);
        scanner.rescan(&mut store, &OcrSnapshot::default(), 100, &cfg);
        assert_eq!(scanner.len(), 2);

        // 5 recovers and its strike resets; 4 faults again and goes
        store.set_fault(5, false);
        scanner.rescan(&mut store, &OcrSnapshot::default(), 200, &cfg);
        assert!(scanner.candidate(4).is_none());
        assert!(scanner.candidate(5).is_some());

        store.set_fault(5, true);
        scanner.rescan(&mut store, &OcrSnapshot::default(), 300, &cfg);
        assert!(scanner.candidate(5).is_some());
    }

    #[test]
    fn test_rescan_cap_rotates() {
        let mut cfg = config(0, 16);
        let mut store = MemoryStore::new();
        for i in 0..6 {
            store.set(i, 100);
        }
        let mut scanner = Scanner::new(&cfg, 0);
        scanner.discover(&mut store, &OcrSnapshot::default(), 0, &cfg);
        cfg.scan_max_reads_per_step = 4;

        for i in 0..6 {
            store.set(i, 200);
        }
        scanner.rescan(&mut store, &OcrSnapshot::default(), 100, &cfg);
        let changed = scanner.candidates().filter(|c| c.changes == 1).count();
        assert_eq!(changed, 4);
        scanner.rescan(&mut store, &OcrSnapshot::default(), 200, &cfg);
        assert!(scanner.candidates().all(|c| c.changes == 1));
    }

    #[test]
    fn test_prune_rules() {
        let cfg = config(0, 16);
        let mut store = MemoryStore::new();
        store.set(1, 100);
        store.set(2, 100);
        store.set(3, 100);
        let mut scanner = Scanner::new(&cfg, 0);
        scanner.discover(&mut store, &OcrSnapshot::default(), 1000, &cfg);

        // 2 changes once; 3 flips every 10 ms
        store.set(2, 110);
        let mut t = 1000;
        for v in [120, 130, 140, 150, 160, 170] {
            t += 10;
            store.set(3, v);
            scanner.rescan(&mut store, &OcrSnapshot::default(), t, &cfg);
        }
        assert_eq!(scanner.prune(t, &cfg), 1);
        assert!(scanner.candidate(3).is_none());

        assert_eq!(scanner.prune(1000 + cfg.prune_ms + 1, &cfg), 1);
        assert!(scanner.candidate(1).is_none());
        assert!(scanner.candidate(2).is_some());
    }

    #[test]
    fn test_step_honours_intervals() {
        let mut cfg = config(0, 10_000);
        cfg.scan_batch = 10;
        cfg.scan_max_reads_per_step = 10;
        cfg.scan_interval_ms = 20;
        let mut store = MemoryStore::new();
        let mut scanner = Scanner::new(&cfg, 0);

        scanner.step(&mut store, &OcrSnapshot::default(), 0, &cfg);
        assert_eq!(scanner.cursor(), 10);
        scanner.step(&mut store, &OcrSnapshot::default(), 10, &cfg);
        assert_eq!(scanner.cursor(), 10);
        scanner.step(&mut store, &OcrSnapshot::default(), 20, &cfg);
        assert_eq!(scanner.cursor(), 20);
    }
}
