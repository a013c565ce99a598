//! Candidate ranking.

use serde::Serialize;
use std::cmp::Ordering;

use super::candidate::MoneyCandidate;
use crate::config::MoneyConfig;

/// Which set of candidates a ranking was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RankMode {
    /// Only plausible money candidates
    #[default]
    Plausible,
    /// Nothing passed the filter; every candidate
    All,
}

impl RankMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RankMode::Plausible => "ranked",
            RankMode::All => "all",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Ranked<'a> {
    pub candidate: &'a MoneyCandidate,
    pub score: f32,
    pub plausible: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Ranking<'a> {
    pub entries: Vec<Ranked<'a>>,
    pub mode: RankMode,
}

impl<'a> Ranking<'a> {
    pub fn top(&self) -> Option<&Ranked<'a>> {
        self.entries.first()
    }
}

fn by_rank(a: &Ranked, b: &Ranked) -> Ordering {
    let (ca, cb) = (a.candidate, b.candidate);
    b.score
        .total_cmp(&a.score)
        .then(cb.pot_matches.cmp(&ca.pot_matches))
        .then(cb.player_matches.cmp(&ca.player_matches))
        .then(cb.npc_matches.cmp(&ca.npc_matches))
        .then(cb.any_matches.cmp(&ca.any_matches))
        .then(cb.changes.cmp(&ca.changes))
        .then(ca.index.cmp(&cb.index))
}

/// Scores and sorts candidates, best first.
///
/// Only plausible candidates are ranked; if none is plausible, all of them
/// are.
pub fn rank<'a, I>(candidates: I, now_ms: u64, config: &MoneyConfig) -> Ranking<'a>
where
    I: IntoIterator<Item = &'a MoneyCandidate>,
{
    let all: Vec<Ranked<'a>> = candidates
        .into_iter()
        .map(|candidate| Ranked {
            candidate,
            score: candidate.rank_score(now_ms, config),
            plausible: candidate.is_plausible(now_ms, config),
        })
        .collect();

    let plausible: Vec<Ranked<'a>> = all.iter().copied().filter(|r| r.plausible).collect();
    let (mut entries, mode) = if plausible.is_empty() {
        (all, RankMode::All)
    } else {
        (plausible, RankMode::Plausible)
    };
    entries.sort_by(by_rank);
    Ranking { entries, mode }
}
