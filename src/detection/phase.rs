use serde::Serialize;
use std::fmt;

pub const PHASE_COUNT: usize = 6;

/// One additive score slot per phase, indexed by [`Phase::index`].
pub type PhaseScores = [f32; PHASE_COUNT];

/// Table lifecycle stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Not at a poker table
    #[default]
    Inactive,
    /// Seated, blinds posted
    TableIdle,
    /// Local player must act
    PlayerDecision,
    /// Other seats acting or auto-action pending
    WaitingAction,
    /// Cards being revealed
    ShowdownReveal,
    /// Winner announced, chips moving
    PayoutSettlement,
}

impl Phase {
    pub const ALL: [Phase; PHASE_COUNT] = [
        Phase::Inactive,
        Phase::TableIdle,
        Phase::PlayerDecision,
        Phase::WaitingAction,
        Phase::ShowdownReveal,
        Phase::PayoutSettlement,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Phase> {
        Self::ALL.get(index).copied()
    }

    pub fn is_active(self) -> bool {
        self != Phase::Inactive
    }

    /// Transition table. Staying put and dropping to Inactive are always
    /// allowed; only Inactive, ShowdownReveal and PayoutSettlement restrict
    /// where they can go.
    pub fn can_transition(self, to: Phase) -> bool {
        use Phase::*;
        if self == to || to == Inactive {
            return true;
        }
        match self {
            Inactive => matches!(to, TableIdle | PlayerDecision | WaitingAction),
            ShowdownReveal => matches!(to, PayoutSettlement | TableIdle),
            PayoutSettlement => matches!(to, TableIdle | PlayerDecision | WaitingAction),
            _ => true,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Inactive => "INACTIVE",
            Phase::TableIdle => "TABLE_IDLE",
            Phase::PlayerDecision => "PLAYER_DECISION",
            Phase::WaitingAction => "WAITING_ACTION",
            Phase::ShowdownReveal => "SHOWDOWN_REVEAL",
            Phase::PayoutSettlement => "PAYOUT_SETTLEMENT",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
