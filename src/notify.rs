//! User-facing notifications. Fire and forget; nothing reads them back.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    EnteredTable,
    LeftTable,
    PotLocked { index: i32 },
    PlayerLocked { index: i32 },
    PayoutApplied { bonus_cents: i64 },
    OcrUnavailable,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::EnteredTable => write!(f, "Poker table joined"),
            Notice::LeftTable => write!(f, "Poker table left"),
            Notice::PotLocked { index } => write!(f, "Pot source locked [{}]", index),
            Notice::PlayerLocked { index } => write!(f, "Player stack locked [{}]", index),
            Notice::PayoutApplied { bonus_cents } => {
                write!(f, "Poker bonus +${:.2}", *bonus_cents as f64 / 100.0)
            }
            Notice::OcrUnavailable => write!(f, "OCR unavailable - check TesseractPath"),
        }
    }
}

pub trait NotificationSink {
    fn post(&mut self, notice: Notice);
}

/// Writes every notice to the log.
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn post(&mut self, notice: Notice) {
        log::info!("[NOTICE] {}", notice);
    }
}

/// Collects notices, mostly for tests and replay reports.
impl NotificationSink for Vec<Notice> {
    fn post(&mut self, notice: Notice) {
        self.push(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_text() {
        assert_eq!(Notice::EnteredTable.to_string(), "Poker table joined");
        assert_eq!(Notice::PotLocked { index: 77 }.to_string(), "Pot source locked [77]");
        assert_eq!(
            Notice::PayoutApplied { bonus_cents: 1250 }.to_string(),
            "Poker bonus +$12.50"
        );
    }
}
