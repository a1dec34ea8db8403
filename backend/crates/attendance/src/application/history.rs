//! Rolling scan history
//!
//! Bounded, newest-first list of what the operator was shown. Memory only.

use std::collections::VecDeque;

use chrono::{DateTime, FixedOffset};

use crate::application::config::HistoryMode;
use crate::domain::value_objects::ScanOutcome;
use crate::presentation::feedback::ScanFeedback;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub outcome: ScanOutcome,
    pub name: String,
    pub at: DateTime<FixedOffset>,
}

impl HistoryEntry {
    /// `HH:MM`
    pub fn time_label(&self) -> String {
        self.at.format("%H:%M").to_string()
    }
}

#[derive(Debug, Clone)]
pub struct ScanHistory {
    entries: VecDeque<HistoryEntry>,
    limit: usize,
    mode: HistoryMode,
}

impl ScanHistory {
    pub fn new(limit: usize, mode: HistoryMode) -> Self {
        Self {
            entries: VecDeque::with_capacity(limit),
            limit,
            mode,
        }
    }

    /// Record a resolved scan; returns whether it was kept
    pub fn record(&mut self, feedback: &ScanFeedback, at: DateTime<FixedOffset>) -> bool {
        if self.mode == HistoryMode::AttendanceOnly && !feedback.outcome.is_attendance() {
            return false;
        }
        if self.limit == 0 {
            return false;
        }
        self.entries.push_front(HistoryEntry {
            outcome: feedback.outcome,
            name: feedback.name.clone(),
            at,
        });
        self.entries.truncate(self.limit);
        true
    }

    /// Newest first
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
