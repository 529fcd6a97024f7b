use chrono::{DateTime, Utc};
use std::collections::VecDeque;

use crate::schedule::Command;

/// One day of 15 minute ticks
pub const HISTORY_CAPACITY: usize = 96;

#[derive(Debug, Clone, PartialEq)]
pub enum TickAction {
    /// No schedule fetched yet
    NoSchedule,
    /// Setpoint written to the spa
    Written,
    /// Spa already at the target
    AlreadyAtTarget,
    /// Manual override window in effect
    ManualOverride,
    /// Device call failed after retries
    Failed(String),
}

impl TickAction {
    pub fn label(&self) -> &str {
        match self {
            TickAction::NoSchedule => "no schedule",
            TickAction::Written => "written",
            TickAction::AlreadyAtTarget => "already at target",
            TickAction::ManualOverride => "manual override",
            TickAction::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    pub hour: u32,
    pub command: Option<Command>,
    pub target: Option<f64>,
    pub observed: Option<f64>,
    pub action: TickAction,
}

/// Most recent control ticks, newest last
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl History {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    /// Newest first
    pub fn recent(&self, limit: usize) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter().rev().take(limit)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
