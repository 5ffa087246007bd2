//! Bounded log of recent filter decisions.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use super::FilterOutcome;

/// Default number of decisions kept.
pub const DEFAULT_LOG_CAPACITY: usize = 256;

/// Summary of one filter pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterDecision {
    pub at: DateTime<Utc>,
    /// Normalized request path.
    pub path: String,
    pub outcome: FilterOutcome,
    /// Size of the active roster.
    pub active: usize,
    /// Number of plugins handed back to the host.
    pub loaded: usize,
    /// Number of seed identifiers before closure.
    pub seeds: usize,
    pub duration_us: u64,
}

/// Ring buffer of the most recent decisions; the oldest falls off first.
#[derive(Debug)]
pub struct DecisionLog {
    capacity: usize,
    entries: Mutex<VecDeque<FilterDecision>>,
}

impl DecisionLog {
    /// A capacity of zero disables recording.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_LOG_CAPACITY))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn record(&self, decision: FilterDecision) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(decision);
    }

    /// Up to `limit` decisions, newest first.
    pub fn recent(&self, limit: usize) -> Vec<FilterDecision> {
        self.entries.lock().iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for DecisionLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}
