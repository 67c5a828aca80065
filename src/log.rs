//! Bounded event log.
//!
//! Every phase of the tick engine and every synchronization handler
//! appends a human-readable, tick-stamped line. The log is a ring buffer
//! holding the most recent entries newest-first, so observers always see
//! the latest activity without unbounded growth.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Tick;

/// How many entries the log retains.
pub const LOG_CAPACITY: usize = 60;

/// A single log line with the tick it was recorded at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub tick: Tick,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:03}] {}", self.tick, self.message)
    }
}

/// Newest-first ring buffer of log entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        EventLog {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a line at the given tick, evicting the oldest entry if full.
    pub(crate) fn push(&mut self, tick: Tick, message: impl Into<String>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front(LogEntry {
            tick,
            message: message.into(),
        });
    }

    /// Entries newest-first.
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any retained entry contains the given fragment.
    pub fn contains(&self, fragment: &str) -> bool {
        self.entries.iter().any(|e| e.message.contains(fragment))
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
