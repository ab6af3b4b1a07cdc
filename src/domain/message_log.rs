// Message log - Bounded, most-recent-first record of observed traffic
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const MAX_LOG_ENTRIES: usize = 50;

/// Shown by renderers in place of an empty log
pub const EMPTY_LOG_PLACEHOLDER: &str = "No messages. Connect to the broker to see data.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Telemetry,
    System,
    Error,
    Command,
    Export,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Telemetry => "telemetry",
            EntryKind::System => "system",
            EntryKind::Error => "error",
            EntryKind::Command => "command",
            EntryKind::Export => "export",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: EntryKind,
    pub topic: String,
    pub value: String,
}

impl LogEntry {
    pub fn telemetry(timestamp: DateTime<Utc>, topic: &str, payload: &str) -> Self {
        Self {
            timestamp,
            kind: EntryKind::Telemetry,
            topic: topic.to_string(),
            value: payload.to_string(),
        }
    }

    /// Entries not tied to a topic are filed under their kind's name
    pub fn note(timestamp: DateTime<Utc>, kind: EntryKind, text: impl Into<String>) -> Self {
        Self {
            timestamp,
            kind,
            topic: kind.as_str().to_string(),
            value: text.into(),
        }
    }

    pub fn system(timestamp: DateTime<Utc>, text: impl Into<String>) -> Self {
        Self::note(timestamp, EntryKind::System, text)
    }

    pub fn error(timestamp: DateTime<Utc>, text: impl Into<String>) -> Self {
        Self::note(timestamp, EntryKind::Error, text)
    }
}

#[derive(Debug, Clone)]
pub struct MessageLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    paused: bool,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::with_capacity(MAX_LOG_ENTRIES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
            paused: false,
        }
    }

    /// Prepend an entry, dropping the oldest one past capacity
    pub fn append(&mut self, entry: LogEntry) {
        self.entries.push_front(entry);
        if self.entries.len() > self.capacity {
            self.entries.pop_back();
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Stop recording. Returns the announcement, or None if already paused.
    pub fn pause(&mut self, at: DateTime<Utc>) -> Option<LogEntry> {
        if self.paused {
            return None;
        }
        self.paused = true;
        let entry = LogEntry::system(at, "Message monitor paused");
        self.append(entry.clone());
        Some(entry)
    }

    /// Resume recording. Returns the announcement, or None if not paused.
    pub fn resume(&mut self, at: DateTime<Utc>) -> Option<LogEntry> {
        if !self.paused {
            return None;
        }
        self.paused = false;
        let entry = LogEntry::system(at, "Message monitor resumed");
        self.append(entry.clone());
        Some(entry)
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Newest first
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn placeholder(&self) -> Option<&'static str> {
        self.is_empty().then_some(EMPTY_LOG_PLACEHOLDER)
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new()
    }
}
