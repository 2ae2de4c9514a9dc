//! Event log and sources log.
//!
//! Two append-only logs share one entry shape:
//!
//! - the **sources log** records every dispatched value with its level
//! - the **event log** records level threshold crossings and channel
//!   lifecycle events, each with an [`EventLevel`]
//!
//! Storage is behind the [`LogStore`] trait; [`MemoryLogStore`] and
//! [`JsonLinesLogStore`] are provided.

mod jsonl;
mod memory;
mod worker;

pub use jsonl::JsonLinesLogStore;
pub use memory::MemoryLogStore;
pub use worker::{spawn_log_worker, spawn_retention_task, LogRecord};

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use globewatch_types::{Level, SourceKey, ValueType};
use serde::{Deserialize, Serialize};

use crate::error::LogStoreError;

/// Which log an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Events,
    Sources,
}

impl LogKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            LogKind::Events => "events.jsonl",
            LogKind::Sources => "sources.jsonl",
        }
    }
}

/// Severity of an event-log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warning,
    Error,
}

impl From<Level> for EventLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::Error | Level::Critical => EventLevel::Error,
            Level::Warning => EventLevel::Warning,
            _ => EventLevel::Info,
        }
    }
}

/// One log line.
///
/// Lifecycle events have an empty type and source and no value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub channel: String,
    #[serde(default)]
    pub type_name: String,
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ValueType>,
    #[serde(default)]
    pub level: Level,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_level: Option<EventLevel>,
    #[serde(default)]
    pub message: String,
}

impl LogEntry {
    /// Sources-log entry for a dispatched value.
    pub fn source(
        key: &SourceKey,
        value: Option<ValueType>,
        level: Level,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp,
            channel: key.channel.clone(),
            type_name: key.type_name.clone(),
            source: key.source.clone(),
            value,
            level,
            event_level: None,
            message: message.into(),
        }
    }

    /// Event-log entry for a source whose level crossed the alert threshold.
    pub fn level_event(
        key: &SourceKey,
        value: Option<ValueType>,
        level: Level,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_level: Some(level.into()),
            ..Self::source(key, value, level, message, timestamp)
        }
    }

    /// Event-log entry about a channel or the application.
    pub fn event(
        event_level: EventLevel,
        channel: impl Into<String>,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp,
            channel: channel.into(),
            type_name: String::new(),
            source: String::new(),
            value: None,
            level: Level::None,
            event_level: Some(event_level),
            message: message.into(),
        }
    }
}

/// Filter for [`LogStore::query`]. Empty fields match everything; the time
/// range is inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub channel: Option<String>,
    pub type_name: Option<String>,
    pub source: Option<String>,
}

impl LogQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    pub fn to(mut self, to: DateTime<Utc>) -> Self {
        self.to = Some(to);
        self
    }

    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn matches(&self, entry: &LogEntry) -> bool {
        let field = |want: &Option<String>, have: &str| want.as_deref().is_none_or(|w| w == have);

        self.from.is_none_or(|from| entry.timestamp >= from)
            && self.to.is_none_or(|to| entry.timestamp <= to)
            && field(&self.channel, &entry.channel)
            && field(&self.type_name, &entry.type_name)
            && field(&self.source, &entry.source)
    }
}

/// Append-only record store for both logs.
pub trait LogStore: Send + Sync + std::fmt::Debug {
    fn append(&self, kind: LogKind, entry: &LogEntry) -> Result<(), LogStoreError>;

    /// Matching entries in append order.
    fn query(&self, kind: LogKind, query: &LogQuery) -> Result<Vec<LogEntry>, LogStoreError>;

    /// Remove entries older than `before`; returns how many were removed.
    fn prune(&self, kind: LogKind, before: DateTime<Utc>) -> Result<usize, LogStoreError>;

    fn clear(&self, kind: LogKind) -> Result<(), LogStoreError>;
}

/// Log settings from the application config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub events_enabled: bool,
    pub sources_enabled: bool,
    /// Entries older than this many days are pruned; 0 keeps everything.
    pub retention_days: u32,
    /// Directory for JSON-lines files; in-memory when unset.
    pub directory: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            events_enabled: true,
            sources_enabled: false,
            retention_days: 30,
            directory: None,
        }
    }
}

impl LogSettings {
    pub fn is_enabled(&self, kind: LogKind) -> bool {
        match kind {
            LogKind::Events => self.events_enabled,
            LogKind::Sources => self.sources_enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn query_filters_each_field() {
        let key = SourceKey::new("north", "pressure", "p1");
        let entry = LogEntry::source(&key, Some(ValueType::Int(3)), Level::Info, "", at(10));

        assert!(LogQuery::new().matches(&entry));
        assert!(LogQuery::new().channel("north").source("p1").matches(&entry));
        assert!(!LogQuery::new().channel("south").matches(&entry));
        assert!(!LogQuery::new().type_name("temperature").matches(&entry));
        assert!(LogQuery::new().from(at(10)).to(at(10)).matches(&entry));
        assert!(!LogQuery::new().from(at(10) + TimeDelta::seconds(1)).matches(&entry));
    }

    #[test]
    fn event_level_follows_severity() {
        assert_eq!(EventLevel::from(Level::Critical), EventLevel::Error);
        assert_eq!(EventLevel::from(Level::Warning), EventLevel::Warning);
        assert_eq!(EventLevel::from(Level::None), EventLevel::Info);

        let key = SourceKey::new("north", "pressure", "p1");
        let entry = LogEntry::level_event(&key, None, Level::Error, "high", at(1));
        assert_eq!(entry.event_level, Some(EventLevel::Error));
        assert_eq!(entry.source, "p1");
    }

    #[test]
    fn lifecycle_entries_serialize_compactly() {
        let entry = LogEntry::event(EventLevel::Warning, "north", "timeout", at(2));
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("\"value\""));
        let back: LogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
