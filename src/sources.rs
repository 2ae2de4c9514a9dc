//! Per-source state owned by the registry and updated by the dispatcher.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use globewatch_types::{Level, SourceKey, ValueType};
use parking_lot::RwLock;

use crate::colors::ColorRole;

/// Latest known state of one source.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub key: SourceKey,
    /// Kept across deregistration and channel loss.
    pub last_value: Option<ValueType>,
    pub last_update: DateTime<Utc>,
    pub level: Level,
    pub role: ColorRole,
    pub message: String,
}

/// What changed when a source was updated.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub created: bool,
    pub previous_level: Level,
    pub previous_role: ColorRole,
    pub previous_message: String,
}

impl Transition {
    pub fn changed(&self, source: &Source) -> bool {
        self.created
            || self.previous_level != source.level
            || self.previous_role != source.role
            || self.previous_message != source.message
    }
}

/// All sources, keyed and ordered by [`SourceKey`].
#[derive(Debug, Default)]
pub struct SourceTable {
    sources: RwLock<BTreeMap<SourceKey, Source>>,
}

impl SourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or update a source. `value: None` keeps the last value.
    pub fn apply(
        &self,
        key: &SourceKey,
        value: Option<ValueType>,
        level: Level,
        role: ColorRole,
        message: String,
        at: DateTime<Utc>,
    ) -> (Source, Transition) {
        let mut sources = self.sources.write();
        let created = !sources.contains_key(key);
        let source = sources.entry(key.clone()).or_insert_with(|| Source {
            key: key.clone(),
            last_value: None,
            last_update: at,
            level: Level::None,
            role: ColorRole::default(),
            message: String::new(),
        });

        let transition = Transition {
            created,
            previous_level: source.level,
            previous_role: source.role,
            previous_message: std::mem::replace(&mut source.message, message),
        };
        if value.is_some() {
            source.last_value = value;
        }
        source.last_update = at;
        source.level = level;
        source.role = role;

        (source.clone(), transition)
    }

    pub fn get(&self, key: &SourceKey) -> Option<Source> {
        self.sources.read().get(key).cloned()
    }

    /// `Level::None` for unknown keys.
    pub fn current_level(&self, key: &SourceKey) -> Level {
        self.sources.read().get(key).map_or(Level::None, |s| s.level)
    }

    pub fn in_channel(&self, channel: &str) -> Vec<Source> {
        self.sources
            .read()
            .values()
            .filter(|s| s.key.in_channel(channel))
            .cloned()
            .collect()
    }

    pub fn keys_in_channel(&self, channel: &str) -> Vec<SourceKey> {
        self.sources
            .read()
            .keys()
            .filter(|k| k.in_channel(channel))
            .cloned()
            .collect()
    }

    pub fn count_in_channel(&self, channel: &str) -> usize {
        self.sources
            .read()
            .keys()
            .filter(|k| k.in_channel(channel))
            .count()
    }

    /// Remove every source of a channel; returns how many were removed.
    pub fn remove_channel(&self, channel: &str) -> usize {
        let mut sources = self.sources.write();
        let before = sources.len();
        sources.retain(|key, _| !key.in_channel(channel));
        before - sources.len()
    }

    pub fn len(&self) -> usize {
        self.sources.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(channel: &str, source: &str) -> SourceKey {
        SourceKey::new(channel, "temperature", source)
    }

    #[test]
    fn apply_tracks_previous_state() {
        let table = SourceTable::new();
        let k = key("north", "a");
        let now = Utc::now();

        let (source, t) = table.apply(
            &k,
            Some(ValueType::Int(1)),
            Level::Warning,
            ColorRole::Level(Level::Warning),
            "warm".to_string(),
            now,
        );
        assert!(t.created);
        assert_eq!(t.previous_level, Level::None);
        assert!(t.changed(&source));

        let (source, t) = table.apply(
            &k,
            None,
            Level::None,
            ColorRole::Disconnected,
            String::new(),
            now,
        );
        assert!(!t.created);
        assert_eq!(t.previous_level, Level::Warning);
        assert_eq!(t.previous_message, "warm");
        assert_eq!(source.last_value, Some(ValueType::Int(1)));
        assert_eq!(table.current_level(&k), Level::None);
    }

    #[test]
    fn identical_update_is_not_a_change() {
        let table = SourceTable::new();
        let k = key("north", "a");
        let role = ColorRole::Level(Level::Info);
        table.apply(&k, Some(ValueType::Int(1)), Level::Info, role, "x".into(), Utc::now());
        let (source, t) =
            table.apply(&k, Some(ValueType::Int(2)), Level::Info, role, "x".into(), Utc::now());
        assert!(!t.changed(&source));
    }

    #[test]
    fn channel_queries_and_removal() {
        let table = SourceTable::new();
        let role = ColorRole::default();
        for (channel, source) in [("north", "a"), ("north", "b"), ("south", "a")] {
            table.apply(&key(channel, source), None, Level::None, role, String::new(), Utc::now());
        }

        assert_eq!(table.count_in_channel("north"), 2);
        assert_eq!(table.keys_in_channel("south"), vec![key("south", "a")]);
        assert_eq!(table.remove_channel("north"), 2);
        assert_eq!(table.len(), 1);
        assert_eq!(table.current_level(&key("north", "a")), Level::None);
    }
}
