//! Temporary suppression of alert sounds per source.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, TimeDelta, Utc};
use globewatch_types::{SchemaVersion, SourceKey};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::check_schema;
use crate::error::{ConfigError, ValidationError};

/// When a disabled sound comes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundDeadline {
    Until(DateTime<Utc>),
    /// Offset from the moment of the call.
    For(TimeDelta),
}

/// A suppressed source and its deadline.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DisabledSound {
    pub key: SourceKey,
    pub until: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DisabledSoundsFile {
    #[serde(default)]
    version: SchemaVersion,
    entries: Vec<DisabledSound>,
}

/// Tracks sources whose alert sounds are disabled until a deadline.
///
/// Deadlines are wall-clock so they survive restarts.
#[derive(Debug, Default)]
pub struct SoundSuppressor {
    entries: Mutex<HashMap<SourceKey, DateTime<Utc>>>,
}

impl SoundSuppressor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable until a deadline. Disabling again replaces the deadline.
    ///
    /// An offset landing past the last representable date is rejected and
    /// leaves any existing entry untouched.
    pub fn disable(
        &self,
        key: SourceKey,
        deadline: SoundDeadline,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, ValidationError> {
        let until = match deadline {
            SoundDeadline::Until(until) => until,
            SoundDeadline::For(offset) => now
                .checked_add_signed(offset)
                .ok_or(ValidationError::DeadlineOutOfRange(offset))?,
        };
        debug!("sounds for {} disabled until {}", key, until);
        self.entries.lock().insert(key, until);
        Ok(until)
    }

    /// Returns true if the key was disabled.
    pub fn enable(&self, key: &SourceKey) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    /// Expired entries are discarded on the way.
    pub fn is_disabled(&self, key: &SourceKey, now: DateTime<Utc>) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(until) if *until > now => true,
            Some(_) => {
                entries.remove(key);
                false
            }
            None => false,
        }
    }

    /// Remove every expired entry and return their keys, sorted.
    pub fn sweep(&self, now: DateTime<Utc>) -> Vec<SourceKey> {
        let mut expired = Vec::new();
        self.entries.lock().retain(|key, until| {
            let keep = *until > now;
            if !keep {
                expired.push(key.clone());
            }
            keep
        });
        expired.sort();
        expired
    }

    /// All entries, sorted by key.
    pub fn entries(&self) -> Vec<DisabledSound> {
        let mut list: Vec<_> = self
            .entries
            .lock()
            .iter()
            .map(|(key, until)| DisabledSound {
                key: key.clone(),
                until: *until,
            })
            .collect();
        list.sort();
        list
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load persisted entries, dropping those already expired. A missing file
    /// is an empty list.
    pub fn load(path: &Path, now: DateTime<Utc>) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let file: DisabledSoundsFile =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        check_schema(path, file.version)?;

        let entries = file
            .entries
            .into_iter()
            .filter(|e| e.until > now)
            .map(|e| (e.key, e.until))
            .collect();
        Ok(Self {
            entries: Mutex::new(entries),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let file = DisabledSoundsFile {
            version: SchemaVersion::current(),
            entries: self.entries(),
        };
        let json = serde_json::to_string_pretty(&file).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use globewatch_types::parse_relative_offset;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn key() -> SourceKey {
        SourceKey::new("plant", "temperature", "boiler")
    }

    #[test]
    fn relative_offset_expires() {
        let suppressor = SoundSuppressor::new();
        let offset = parse_relative_offset("2h").unwrap();
        suppressor.disable(key(), SoundDeadline::For(offset), t0()).unwrap();

        assert!(suppressor.is_disabled(&key(), t0() + TimeDelta::hours(1)));
        assert!(!suppressor.is_disabled(&key(), t0() + TimeDelta::hours(3)));
        // Lazily discarded.
        assert!(suppressor.is_empty());
    }

    #[test]
    fn deadline_is_exclusive() {
        let suppressor = SoundSuppressor::new();
        let until = t0() + TimeDelta::minutes(5);
        suppressor.disable(key(), SoundDeadline::Until(until), t0()).unwrap();
        assert!(!suppressor.is_disabled(&key(), until));
    }

    #[test]
    fn disabling_again_replaces_deadline() {
        let suppressor = SoundSuppressor::new();
        suppressor.disable(key(), SoundDeadline::For(TimeDelta::hours(1)), t0()).unwrap();
        suppressor.disable(key(), SoundDeadline::For(TimeDelta::hours(5)), t0()).unwrap();
        assert_eq!(suppressor.len(), 1);
        assert!(suppressor.is_disabled(&key(), t0() + TimeDelta::hours(4)));
    }

    #[test]
    fn offset_past_the_last_date_is_rejected() {
        let suppressor = SoundSuppressor::new();
        suppressor.disable(key(), SoundDeadline::For(TimeDelta::hours(1)), t0()).unwrap();

        let huge = parse_relative_offset("100000000d").unwrap();
        let err = suppressor
            .disable(key(), SoundDeadline::For(huge), t0())
            .unwrap_err();
        assert_eq!(err, ValidationError::DeadlineOutOfRange(huge));
        assert_eq!(suppressor.entries()[0].until, t0() + TimeDelta::hours(1));
    }

    #[test]
    fn enable_removes_entry() {
        let suppressor = SoundSuppressor::new();
        suppressor.disable(key(), SoundDeadline::For(TimeDelta::hours(1)), t0()).unwrap();
        assert!(suppressor.enable(&key()));
        assert!(!suppressor.enable(&key()));
        assert!(!suppressor.is_disabled(&key(), t0()));
    }

    #[test]
    fn sweep_returns_expired_keys() {
        let suppressor = SoundSuppressor::new();
        let other = SourceKey::new("plant", "pressure", "p1");
        suppressor.disable(key(), SoundDeadline::For(TimeDelta::minutes(1)), t0()).unwrap();
        suppressor.disable(other.clone(), SoundDeadline::For(TimeDelta::hours(1)), t0()).unwrap();

        let expired = suppressor.sweep(t0() + TimeDelta::minutes(2));
        assert_eq!(expired, vec![key()]);
        assert_eq!(suppressor.entries()[0].key, other);
    }

    #[test]
    fn persists_and_drops_expired_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("disabled.json");

        let suppressor = SoundSuppressor::new();
        suppressor.disable(key(), SoundDeadline::For(TimeDelta::hours(2)), t0()).unwrap();
        suppressor
            .disable(
                SourceKey::new("plant", "pressure", "p1"),
                SoundDeadline::For(TimeDelta::minutes(10)),
                t0(),
            )
            .unwrap();
        suppressor.save(&path).unwrap();

        let loaded = SoundSuppressor::load(&path, t0() + TimeDelta::hours(1)).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.is_disabled(&key(), t0() + TimeDelta::hours(1)));
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = SoundSuppressor::load(&dir.path().join("none.json"), t0()).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn other_major_version_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disabled.json");
        fs::write(&path, r#"{"version":"2.0","entries":[]}"#).unwrap();
        assert!(matches!(
            SoundSuppressor::load(&path, t0()),
            Err(ConfigError::Version { .. })
        ));

        fs::write(&path, r#"{"version":"1.4","entries":[]}"#).unwrap();
        assert!(SoundSuppressor::load(&path, t0()).unwrap().is_empty());
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "[").unwrap();
        assert!(matches!(
            SoundSuppressor::load(&path, t0()),
            Err(ConfigError::Json { .. })
        ));
    }
}
