//! JSON-lines log files, one per log kind.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::warn;

use super::{LogEntry, LogKind, LogQuery, LogStore};
use crate::error::LogStoreError;

/// Stores `events.jsonl` and `sources.jsonl` in a directory.
///
/// Lines that fail to parse are skipped on read.
#[derive(Debug)]
pub struct JsonLinesLogStore {
    dir: PathBuf,
    // Serialises appends against prune rewrites.
    lock: Mutex<()>,
}

impl JsonLinesLogStore {
    /// Open a store, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, LogStoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self, kind: LogKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    fn read_all(&self, path: &Path) -> Result<Vec<LogEntry>, LogStoreError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LogEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("{}:{}: skipping malformed entry: {}", path.display(), index + 1, e),
            }
        }
        Ok(entries)
    }
}

impl LogStore for JsonLinesLogStore {
    fn append(&self, kind: LogKind, entry: &LogEntry) -> Result<(), LogStoreError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let _guard = self.lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(kind))?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    fn query(&self, kind: LogKind, query: &LogQuery) -> Result<Vec<LogEntry>, LogStoreError> {
        let _guard = self.lock.lock();
        let mut entries = self.read_all(&self.path(kind))?;
        entries.retain(|e| query.matches(e));
        Ok(entries)
    }

    fn prune(&self, kind: LogKind, before: DateTime<Utc>) -> Result<usize, LogStoreError> {
        let _guard = self.lock.lock();
        let path = self.path(kind);
        let entries = self.read_all(&path)?;
        let total = entries.len();
        let kept: Vec<_> = entries.into_iter().filter(|e| e.timestamp >= before).collect();
        if kept.len() == total {
            return Ok(0);
        }

        let tmp = path.with_extension("jsonl.tmp");
        {
            let mut out = io::BufWriter::new(File::create(&tmp)?);
            for entry in &kept {
                serde_json::to_writer(&mut out, entry)?;
                out.write_all(b"\n")?;
            }
            out.flush()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(total - kept.len())
    }

    fn clear(&self, kind: LogKind) -> Result<(), LogStoreError> {
        let _guard = self.lock.lock();
        match fs::remove_file(self.path(kind)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::EventLevel;
    use chrono::TimeDelta;
    use globewatch_types::{Level, SourceKey, ValueType};

    #[test]
    fn append_then_query() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonLinesLogStore::open(dir.path()).unwrap();
        let key = SourceKey::new("north", "pressure", "p1");
        let now = Utc::now();

        store
            .append(
                LogKind::Sources,
                &LogEntry::source(&key, Some(ValueType::Double(1.5)), Level::Info, "ok", now),
            )
            .unwrap();
        store
            .append(
                LogKind::Sources,
                &LogEntry::source(&SourceKey::new("south", "pressure", "p1"), None, Level::None, "", now),
            )
            .unwrap();

        assert!(store.path(LogKind::Sources).exists());
        let north = store
            .query(LogKind::Sources, &LogQuery::new().channel("north"))
            .unwrap();
        assert_eq!(north.len(), 1);
        assert_eq!(north[0].value, Some(ValueType::Double(1.5)));
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonLinesLogStore::open(dir.path()).unwrap();
        store
            .append(LogKind::Events, &LogEntry::event(EventLevel::Info, "n", "a", Utc::now()))
            .unwrap();
        let mut file = OpenOptions::new()
            .append(true)
            .open(store.path(LogKind::Events))
            .unwrap();
        file.write_all(b"garbage\n").unwrap();

        assert_eq!(store.query(LogKind::Events, &LogQuery::new()).unwrap().len(), 1);
    }

    #[test]
    fn prune_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonLinesLogStore::open(dir.path()).unwrap();
        let now = Utc::now();
        for days in [40, 20, 1] {
            store
                .append(
                    LogKind::Events,
                    &LogEntry::event(EventLevel::Info, "n", format!("{}d", days), now - TimeDelta::days(days)),
                )
                .unwrap();
        }

        assert_eq!(store.prune(LogKind::Events, now - TimeDelta::days(30)).unwrap(), 1);
        assert_eq!(store.prune(LogKind::Events, now - TimeDelta::days(30)).unwrap(), 0);

        let left: Vec<_> = store
            .query(LogKind::Events, &LogQuery::new())
            .unwrap()
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(left, vec!["20d", "1d"]);
    }

    #[test]
    fn clear_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonLinesLogStore::open(dir.path().join("logs")).unwrap();
        assert!(store.query(LogKind::Events, &LogQuery::new()).unwrap().is_empty());
        store.clear(LogKind::Events).unwrap();

        store
            .append(LogKind::Events, &LogEntry::event(EventLevel::Error, "n", "x", Utc::now()))
            .unwrap();
        store.clear(LogKind::Events).unwrap();
        assert!(!store.path(LogKind::Events).exists());
    }
}
