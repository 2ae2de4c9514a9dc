use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{LogEntry, LogKind, LogQuery, LogStore};
use crate::error::LogStoreError;

/// In-process log store.
#[derive(Debug, Default)]
pub struct MemoryLogStore {
    events: Mutex<Vec<LogEntry>>,
    sources: Mutex<Vec<LogEntry>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self, kind: LogKind) -> &Mutex<Vec<LogEntry>> {
        match kind {
            LogKind::Events => &self.events,
            LogKind::Sources => &self.sources,
        }
    }
}

impl LogStore for MemoryLogStore {
    fn append(&self, kind: LogKind, entry: &LogEntry) -> Result<(), LogStoreError> {
        self.log(kind).lock().push(entry.clone());
        Ok(())
    }

    fn query(&self, kind: LogKind, query: &LogQuery) -> Result<Vec<LogEntry>, LogStoreError> {
        Ok(self
            .log(kind)
            .lock()
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect())
    }

    fn prune(&self, kind: LogKind, before: DateTime<Utc>) -> Result<usize, LogStoreError> {
        let mut log = self.log(kind).lock();
        let len = log.len();
        log.retain(|e| e.timestamp >= before);
        Ok(len - log.len())
    }

    fn clear(&self, kind: LogKind) -> Result<(), LogStoreError> {
        self.log(kind).lock().clear();
        Ok(())
    }
}
