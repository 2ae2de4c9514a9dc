//! Record of played alert sounds.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use globewatch_types::{Level, SourceKey};
use serde::{Deserialize, Serialize};

/// Default number of played sounds kept.
pub const DEFAULT_HISTORY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayedSound {
    pub at: DateTime<Utc>,
    pub level: Level,
    pub key: SourceKey,
}

/// Bounded ring of played sounds, oldest first.
#[derive(Debug, Clone)]
pub struct PlayedSounds {
    entries: VecDeque<PlayedSound>,
    capacity: usize,
}

impl Default for PlayedSounds {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY)
    }
}

impl PlayedSounds {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, sound: PlayedSound) {
        self.entries.push_back(sound);
        if self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn entries(&self) -> Vec<PlayedSound> {
        self.entries.iter().cloned().collect()
    }

    pub fn last(&self) -> Option<&PlayedSound> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_most_recent() {
        let mut history = PlayedSounds::new(2);
        for source in ["a", "b", "c"] {
            history.record(PlayedSound {
                at: Utc::now(),
                level: Level::Warning,
                key: SourceKey::new("ch", "t", source),
            });
        }
        let sources: Vec<_> = history.entries().into_iter().map(|p| p.key.source).collect();
        assert_eq!(sources, vec!["b", "c"]);
        assert_eq!(history.last().unwrap().key.source, "c");
    }
}
