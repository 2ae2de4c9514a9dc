//! Level dispatcher: turns values into levels, colours, sounds and logs.
//!
//! ```text
//!  DispatchEvent ──▶ PropertiesEngine ──▶ SourceTable ──▶ Notifier (LevelChanged)
//!                     (real values only)      │
//!                                             ├──▶ sound queue (upward alert crossings)
//!                                             └──▶ log queue (sources log, event log)
//! ```
//!
//! `dispatch` never waits on I/O: sounds and log writes go to bounded
//! drop-oldest queues drained by their own workers. Callers serialise
//! dispatch per channel, which keeps per-key ordering.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use globewatch_types::{Level, SourceKey, ValueType};
use tracing::{debug, trace};

use crate::colors::{ColorRole, ColorScheme};
use crate::effects::EffectQueue;
use crate::log::{EventLevel, LogEntry, LogKind, LogRecord, LogSettings};
use crate::notify::{Notification, Notifier};
use crate::properties::PropertiesEngine;
use crate::sounds::{SoundRequest, SoundSuppressor, SoundsConfig};
use crate::sources::{Source, SourceTable};

/// Message attached to sources of a channel that stopped delivering.
pub const CHANNEL_UNAVAILABLE: &str = "channel unavailable";

/// Message attached to a source that deregistered itself.
pub const SOURCE_DEREGISTERED: &str = "source deregistered";

/// Input to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    /// A real value; classified by the properties engine.
    Update {
        key: SourceKey,
        value: ValueType,
        at: DateTime<Utc>,
    },
    /// The source announced it stopped publishing.
    Deregistered { key: SourceKey, at: DateTime<Utc> },
    /// Synthetic: the source's channel timed out or disconnected.
    Unavailable { key: SourceKey, at: DateTime<Utc> },
}

/// Shared handles the dispatcher works with.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub engine: Arc<PropertiesEngine>,
    pub sources: Arc<SourceTable>,
    pub suppressor: Arc<SoundSuppressor>,
    pub sound_queue: Arc<EffectQueue<SoundRequest>>,
    pub log_queue: Arc<EffectQueue<LogRecord>>,
    pub notifier: Notifier,
}

#[derive(Debug)]
pub struct LevelDispatcher {
    ctx: DispatchContext,
    colors: ColorScheme,
    sounds: SoundsConfig,
    log: LogSettings,
}

impl LevelDispatcher {
    pub fn new(
        ctx: DispatchContext,
        colors: ColorScheme,
        sounds: SoundsConfig,
        log: LogSettings,
    ) -> Self {
        Self {
            ctx,
            colors,
            sounds,
            log,
        }
    }

    pub fn sources(&self) -> &Arc<SourceTable> {
        &self.ctx.sources
    }

    pub fn notifier(&self) -> &Notifier {
        &self.ctx.notifier
    }

    /// Process one event and return the source's new state.
    pub fn dispatch(&self, event: DispatchEvent) -> Source {
        let (key, value, level, role, message, at) = match event {
            DispatchEvent::Update { key, value, at } => {
                let verdict = self.ctx.engine.match_value(&key, &value);
                let role = ColorRole::Level(verdict.level);
                (key, Some(value), verdict.level, role, verdict.message, at)
            }
            DispatchEvent::Deregistered { key, at } => (
                key,
                None,
                Level::None,
                ColorRole::Deregistered,
                SOURCE_DEREGISTERED.to_string(),
                at,
            ),
            DispatchEvent::Unavailable { key, at } => (
                key,
                None,
                Level::None,
                ColorRole::Disconnected,
                CHANNEL_UNAVAILABLE.to_string(),
                at,
            ),
        };

        let (source, transition) =
            self.ctx
                .sources
                .apply(&key, value.clone(), level, role, message, at);
        let previous = transition.previous_level;

        if transition.created {
            self.ctx.notifier.send(Notification::SourceAdded { key: key.clone() });
        }
        if transition.changed(&source) {
            trace!("{}: {} -> {} ({:?})", key, previous, level, role);
            self.ctx.notifier.send(Notification::LevelChanged {
                key: key.clone(),
                level,
                previous,
                role,
                color: self.colors.color(role).to_string(),
                message: source.message.clone(),
            });
        }

        if level > previous
            && level.is_alert()
            && self.sounds.is_enabled(level)
            && !self.ctx.suppressor.is_disabled(&key, at)
        {
            debug!("requesting {} sound for {}", level, key);
            self.ctx.sound_queue.push(SoundRequest {
                key: key.clone(),
                level,
                at,
            });
        }

        if self.log.sources_enabled {
            self.ctx.log_queue.push(LogRecord {
                kind: LogKind::Sources,
                entry: LogEntry::source(&key, value.clone(), level, source.message.clone(), at),
            });
        }
        if self.log.events_enabled && level != previous && (level.is_alert() || previous.is_alert())
        {
            self.ctx.log_queue.push(LogRecord {
                kind: LogKind::Events,
                entry: LogEntry::level_event(&key, value, level, source.message.clone(), at),
            });
        }

        source
    }

    /// Write a lifecycle entry to the event log.
    pub fn log_event(&self, level: EventLevel, channel: &str, message: impl Into<String>) {
        if self.log.events_enabled {
            self.ctx.log_queue.push(LogRecord {
                kind: LogKind::Events,
                entry: LogEntry::event(level, channel, message, Utc::now()),
            });
        }
    }
}
