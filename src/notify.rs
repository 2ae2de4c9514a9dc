//! Notification bus for external observers (GUI, CLI, tests).
//!
//! Every observable change in the pipeline is published as a
//! [`Notification`] on a `tokio::sync::broadcast` channel. Sending never
//! blocks: a subscriber that falls behind loses the oldest notifications
//! and sees a `Lagged` error on its next receive.

use std::fmt::Display;

use chrono::{DateTime, Utc};
use globewatch_types::{Level, SourceKey};
use tokio::sync::broadcast;
use tracing::warn;

use crate::channel::ChannelState;
use crate::colors::ColorRole;
use crate::error::ErrorKind;
use crate::sounds::PlayedSound;

/// Default number of notifications buffered per subscriber.
pub const DEFAULT_CAPACITY: usize = 256;

/// A non-fatal error surfaced to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub at: DateTime<Utc>,
    pub kind: ErrorKind,
    /// Where it happened, e.g. a channel name or a file path.
    pub context: String,
    pub message: String,
}

/// An observable change.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A source's level, colour role or message changed.
    LevelChanged {
        key: SourceKey,
        level: Level,
        previous: Level,
        role: ColorRole,
        color: String,
        message: String,
    },
    ChannelStateChanged {
        channel: String,
        state: ChannelState,
    },
    SourceAdded {
        key: SourceKey,
    },
    SourcesRemoved {
        channel: String,
        count: usize,
    },
    SoundPlayed(PlayedSound),
    SoundsDisabled {
        key: SourceKey,
        until: DateTime<Utc>,
    },
    SoundsEnabled {
        keys: Vec<SourceKey>,
    },
    Error(ErrorReport),
}

/// Cloneable publishing handle.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Publish a notification. Having no subscribers is not an error.
    pub fn send(&self, notification: Notification) {
        let _ = self.tx.send(notification);
    }

    /// Log an error and publish it as [`Notification::Error`].
    pub fn report(&self, kind: ErrorKind, context: impl Into<String>, error: &dyn Display) {
        let context = context.into();
        let message = error.to_string();
        warn!(?kind, %context, "{}", message);
        self.send(Notification::Error(ErrorReport {
            at: Utc::now(),
            kind,
            context,
            message,
        }));
    }

    /// Report a library [`Error`](crate::Error), keeping its category.
    pub fn report_error(&self, context: impl Into<String>, error: &crate::Error) {
        self.report(error.kind(), context, error);
    }
}
