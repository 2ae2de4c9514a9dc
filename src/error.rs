//! Error types for the monitoring pipeline.

use std::path::PathBuf;

use thiserror::Error;

use crate::channel::ChannelState;
use crate::properties::Scope;

pub use globewatch_types::{OffsetParseError, TypeMismatchError, VersionError};

/// A configuration document could not be loaded or saved.
///
/// Loading always falls back to defaults; this error is reported once.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or writing a file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON document was malformed.
    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The document was written by an incompatible version.
    #[error("{path}: {source}")]
    Version {
        path: PathBuf,
        #[source]
        source: VersionError,
    },

    /// The application config could not be assembled.
    #[error("invalid configuration: {0}")]
    Load(#[from] ::config::ConfigError),
}

/// A mutation would break a uniqueness rule. Nothing was changed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConflictError {
    #[error("a channel named {0:?} already exists")]
    ChannelName(String),

    #[error("{endpoint} is already used by channel {existing:?}")]
    ChannelEndpoint { endpoint: String, existing: String },

    /// The caller may edit the existing definition instead.
    #[error("a property with scope {0} already exists")]
    PropertyScope(Scope),
}

/// Connecting to or reading from a channel endpoint failed.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out connecting to {0}")]
    ConnectTimeout(String),

    #[error("{0} refused the connection")]
    Refused(String),

    #[error("read error on {endpoint}: {source}")]
    Read {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed update from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    #[error("connection to {0} closed")]
    Closed(String),
}

/// Input rejected synchronously at the call that introduced it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Offset(#[from] OffsetParseError),

    #[error("invalid scope: {0}")]
    Scope(String),

    #[error("condition {index} is invalid: {reason}")]
    Condition { index: usize, reason: String },

    #[error("unknown channel type {0:?}")]
    UnknownChannelType(String),

    #[error("invalid channel: {0}")]
    Channel(String),

    #[error("sound deadline offset {0} is out of range")]
    DeadlineOutOfRange(chrono::TimeDelta),
}

/// A channel was asked to make a transition its state does not allow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("channel {channel:?} cannot {action} while {state}")]
pub struct ChannelStateError {
    pub channel: String,
    pub state: ChannelState,
    pub action: &'static str,
}

/// The event or sources log store failed.
#[derive(Debug, Error)]
pub enum LogStoreError {
    #[error("log store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("log entry serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The audio backend could not play an alert.
#[derive(Debug, Error)]
#[error("cannot play {level} alert: {reason}")]
pub struct PlaybackError {
    pub level: globewatch_types::Level,
    pub reason: String,
}

/// Any error returned by the public API.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    TypeMismatch(#[from] TypeMismatchError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    ChannelState(#[from] ChannelStateError),

    #[error(transparent)]
    LogStore(#[from] LogStoreError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error("no channel named {0:?}")]
    UnknownChannel(String),

    #[error("no property with scope {0}")]
    UnknownProperty(Scope),
}

impl Error {
    /// Coarse category used in error reports.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::Config,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Transport(_) => ErrorKind::Transport,
            Error::TypeMismatch(_) => ErrorKind::TypeMismatch,
            Error::Validation(_) | Error::UnknownChannel(_) | Error::UnknownProperty(_) => {
                ErrorKind::Validation
            }
            Error::ChannelState(_) => ErrorKind::ChannelState,
            Error::LogStore(_) => ErrorKind::LogStore,
            Error::Playback(_) => ErrorKind::Playback,
        }
    }
}

impl From<OffsetParseError> for Error {
    fn from(err: OffsetParseError) -> Self {
        Error::Validation(err.into())
    }
}

/// Error category carried by [`crate::notify::ErrorReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    Conflict,
    Transport,
    TypeMismatch,
    Validation,
    ChannelState,
    LogStore,
    Playback,
}

/// Result alias used throughout the library.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_messages_name_the_clash() {
        let err = ConflictError::ChannelEndpoint {
            endpoint: "10.0.0.1:9000".to_string(),
            existing: "north".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "10.0.0.1:9000 is already used by channel \"north\""
        );
    }

    #[test]
    fn offset_errors_become_validation_errors() {
        let err: Error = OffsetParseError::Empty.into();
        assert!(matches!(err, Error::Validation(ValidationError::Offset(_))));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn state_error_reads_naturally() {
        let err = ChannelStateError {
            channel: "north".to_string(),
            state: ChannelState::Deregistered,
            action: "accept values",
        };
        assert_eq!(
            err.to_string(),
            "channel \"north\" cannot accept values while deregistered"
        );
    }
}
