//! Transports: how a channel type tag turns into a stream of updates.
//!
//! A [`Transport`] opens a connection for a [`ChannelSpec`] and returns an
//! [`UpdateStream`], the receiving end of an mpsc channel fed by a
//! background task. The stream ends when the peer goes away.
//!
//! Built-in transports:
//!
//! - `tcp-json`: newline-delimited JSON [`SourceUpdate`]s over TCP
//!   ([`TcpJsonTransport`])
//! - `memory`: in-process endpoints for tests and embedding
//!   ([`MemoryTransport`])

mod memory;
mod tcp;

pub use memory::{MemoryEndpoint, MemoryTransport};
pub use tcp::{spawn_line_reader, TcpJsonTransport};

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use globewatch_types::ValueType;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::channel::ChannelSpec;
use crate::error::{TransportError, ValidationError};

/// Buffered updates per connection.
pub const STREAM_BUFFER: usize = 64;

/// A decoded update for one source of a channel.
///
/// On the wire (`tcp-json`):
///
/// ```json
/// {"kind":"value","type_name":"temperature","source":"boiler","value":{"type":"double","value":95.0}}
/// {"kind":"deregistered","type_name":"temperature","source":"boiler"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceUpdate {
    Value {
        type_name: String,
        source: String,
        value: ValueType,
    },
    /// The source stopped publishing; it keeps its last value.
    Deregistered { type_name: String, source: String },
}

impl SourceUpdate {
    pub fn value(
        type_name: impl Into<String>,
        source: impl Into<String>,
        value: impl Into<ValueType>,
    ) -> Self {
        SourceUpdate::Value {
            type_name: type_name.into(),
            source: source.into(),
            value: value.into(),
        }
    }

    pub fn deregistered(type_name: impl Into<String>, source: impl Into<String>) -> Self {
        SourceUpdate::Deregistered {
            type_name: type_name.into(),
            source: source.into(),
        }
    }
}

/// Updates, or non-fatal decode errors, from one connection.
pub type UpdateStream = mpsc::Receiver<Result<SourceUpdate, TransportError>>;

/// Opens connections for one channel type.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    async fn open(&self, spec: &ChannelSpec) -> Result<UpdateStream, TransportError>;
}

/// Transports keyed by channel type tag.
#[derive(Debug, Clone, Default)]
pub struct TransportRegistry {
    transports: HashMap<String, Arc<dyn Transport>>,
}

impl TransportRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `tcp-json` and the given `memory` transport.
    pub fn with_builtins(memory: MemoryTransport) -> Self {
        let mut registry = Self::new();
        registry.register("tcp-json", Arc::new(TcpJsonTransport::default()));
        registry.register("memory", Arc::new(memory));
        registry
    }

    /// Add or replace the transport for a tag.
    pub fn register(&mut self, tag: impl Into<String>, transport: Arc<dyn Transport>) {
        self.transports.insert(tag.into(), transport);
    }

    pub fn get(&self, tag: &str) -> Result<Arc<dyn Transport>, ValidationError> {
        self.transports
            .get(tag)
            .cloned()
            .ok_or_else(|| ValidationError::UnknownChannelType(tag.to_string()))
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.transports.contains_key(tag)
    }

    /// Registered tags, sorted.
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<_> = self.transports.keys().cloned().collect();
        tags.sort();
        tags
    }
}
