//! In-process transport.
//!
//! An endpoint must be registered with [`MemoryTransport::listen`] before a
//! channel can connect to its `address:port`; otherwise the connection is
//! refused. Each connect replaces the endpoint's current stream.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{SourceUpdate, Transport, UpdateStream, STREAM_BUFFER};
use crate::channel::ChannelSpec;
use crate::error::TransportError;

type Sender = mpsc::Sender<Result<SourceUpdate, TransportError>>;

#[derive(Debug, Default)]
struct Slot {
    sender: Option<Sender>,
}

/// Transport whose peers live in the same process.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    endpoints: Arc<Mutex<HashMap<String, Slot>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept connections on `address:port` and return the producer side.
    pub fn listen(&self, address: &str, port: u16) -> MemoryEndpoint {
        let endpoint = format!("{}:{}", address, port);
        self.endpoints.lock().entry(endpoint.clone()).or_default();
        MemoryEndpoint {
            endpoint,
            endpoints: self.endpoints.clone(),
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, spec: &ChannelSpec) -> Result<UpdateStream, TransportError> {
        let endpoint = spec.endpoint();
        let mut endpoints = self.endpoints.lock();
        let slot = endpoints
            .get_mut(&endpoint)
            .ok_or(TransportError::Refused(endpoint))?;

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        slot.sender = Some(tx);
        Ok(rx)
    }
}

/// Producer side of a memory endpoint.
#[derive(Debug, Clone)]
pub struct MemoryEndpoint {
    endpoint: String,
    endpoints: Arc<Mutex<HashMap<String, Slot>>>,
}

impl MemoryEndpoint {
    fn sender(&self) -> Option<Sender> {
        self.endpoints
            .lock()
            .get(&self.endpoint)
            .and_then(|slot| slot.sender.clone())
    }

    /// True while a channel is attached.
    pub fn is_connected(&self) -> bool {
        self.sender().is_some_and(|tx| !tx.is_closed())
    }

    /// Deliver an update to the attached channel.
    pub async fn send(&self, update: SourceUpdate) -> Result<(), TransportError> {
        self.deliver(Ok(update)).await
    }

    /// Deliver a non-fatal stream error.
    pub async fn send_error(&self, error: TransportError) -> Result<(), TransportError> {
        self.deliver(Err(error)).await
    }

    async fn deliver(
        &self,
        item: Result<SourceUpdate, TransportError>,
    ) -> Result<(), TransportError> {
        let tx = self
            .sender()
            .ok_or_else(|| TransportError::Closed(self.endpoint.clone()))?;
        tx.send(item)
            .await
            .map_err(|_| TransportError::Closed(self.endpoint.clone()))
    }

    /// Hang up: the attached channel sees its stream end.
    pub fn close(&self) {
        if let Some(slot) = self.endpoints.lock().get_mut(&self.endpoint) {
            slot.sender = None;
        }
    }
}
