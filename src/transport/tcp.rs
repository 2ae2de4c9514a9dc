//! Newline-delimited JSON over TCP.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::debug;

use super::{SourceUpdate, Transport, UpdateStream, STREAM_BUFFER};
use crate::channel::ChannelSpec;
use crate::error::TransportError;

/// Default time allowed for the TCP handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connects to `address:port` and reads one JSON [`SourceUpdate`] per line.
#[derive(Debug, Clone)]
pub struct TcpJsonTransport {
    connect_timeout: Duration,
}

impl Default for TcpJsonTransport {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl TcpJsonTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Transport for TcpJsonTransport {
    async fn open(&self, spec: &ChannelSpec) -> Result<UpdateStream, TransportError> {
        let endpoint = spec.endpoint();
        debug!("connecting to {}", endpoint);

        let stream = match tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((spec.address.as_str(), spec.port)),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(TransportError::Connect { endpoint, source }),
            Err(_) => return Err(TransportError::ConnectTimeout(endpoint)),
        };

        Ok(spawn_line_reader(stream, endpoint))
    }
}

/// Spawn a task decoding newline-delimited JSON updates from `reader`.
///
/// Malformed lines are passed on as [`TransportError::Decode`] and reading
/// continues. A read error is passed on and ends the stream, as does EOF.
/// The task also stops once the receiver is dropped.
pub fn spawn_line_reader<R>(reader: R, endpoint: impl Into<String>) -> UpdateStream
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    let endpoint = endpoint.into();

    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            let read = tokio::select! {
                read = reader.read_line(&mut line) => read,
                _ = tx.closed() => break,
            };

            let item = match read {
                Ok(0) => {
                    debug!("{} closed the connection", endpoint);
                    break;
                }
                Ok(_) => {
                    let text = line.trim();
                    if text.is_empty() {
                        continue;
                    }
                    serde_json::from_str::<SourceUpdate>(text).map_err(|e| {
                        TransportError::Decode {
                            endpoint: endpoint.clone(),
                            message: e.to_string(),
                        }
                    })
                }
                Err(source) => {
                    let _ = tx
                        .send(Err(TransportError::Read {
                            endpoint: endpoint.clone(),
                            source,
                        }))
                        .await;
                    break;
                }
            };

            if tx.send(item).await.is_err() {
                break;
            }
        }
    });

    rx
}
