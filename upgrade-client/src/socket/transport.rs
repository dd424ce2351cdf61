//! Socket transports
//!
//! Envelopes travel as newline-delimited JSON. [`TcpTransport`] is the
//! production transport; [`MemoryTransport`] pairs two broadcast channels
//! for in-process tests.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, broadcast};

use crate::config::SocketConfig;
use crate::error::{SyncError, SyncResult};
use shared::message::Envelope;

/// Transport abstraction for envelope exchange
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn read_message(&self) -> SyncResult<Envelope>;
    async fn write_message(&self, envelope: &Envelope) -> SyncResult<()>;
    async fn close(&self) -> SyncResult<()>;
}

pub type BoxedTransport = Arc<dyn Transport>;

/// Dials fresh transports; the reconnect loop uses this to redial after
/// an unexpected close.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> SyncResult<BoxedTransport>;
}

/// TCP transport, one JSON envelope per line
#[derive(Debug, Clone)]
pub struct TcpTransport {
    reader: Arc<Mutex<BufReader<OwnedReadHalf>>>,
    writer: Arc<Mutex<OwnedWriteHalf>>,
}

impl TcpTransport {
    pub async fn connect(addr: &str) -> SyncResult<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| SyncError::Connection(e.to_string()))?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: Arc::new(Mutex::new(BufReader::new(reader))),
            writer: Arc::new(Mutex::new(writer)),
        })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn read_message(&self) -> SyncResult<Envelope> {
        let mut reader = self.reader.lock().await;
        let mut line = String::new();
        let read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| SyncError::Connection(e.to_string()))?;
        if read == 0 {
            return Err(SyncError::Connection("Connection closed by peer".into()));
        }
        Ok(serde_json::from_str(line.trim_end())?)
    }

    async fn write_message(&self, envelope: &Envelope) -> SyncResult<()> {
        let mut writer = self.writer.lock().await;
        let mut data = serde_json::to_vec(envelope)?;
        data.push(b'\n');
        writer
            .write_all(&data)
            .await
            .map_err(|e| SyncError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) -> SyncResult<()> {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
        Ok(())
    }
}

/// Production connector over TCP with a connect timeout
pub struct TcpConnector {
    addr: String,
    connect_timeout: std::time::Duration,
}

impl TcpConnector {
    pub fn new(config: &SocketConfig) -> Self {
        Self {
            addr: config.addr.clone(),
            connect_timeout: config.connect_timeout,
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> SyncResult<BoxedTransport> {
        let transport = tokio::time::timeout(self.connect_timeout, TcpTransport::connect(&self.addr))
            .await
            .map_err(|_| SyncError::Connection(format!("Connect to {} timed out", self.addr)))??;
        Ok(Arc::new(transport))
    }
}

/// In-process transport over a pair of broadcast channels
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    /// Envelopes FROM the server side
    rx: Arc<Mutex<broadcast::Receiver<Envelope>>>,
    /// Envelopes TO the server side
    tx: broadcast::Sender<Envelope>,
}

impl MemoryTransport {
    pub fn new(
        server_tx: &broadcast::Sender<Envelope>,
        client_tx: &broadcast::Sender<Envelope>,
    ) -> Self {
        Self {
            rx: Arc::new(Mutex::new(server_tx.subscribe())),
            tx: client_tx.clone(),
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn read_message(&self) -> SyncResult<Envelope> {
        let mut rx = self.rx.lock().await;
        rx.recv()
            .await
            .map_err(|e| SyncError::Connection(format!("Memory channel error: {e}")))
    }

    async fn write_message(&self, envelope: &Envelope) -> SyncResult<()> {
        self.tx
            .send(envelope.clone())
            .map_err(|e| SyncError::Connection(format!("Failed to send: {e}")))?;
        Ok(())
    }

    async fn close(&self) -> SyncResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::message::ClientMessage;

    #[tokio::test]
    async fn test_memory_transport_round_trip() {
        let (server_tx, _) = broadcast::channel(16);
        let (client_tx, mut from_client) = broadcast::channel(16);
        let transport = MemoryTransport::new(&server_tx, &client_tx);

        let envelope = ClientMessage::Ping {}.to_envelope();
        transport.write_message(&envelope).await.unwrap();
        assert_eq!(from_client.recv().await.unwrap().kind, "ping");

        server_tx
            .send(Envelope {
                kind: "pong".to_string(),
                payload: None,
            })
            .unwrap();
        let received = transport.read_message().await.unwrap();
        assert_eq!(received.kind, "pong");
    }

    #[tokio::test]
    async fn test_tcp_transport_line_framing() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            write_half
                .write_all(b"{\"type\":\"pong\"}\n")
                .await
                .unwrap();
            line
        });

        let transport = TcpTransport::connect(&addr.to_string()).await.unwrap();
        let envelope = ClientMessage::Ping {}.to_envelope();
        transport.write_message(&envelope).await.unwrap();

        let received = transport.read_message().await.unwrap();
        assert_eq!(received.kind, "pong");

        let sent_line = server.await.unwrap();
        assert!(sent_line.ends_with('\n'));
        assert!(sent_line.contains("\"ping\""));
    }
}
