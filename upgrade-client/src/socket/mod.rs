//! Realtime connection layer

mod client;
mod transport;

pub use client::{ConnectionStatus, ListenerId, SocketClient};
pub use transport::{BoxedTransport, Connector, MemoryTransport, TcpConnector, TcpTransport, Transport};
