//! Peer connection abstractions.
//!
//! Sessions only talk to peers through the [`PeerConnection`] and [`Connector`]
//! traits, so the whole crawl can run against scripted peers in tests.

use peermap_connection::wire::Message;
use peermap_connection::{ConnectionConfiguration, ConnectionError, PeerAddress, TcpConnection};
use std::future::Future;

/// A bitcoin peer connection that can send and receive messages.
pub trait PeerConnection: Send {
    fn send(
        &mut self,
        message: Message,
    ) -> impl Future<Output = Result<(), ConnectionError>> + Send;

    /// Receive the next message. Must be cancellation safe.
    fn receive(&mut self) -> impl Future<Output = Result<Message, ConnectionError>> + Send;

    /// Best effort close, errors are ignored.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

impl PeerConnection for TcpConnection {
    fn send(
        &mut self,
        message: Message,
    ) -> impl Future<Output = Result<(), ConnectionError>> + Send {
        TcpConnection::send(self, message)
    }

    fn receive(&mut self) -> impl Future<Output = Result<Message, ConnectionError>> + Send {
        TcpConnection::receive(self)
    }

    fn close(&mut self) -> impl Future<Output = ()> + Send {
        async move {
            let _ = self.shutdown().await;
        }
    }
}

/// Factory trait for creating peer connections.
///
/// This trait enables dependency injection for connection creation,
/// allowing different implementations for production and testing.
pub trait Connector: Clone + Send + Sync + 'static {
    type Connection: PeerConnection + 'static;

    /// Open a connection to `peer`. No messages are exchanged yet.
    fn connect(
        &self,
        peer: &PeerAddress,
    ) -> impl Future<Output = Result<Self::Connection, ConnectionError>> + Send;
}

/// Standard connector that opens real TCP connections.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    config: ConnectionConfiguration,
}

impl TcpConnector {
    /// Create a new connector with the given configuration.
    pub fn new(config: ConnectionConfiguration) -> Self {
        Self { config }
    }
}

impl Connector for TcpConnector {
    type Connection = TcpConnection;

    fn connect(
        &self,
        peer: &PeerAddress,
    ) -> impl Future<Output = Result<Self::Connection, ConnectionError>> + Send {
        let peer = peer.clone();
        let config = self.config.clone();
        async move { TcpConnection::tcp(peer, &config).await }
    }
}
