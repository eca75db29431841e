//! Bitcoin p2p protocol connection.
//!
//! A [`Connection`] pairs a framed [`Transport`] with the peer on the other
//! end. It does not perform the version handshake on its own, callers drive
//! it with the primitives in [`handshake`](crate::handshake) so they can
//! observe every step.
//!
//! # Examples
//!
//! ```no_run
//! use bitcoin::Network;
//! use bitcoin::p2p::address::AddrV2;
//! use peermap_connection::wire::Message;
//! use peermap_connection::{handshake, ConnectionConfiguration, PeerAddress, TcpConnection};
//! use std::net::Ipv4Addr;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let peer = PeerAddress::new(AddrV2::Ipv4(Ipv4Addr::new(127, 0, 0, 1)), 8333);
//! let config = ConnectionConfiguration::non_listening(Network::Bitcoin, 70016, None);
//!
//! let mut connection = TcpConnection::tcp(peer.clone(), &config).await?;
//! let nonce = handshake::generate_nonce();
//! connection
//!     .send(Message::Version(handshake::version_message(&config, &peer, nonce)))
//!     .await?;
//!
//! let response = connection.receive().await?;
//! println!("Received: {:?}", response);
//! # Ok(())
//! # }
//! ```

mod configuration;
mod error;
pub mod handshake;
mod tcp;

pub use configuration::{
    default_port, default_user_agent, ConnectionConfiguration, DEFAULT_CONNECTION_TIMEOUT,
    DEFAULT_PROTOCOL_VERSION,
};
pub use error::ConnectionError;
pub use tcp::TcpConnection;

use crate::peer::PeerAddress;
use crate::transport::Transport;
use crate::wire::Message;
use log::debug;
use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite};

/// A framed connection to a single peer.
///
/// Note that `Connection` does *not* implement `Clone` as it owns I/O resources
/// that cannot be duplicated.
#[derive(Debug)]
pub struct Connection<R, W> {
    peer: PeerAddress,
    transport: Transport<R, W>,
}

impl<R, W> Connection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Wrap an already established transport.
    pub fn new(peer: PeerAddress, transport: Transport<R, W>) -> Self {
        Connection { peer, transport }
    }

    /// The peer this connection is established with.
    pub fn peer(&self) -> &PeerAddress {
        &self.peer
    }

    /// Send a message to the peer.
    pub async fn send(&mut self, message: Message) -> Result<(), ConnectionError> {
        debug!("Sending {} to {}", message.command(), self.peer);
        self.transport.write(&message).await?;
        Ok(())
    }

    /// Receive the next message from the peer.
    ///
    /// A clean close by the peer surfaces as an error for which
    /// [`ConnectionError::is_closed`] is true.
    ///
    /// # Cancellation Safety
    ///
    /// This method is cancellation safe, an interrupted receive resumes on the
    /// next call.
    pub async fn receive(&mut self) -> Result<Message, ConnectionError> {
        let message = self.transport.read().await?;
        debug!("Received {} from {}", message.command(), self.peer);
        Ok(message)
    }

    /// Close the write side of the connection.
    pub async fn shutdown(&mut self) -> Result<(), ConnectionError> {
        self.transport.shutdown().await?;
        Ok(())
    }
}

impl TcpConnection {
    /// Establish a TCP connection to a bitcoin peer.
    ///
    /// # Arguments
    ///
    /// * `peer` - The bitcoin peer to connect to.
    /// * `configuration` - Configuration for the connection.
    ///
    /// # Returns
    ///
    /// * `Ok(`[`Self`]`)` - An open connection, not yet handshaked.
    /// * `Err(`[`ConnectionError`]`)` - If the connection attempt failed.
    pub async fn tcp(
        peer: PeerAddress,
        configuration: &ConnectionConfiguration,
    ) -> Result<Self, ConnectionError> {
        tcp::connect(peer, configuration).await
    }
}

impl<R, W> fmt::Display for Connection<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Connection to {}", self.peer)
    }
}
