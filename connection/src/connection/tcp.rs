//! TCP-specific connections.

use super::{Connection, ConnectionConfiguration, ConnectionError};
use crate::peer::PeerAddress;
use crate::transport::Transport;
use log::debug;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// A TCP-based connection to a bitcoin peer.
pub type TcpConnection = Connection<OwnedReadHalf, OwnedWriteHalf>;

/// Open a TCP stream to `peer` within the configured timeout.
///
/// Only the socket is established, the version handshake is left to the caller.
///
/// # Errors
///
/// * [`ConnectionError::UnsupportedAddressType`] for hosts not reachable over plain IP.
/// * [`ConnectionError::Timeout`] if the connect does not finish in time.
/// * [`ConnectionError::Io`] if the connect is refused or otherwise fails.
pub async fn connect(
    peer: PeerAddress,
    configuration: &ConnectionConfiguration,
) -> Result<TcpConnection, ConnectionError> {
    let socket_addr = peer
        .socket_addr()
        .ok_or(ConnectionError::UnsupportedAddressType)?;

    let stream = tokio::time::timeout(
        configuration.connection_timeout,
        TcpStream::connect(socket_addr),
    )
    .await
    .map_err(|_| ConnectionError::Timeout)??;
    // No delay is helpful for the small packets of the bitcoin p2p protocol.
    stream.set_nodelay(true)?;
    debug!("Opened TCP stream to {socket_addr}");

    let (reader, writer) = stream.into_split();
    Ok(Connection::new(
        peer,
        Transport::new(configuration.magic(), reader, writer),
    ))
}
