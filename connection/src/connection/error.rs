//! Error types for connection handling.

use crate::transport::TransportError;
use std::error::Error;
use std::fmt;
use std::io;

/// Errors that can occur during peer connection establishment and communication.
#[derive(Debug)]
pub enum ConnectionError {
    /// An I/O error occurred during network operations.
    Io(io::Error),
    /// The transport layer (framing and parsing) failed.
    TransportFailed(TransportError),
    /// The peer broke the protocol, for example by repeating its version.
    ProtocolFailed(&'static str),
    /// Remote peer's address type is not supported for connections.
    UnsupportedAddressType,
    /// Detected a connection loop (the peer echoed our own nonce).
    ConnectionLoop,
    /// Connection establishment took longer than the configured timeout.
    Timeout,
}

impl ConnectionError {
    /// True if the peer closed the connection cleanly between messages.
    pub fn is_closed(&self) -> bool {
        matches!(self, ConnectionError::TransportFailed(e) if e.is_closed())
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::Io(err) => write!(f, "Connection error: {err}"),
            ConnectionError::TransportFailed(err) => {
                write!(f, "Transport layer failed in peer connection: {err}")
            }
            ConnectionError::ProtocolFailed(reason) => {
                write!(f, "Protocol violation by peer: {reason}")
            }
            ConnectionError::UnsupportedAddressType => write!(f, "Unsupported address type"),
            ConnectionError::ConnectionLoop => {
                write!(f, "Detected connection to self (matching nonce)")
            }
            ConnectionError::Timeout => write!(f, "Connection attempt timed out"),
        }
    }
}

impl Error for ConnectionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConnectionError::Io(err) => Some(err),
            ConnectionError::TransportFailed(err) => Some(err),
            ConnectionError::ProtocolFailed(_)
            | ConnectionError::UnsupportedAddressType
            | ConnectionError::ConnectionLoop
            | ConnectionError::Timeout => None,
        }
    }
}

impl From<io::Error> for ConnectionError {
    fn from(err: io::Error) -> Self {
        ConnectionError::Io(err)
    }
}

impl From<TransportError> for ConnectionError {
    fn from(err: TransportError) -> Self {
        ConnectionError::TransportFailed(err)
    }
}
