//! Bitcoin p2p plumbing for network crawling.
//!
//! * [`wire`] - plaintext (v1) message framing and the messages a crawler speaks.
//! * [`transport`] - cancellation safe framed reads and writes over async streams.
//! * [`Connection`] - a transport bound to a peer, plus TCP establishment.
//! * [`handshake`] - version handshake building blocks.
//! * [`PeerAddress`] - the address model shared with the crawler.

mod connection;
mod peer;
pub mod transport;
pub mod user_agent;
pub mod wire;

pub use connection::handshake;
pub use connection::{
    default_port, default_user_agent, Connection, ConnectionConfiguration, ConnectionError,
    TcpConnection, DEFAULT_CONNECTION_TIMEOUT, DEFAULT_PROTOCOL_VERSION,
};
pub use peer::{unix_timestamp, PeerAddress, PeerProtocolVersion, PeerServices};
pub use transport::{MessageReader, MessageWriter, Transport, TransportError};
pub use user_agent::{UserAgent, UserAgentError};
