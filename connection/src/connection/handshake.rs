//! Version handshake primitives.
//!
//! The handshake itself is driven by whoever owns the connection, these are
//! the pieces it is built from: the outgoing version message, a progress
//! tracker which accepts version and verack in either order, and the
//! metadata worth keeping from the peer's version.

use super::ConnectionConfiguration;
use crate::peer::{unix_timestamp, PeerAddress};
use bitcoin::p2p::address::Address;
use bitcoin::p2p::message_network::VersionMessage;
use bitcoin::p2p::ServiceFlags;
use log::debug;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};

/// Generates a random 64-bit nonce for the version message.
///
/// Peers echo nothing back, but a version arriving with our own nonce means
/// we connected to ourselves.
pub fn generate_nonce() -> u64 {
    rand::random()
}

/// Build the version message announcing us to `peer`.
pub fn version_message(
    configuration: &ConnectionConfiguration,
    peer: &PeerAddress,
    nonce: u64,
) -> VersionMessage {
    let receiver = peer
        .socket_addr()
        .unwrap_or_else(|| SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), peer.port));
    let sender = SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0);

    let mut message = VersionMessage::new(
        configuration.services,
        unix_timestamp() as i64,
        Address::new(&receiver, ServiceFlags::NONE),
        Address::new(&sender, configuration.services),
        nonce,
        configuration.user_agent.to_string(),
        configuration.start_height,
    );
    message.version = configuration.protocol_version;
    message.relay = configuration.relay;
    message
}

/// State machine for tracking handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Sent version message, but haven't received anything yet.
    VersionSent,
    /// Received the peer's version message, but no verack yet.
    VersionReceived,
    /// Received a verack, but no version message yet.
    VerackReceived,
    /// Both version and verack received.
    Complete,
}

impl HandshakeState {
    /// Record the peer's version.
    ///
    /// Returns `None` if the peer already sent one, which is a protocol violation.
    pub fn on_version(self) -> Option<HandshakeState> {
        match self {
            HandshakeState::VersionSent => Some(HandshakeState::VersionReceived),
            HandshakeState::VerackReceived => Some(HandshakeState::Complete),
            HandshakeState::VersionReceived | HandshakeState::Complete => None,
        }
    }

    /// Record the peer's verack. Duplicates are ignored.
    pub fn on_verack(self) -> HandshakeState {
        match self {
            HandshakeState::VersionSent => HandshakeState::VerackReceived,
            HandshakeState::VersionReceived => HandshakeState::Complete,
            state => {
                debug!("Received duplicate verack message in state {state:?}, ignoring");
                state
            }
        }
    }

    /// True once both version and verack have arrived.
    pub fn is_complete(self) -> bool {
        self == HandshakeState::Complete
    }
}

/// What a peer said about itself in its version message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeInfo {
    /// Protocol version.
    pub version: u32,
    /// Advertised services.
    pub services: ServiceFlags,
    /// Advertised user agent.
    pub user_agent: String,
    /// Advertised best block height.
    pub start_height: i32,
}

impl From<&VersionMessage> for HandshakeInfo {
    fn from(message: &VersionMessage) -> Self {
        HandshakeInfo {
            version: message.version,
            services: message.services,
            user_agent: message.user_agent.clone(),
            start_height: message.start_height,
        }
    }
}
