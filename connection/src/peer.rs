//! Bitcoin peer address structures and utilities.

use bitcoin::p2p::address::AddrV2;
use bitcoin::p2p::ServiceFlags;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::{SystemTime, UNIX_EPOCH};

/// Represents the service state of a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerServices {
    /// Known services with specific ServiceFlags.
    Known(ServiceFlags),
    /// Unknown services state.
    Unknown,
}

/// Represents the protocol version of a peer.
///
/// * **70001** - BIP 0031, absolute minimum for modern nodes.
/// * **70012** - BIP 0065, added CheckLockTimeVerify.
/// * **70013** - BIP 0130/BIP 0133, added sendheaders and feefilter.
/// * **70014** - BIP 0152, added compact blocks.
/// * **70015** - BIP 0141/BIP 0143/BIP 0147, SegWit support.
/// * **70016** - BIP 0155/BIP 0339, addrv2 and wtxid relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerProtocolVersion {
    /// Known protocol version.
    Known(u32),
    /// Unknown protocol version.
    Unknown,
}

impl PeerProtocolVersion {
    pub fn is_known(&self) -> bool {
        matches!(self, PeerProtocolVersion::Known(_))
    }
}

impl fmt::Display for PeerProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerProtocolVersion::Known(v) => write!(f, "{v}"),
            PeerProtocolVersion::Unknown => write!(f, "unknown"),
        }
    }
}

/// A peer address on the bitcoin network.
///
/// Two addresses with the same `host` describe the same peer as far as
/// discovery is concerned, whatever their port or metadata. Use
/// [`PeerAddress::host`] as the deduplication key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddress {
    /// The peer's network address.
    pub host: AddrV2,
    /// The port number the peer is listening on.
    pub port: u16,
    /// The service flags advertised by the peer.
    pub services: PeerServices,
    /// The protocol version of the peer.
    pub version: PeerProtocolVersion,
    /// Unix timestamp (seconds) when this record was first created locally.
    pub first_seen: u64,
}

impl PeerAddress {
    /// Create a new peer address with unknown services and version.
    pub fn new(host: AddrV2, port: u16) -> Self {
        PeerAddress {
            host,
            port,
            services: PeerServices::Unknown,
            version: PeerProtocolVersion::Unknown,
            first_seen: unix_timestamp(),
        }
    }

    /// Create a new peer address with known services.
    pub fn with_services(host: AddrV2, port: u16, services: ServiceFlags) -> Self {
        PeerAddress {
            services: PeerServices::Known(services),
            ..PeerAddress::new(host, port)
        }
    }

    /// Create a peer address from a socket address.
    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        let host = match addr.ip() {
            IpAddr::V4(ipv4) => AddrV2::Ipv4(ipv4),
            IpAddr::V6(ipv6) => match ipv6.to_ipv4_mapped() {
                Some(ipv4) => AddrV2::Ipv4(ipv4),
                None => AddrV2::Ipv6(ipv6),
            },
        };
        PeerAddress::new(host, addr.port())
    }

    /// Replace a zero port with the network's default port.
    ///
    /// Peers occasionally gossip addresses without a port, those are assumed
    /// to listen on the default.
    pub fn normalize_port(mut self, default_port: u16) -> Self {
        if self.port == 0 {
            self.port = default_port;
        }
        self
    }

    /// Checks if the peer advertises the specified service.
    pub fn has_service(&self, service: ServiceFlags) -> bool {
        match self.services {
            PeerServices::Known(flags) => flags.has(service),
            PeerServices::Unknown => false,
        }
    }

    /// Returns a new PeerAddress with known services.
    pub fn with_known_services(&self, services: ServiceFlags) -> Self {
        PeerAddress {
            services: PeerServices::Known(services),
            ..self.clone()
        }
    }

    /// Returns a new PeerAddress with known version.
    pub fn with_known_version(&self, version: u32) -> Self {
        PeerAddress {
            version: PeerProtocolVersion::Known(version),
            ..self.clone()
        }
    }

    /// The socket address for this peer, if the host is reachable over plain IP.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        match &self.host {
            AddrV2::Ipv4(ipv4) => Some(SocketAddr::new(IpAddr::V4(*ipv4), self.port)),
            AddrV2::Ipv6(ipv6) => Some(SocketAddr::new(IpAddr::V6(*ipv6), self.port)),
            _ => None,
        }
    }

    /// True for hosts on anonymizing overlay networks (Tor, I2P).
    pub fn is_anonymizing(&self) -> bool {
        matches!(
            self.host,
            AddrV2::TorV2(_) | AddrV2::TorV3(_) | AddrV2::I2p(_)
        )
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            AddrV2::Ipv4(ipv4) => write!(f, "{ipv4}:{}", self.port)?,
            AddrV2::Ipv6(ipv6) | AddrV2::Cjdns(ipv6) => write!(f, "[{ipv6}]:{}", self.port)?,
            other => write!(f, "{other:?}:{}", self.port)?,
        }
        write!(
            f,
            " ([peer] services: {}, version: {})",
            match self.services {
                PeerServices::Known(flags) => flags.to_string(),
                PeerServices::Unknown => "unknown".to_string(),
            },
            self.version
        )
    }
}

/// Gets the current Unix timestamp (seconds since January 1, 1970 00:00:00 UTC).
///
/// A clock set before the epoch reads as zero.
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
