//! Address list (`addr`) payloads.
//!
//! The legacy address message is a var-int count followed by fixed 30 byte
//! entries. The 16 byte address field holds every address family the legacy
//! format can express.
//!
//! * IPv4 as an IPv4-mapped IPv6 address (`::ffff:a.b.c.d`).
//! * Tor v2 behind the OnionCat prefix (`fd87:d87e:eb43::/48`).
//! * Anything else as a plain IPv6 address.
//!
//! Everything after the timestamp is a [`bitcoin::p2p::Address`]. Its own
//! `socket_addr` also unwraps IPv4-compatible addresses such as `::1`, so
//! hosts are classified here instead.

use super::header::array;
use super::WireError;
use crate::peer::PeerAddress;
use bitcoin::consensus::encode::{self, deserialize, deserialize_partial, VarInt};
use bitcoin::p2p::address::{AddrV2, Address};
use bitcoin::p2p::ServiceFlags;
use std::net::Ipv6Addr;

/// Size of one serialized address entry.
pub const ADDR_ENTRY_SIZE: usize = 30;
/// Most entries a single address message may carry.
pub const MAX_ADDR_ENTRIES: usize = 1000;
/// Size of the largest legal address message, a 3 byte count plus the entries.
pub const MAX_ADDR_PAYLOAD_SIZE: usize = 3 + MAX_ADDR_ENTRIES * ADDR_ENTRY_SIZE;

const TIMESTAMP_SIZE: usize = 4;
const ONIONCAT_PREFIX: [u8; 6] = [0xfd, 0x87, 0xd8, 0x7e, 0xeb, 0x43];

/// One entry of an address list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrEntry {
    /// Last time the advertising peer heard from this address.
    pub timestamp: u32,
    /// Services the address is believed to offer.
    pub services: ServiceFlags,
    /// Network address.
    pub host: AddrV2,
    /// Listening port, zero if unknown.
    pub port: u16,
}

impl AddrEntry {
    /// Convert into a peer address, filling in the default port if the entry has none.
    pub fn to_peer_address(&self, default_port: u16) -> PeerAddress {
        PeerAddress::with_services(self.host.clone(), self.port, self.services)
            .normalize_port(default_port)
    }

    fn decode(bytes: &[u8]) -> Result<AddrEntry, WireError> {
        let (timestamp, address) = bytes.split_at(TIMESTAMP_SIZE);
        let address: Address = deserialize(address).map_err(|source| WireError::Malformed {
            command: "addr",
            source,
        })?;
        Ok(AddrEntry {
            timestamp: u32::from_le_bytes(array(timestamp)),
            services: address.services,
            host: host_from_ip(Ipv6Addr::from(address.address)),
            port: address.port,
        })
    }

    fn encode(&self, out: &mut Vec<u8>) -> Result<(), WireError> {
        let address = Address {
            services: self.services,
            address: host_to_ip(&self.host)?.segments(),
            port: self.port,
        };
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&encode::serialize(&address));
        Ok(())
    }
}

/// Decode an `addr` payload.
///
/// The payload must hold exactly the number of entries it declares.
pub fn decode_addr_payload(payload: &[u8]) -> Result<Vec<AddrEntry>, WireError> {
    let (count, offset) = deserialize_partial::<VarInt>(payload).map_err(|source| {
        match source {
            encode::Error::Io(_) => WireError::Truncated {
                needed: 1,
                available: payload.len(),
            },
            source => WireError::Malformed {
                command: "addr",
                source,
            },
        }
    })?;

    if count.0 > MAX_ADDR_ENTRIES as u64 {
        return Err(WireError::TooManyAddresses(count.0));
    }

    let expected = offset + count.0 as usize * ADDR_ENTRY_SIZE;
    if payload.len() < expected {
        return Err(WireError::Truncated {
            needed: expected,
            available: payload.len(),
        });
    }
    if payload.len() > expected {
        return Err(WireError::LengthMismatch {
            command: "addr",
            expected,
            actual: payload.len(),
        });
    }

    payload[offset..]
        .chunks_exact(ADDR_ENTRY_SIZE)
        .map(AddrEntry::decode)
        .collect()
}

/// Encode an `addr` payload.
pub fn encode_addr_payload(entries: &[AddrEntry]) -> Result<Vec<u8>, WireError> {
    if entries.len() > MAX_ADDR_ENTRIES {
        return Err(WireError::TooManyAddresses(entries.len() as u64));
    }

    let mut out = encode::serialize(&VarInt(entries.len() as u64));
    out.reserve(entries.len() * ADDR_ENTRY_SIZE);
    for entry in entries {
        entry.encode(&mut out)?;
    }
    Ok(out)
}

fn host_from_ip(ip: Ipv6Addr) -> AddrV2 {
    let octets = ip.octets();
    if let Some(ipv4) = ip.to_ipv4_mapped() {
        AddrV2::Ipv4(ipv4)
    } else if octets[..6] == ONIONCAT_PREFIX {
        AddrV2::TorV2(array(&octets[6..]))
    } else {
        AddrV2::Ipv6(ip)
    }
}

fn host_to_ip(host: &AddrV2) -> Result<Ipv6Addr, WireError> {
    match host {
        AddrV2::Ipv4(ipv4) => Ok(ipv4.to_ipv6_mapped()),
        AddrV2::Ipv6(ipv6) | AddrV2::Cjdns(ipv6) => Ok(*ipv6),
        AddrV2::TorV2(onion) => {
            let mut octets = [0u8; 16];
            octets[..6].copy_from_slice(&ONIONCAT_PREFIX);
            octets[6..].copy_from_slice(onion);
            Ok(Ipv6Addr::from(octets))
        }
        _ => Err(WireError::UnencodableAddress),
    }
}
