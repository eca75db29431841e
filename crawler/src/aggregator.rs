//! Accumulates peer records and builds the crawl result.

use crate::scheduler::{CrawlStats, StopReason};
use crate::session::SessionReport;
use bitcoin::p2p::address::AddrV2;
use bitcoin::Network;
use peermap_connection::handshake::HandshakeInfo;
use peermap_connection::{unix_timestamp, PeerAddress, PeerProtocolVersion, PeerServices};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::net::{Ipv4Addr, Ipv6Addr};

/// Which IPv4 addresses are dialed and make it into the result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AddressPolicy {
    /// Every IPv4 address.
    #[default]
    All,
    /// Only globally routable IPv4 addresses.
    PublicOnly,
}

impl AddressPolicy {
    /// Check if `ip` passes this policy.
    pub fn allows(self, ip: &Ipv4Addr) -> bool {
        match self {
            AddressPolicy::All => true,
            AddressPolicy::PublicOnly => is_public(ip),
        }
    }

    /// Check if a session may be opened to `host`.
    ///
    /// IPv6 hosts are held to the same rule as IPv4 ones even though they
    /// are never reported. Overlay hosts have no plain IP route and pass.
    pub fn may_dial(self, host: &AddrV2) -> bool {
        match (self, host) {
            (AddressPolicy::All, _) => true,
            (AddressPolicy::PublicOnly, AddrV2::Ipv4(ip)) => is_public(ip),
            (AddressPolicy::PublicOnly, AddrV2::Ipv6(ip)) => is_public_v6(ip),
            (AddressPolicy::PublicOnly, _) => true,
        }
    }
}

fn is_public(ip: &Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    let shared = a == 100 && (b & 0xc0) == 64;
    let benchmarking = a == 198 && (b & 0xfe) == 18;
    !(ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_multicast()
        || ip.is_broadcast()
        || ip.is_documentation()
        || ip.is_unspecified()
        || a == 0
        || a >= 240
        || shared
        || benchmarking)
}

fn is_public_v6(ip: &Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_public(&mapped);
    }
    let first = ip.segments()[0];
    let unique_local = (first & 0xfe00) == 0xfc00;
    let link_local = (first & 0xffc0) == 0xfe80;
    let documentation = first == 0x2001 && ip.segments()[1] == 0x0db8;
    !(ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        || unique_local
        || link_local
        || documentation)
}

/// What is known about a node in the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Protocol version, or `"unknown"` if the node never told us.
    pub version: String,
    /// Service flags bitfield.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_height: Option<i32>,
}

/// The output of a crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlResult {
    /// Network crawled.
    pub network: String,
    /// Reported IPv4 nodes keyed by `ip:port`.
    pub nodes: BTreeMap<String, NodeInfo>,
    /// Distinct hosts ever seen, including the ones filtered out of `nodes`.
    pub total_discovered: usize,
    /// Sessions which ran to a terminal state.
    pub total_visited: usize,
    /// Unix seconds.
    pub started_at: u64,
    /// Unix seconds.
    pub finished_at: u64,
    pub stop_reason: StopReason,
    pub stats: CrawlStats,
}

/// Collects peer records in the order the scheduler processes them.
///
/// The first record of a host wins, later gossip about the same host is
/// ignored. A completed handshake is the exception: it fills in the version
/// and the rest of the node's metadata if the record had no version yet.
#[derive(Debug)]
pub struct Aggregator {
    network: Network,
    policy: AddressPolicy,
    records: HashMap<AddrV2, PeerAddress>,
    handshakes: HashMap<AddrV2, HandshakeInfo>,
    started_at: u64,
}

impl Aggregator {
    /// Create an empty aggregator. The crawl's start time is taken now.
    pub fn new(network: Network, policy: AddressPolicy) -> Self {
        Aggregator {
            network,
            policy,
            records: HashMap::new(),
            handshakes: HashMap::new(),
            started_at: unix_timestamp(),
        }
    }

    /// Record addresses, keeping the first record of each host.
    pub fn observe(&mut self, addresses: &[PeerAddress]) {
        for address in addresses {
            self.records
                .entry(address.host.clone())
                .or_insert_with(|| address.clone());
        }
    }

    /// Record what `peer` said about itself during a handshake.
    pub fn observe_handshake(&mut self, peer: &PeerAddress, info: &HandshakeInfo) {
        let record = self
            .records
            .entry(peer.host.clone())
            .or_insert_with(|| peer.clone());
        if record.version.is_known() {
            return;
        }
        *record = record
            .with_known_version(info.version)
            .with_known_services(info.services);
        self.handshakes.insert(peer.host.clone(), info.clone());
    }

    /// Record everything a finished session learned.
    pub fn observe_report(&mut self, report: &SessionReport) {
        if let Some(info) = &report.handshake {
            self.observe_handshake(&report.target, info);
        }
        self.observe(&report.discovered);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.records.len()
    }

    /// Build the result from the records collected so far.
    ///
    /// Only IPv4 hosts allowed by the address policy are reported. Overlay
    /// hosts (Tor, I2P), IPv6 and CJDNS hosts are dropped.
    pub fn build(
        &self,
        total_discovered: usize,
        total_visited: usize,
        stop_reason: StopReason,
        stats: CrawlStats,
    ) -> CrawlResult {
        let nodes = self
            .records
            .values()
            .filter(|record| !record.is_anonymizing())
            .filter_map(|record| match &record.host {
                AddrV2::Ipv4(ip) if self.policy.allows(ip) => {
                    Some((format!("{ip}:{}", record.port), self.node_info(record)))
                }
                _ => None,
            })
            .collect();

        CrawlResult {
            network: self.network.to_string(),
            nodes,
            total_discovered,
            total_visited,
            started_at: self.started_at,
            finished_at: unix_timestamp(),
            stop_reason,
            stats,
        }
    }

    fn node_info(&self, record: &PeerAddress) -> NodeInfo {
        let handshake = self.handshakes.get(&record.host);
        NodeInfo {
            version: match record.version {
                PeerProtocolVersion::Known(version) => version.to_string(),
                PeerProtocolVersion::Unknown => "unknown".to_string(),
            },
            services: match record.services {
                PeerServices::Known(flags) => Some(u64::from(flags)),
                PeerServices::Unknown => None,
            },
            user_agent: handshake.map(|info| info.user_agent.clone()),
            start_height: handshake.map(|info| info.start_height),
        }
    }
}
