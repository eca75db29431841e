//! Seed parsing and resolution.
//!
//! Seeds are either literal IP addresses or host names, each with an
//! optional port. Host names go through the system resolver. Only IPv4
//! results are kept since only IPv4 nodes are reported.

use crate::error::SeedError;
use bitcoin::Network;
use log::{debug, warn};
use peermap_connection::PeerAddress;
use std::net::{IpAddr, SocketAddr};

/// Well known DNS seeds for a network.
pub fn dns_seeds(network: Network) -> &'static [&'static str] {
    match network {
        Network::Bitcoin => &[
            "seed.bitcoin.sipa.be",
            "dnsseed.bluematt.me",
            "dnsseed.bitcoin.dashjr.org",
            "seed.bitcoinstats.com",
            "seed.bitcoin.jonasschnelli.ch",
            "seed.btc.petertodd.org",
        ],
        Network::Signet => &["seed.signet.bitcoin.sprovoost.nl"],
        Network::Regtest => &[],
        _ => &[
            "testnet-seed.bitcoin.jonasschnelli.ch",
            "seed.tbtc.petertodd.org",
            "testnet-seed.bluematt.me",
            "testnet-seed.bitcoin.schildbach.de",
        ],
    }
}

/// A seed as given by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seed {
    /// A literal socket address.
    Address(SocketAddr),
    /// A name to resolve.
    Host { name: String, port: u16 },
}

impl Seed {
    /// Parse `host`, `host:port`, `ip`, `ip:port` or `[ipv6]:port`.
    ///
    /// A missing port means `default_port`.
    pub fn parse(input: &str, default_port: u16) -> Result<Seed, SeedError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(SeedError::Empty);
        }
        if let Ok(addr) = input.parse::<SocketAddr>() {
            return Ok(Seed::Address(addr));
        }
        if let Ok(ip) = input.trim_matches(['[', ']']).parse::<IpAddr>() {
            return Ok(Seed::Address(SocketAddr::new(ip, default_port)));
        }

        let (name, port) = match input.rsplit_once(':') {
            Some((name, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| SeedError::InvalidPort(input.to_string()))?;
                (name, port)
            }
            None => (input, default_port),
        };
        if name.is_empty() || name.contains(':') {
            return Err(SeedError::InvalidHost(input.to_string()));
        }
        Ok(Seed::Host {
            name: name.to_string(),
            port,
        })
    }

    /// Seeds for the network's DNS seeders on its default port.
    pub fn defaults(network: Network, default_port: u16) -> Vec<Seed> {
        dns_seeds(network)
            .iter()
            .map(|name| Seed::Host {
                name: (*name).to_string(),
                port: default_port,
            })
            .collect()
    }
}

/// Resolve seeds into IPv4 peer addresses.
///
/// Failures are logged and skipped. Onion names and IPv6 results are
/// dropped. The caller decides what an empty result means.
pub async fn resolve(seeds: &[Seed]) -> Vec<PeerAddress> {
    let mut resolved = Vec::new();
    for seed in seeds {
        match seed {
            Seed::Address(addr) if addr.is_ipv4() => {
                resolved.push(PeerAddress::from_socket_addr(*addr));
            }
            Seed::Address(addr) => warn!("Skipping seed {addr}, only IPv4 seeds are crawled"),
            Seed::Host { name, .. } if name.ends_with(".onion") => {
                warn!("Skipping onion seed {name}, onion hosts can't be reached");
            }
            Seed::Host { name, port } => {
                match tokio::net::lookup_host((name.as_str(), *port)).await {
                    Ok(addrs) => {
                        let before = resolved.len();
                        resolved.extend(
                            addrs
                                .filter(SocketAddr::is_ipv4)
                                .map(PeerAddress::from_socket_addr),
                        );
                        debug!(
                            "Seed {name} resolved to {} IPv4 addresses",
                            resolved.len() - before
                        );
                    }
                    Err(e) => warn!("Failed to resolve seed {name}: {e}"),
                }
            }
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::p2p::address::AddrV2;
    use std::net::Ipv4Addr;

    #[test]
    fn test_parse_literals() {
        assert_eq!(
            Seed::parse("10.0.0.1", 8333).unwrap(),
            Seed::Address("10.0.0.1:8333".parse().unwrap())
        );
        assert_eq!(
            Seed::parse("10.0.0.1:18444", 8333).unwrap(),
            Seed::Address("10.0.0.1:18444".parse().unwrap())
        );
        assert_eq!(
            Seed::parse("[::1]:8333", 18333).unwrap(),
            Seed::Address("[::1]:8333".parse().unwrap())
        );
        assert_eq!(
            Seed::parse("::1", 18333).unwrap(),
            Seed::Address("[::1]:18333".parse().unwrap())
        );
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(
            Seed::parse("seed.bitcoin.sipa.be", 8333).unwrap(),
            Seed::Host {
                name: "seed.bitcoin.sipa.be".to_string(),
                port: 8333
            }
        );
        assert_eq!(
            Seed::parse(" example.com:38333 ", 8333).unwrap(),
            Seed::Host {
                name: "example.com".to_string(),
                port: 38333
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Seed::parse("  ", 8333), Err(SeedError::Empty));
        assert!(matches!(
            Seed::parse("example.com:port", 8333),
            Err(SeedError::InvalidPort(_))
        ));
        assert!(matches!(
            Seed::parse(":8333", 8333),
            Err(SeedError::InvalidHost(_))
        ));
    }

    #[test]
    fn test_default_seeds() {
        assert_eq!(dns_seeds(Network::Bitcoin).len(), 6);
        assert_eq!(dns_seeds(Network::Testnet).len(), 4);
        assert!(dns_seeds(Network::Regtest).is_empty());

        let seeds = Seed::defaults(Network::Signet, 38333);
        assert_eq!(
            seeds,
            vec![Seed::Host {
                name: "seed.signet.bitcoin.sprovoost.nl".to_string(),
                port: 38333
            }]
        );
    }

    #[tokio::test]
    async fn test_resolve_keeps_ipv4_literals() {
        let seeds = vec![
            Seed::parse("10.0.0.1", 8333).unwrap(),
            Seed::parse("[2001:db8::1]:8333", 8333).unwrap(),
            Seed::parse("expyuzz4wqqyqhjn.onion", 8333).unwrap(),
            Seed::parse("10.0.0.2:18444", 8333).unwrap(),
        ];

        let resolved = resolve(&seeds).await;
        let hosts: Vec<_> = resolved.iter().map(|peer| (peer.host.clone(), peer.port)).collect();
        assert_eq!(
            hosts,
            vec![
                (AddrV2::Ipv4(Ipv4Addr::new(10, 0, 0, 1)), 8333),
                (AddrV2::Ipv4(Ipv4Addr::new(10, 0, 0, 2)), 18444),
            ]
        );
    }
}
