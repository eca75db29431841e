//! Connection configuration types and constants.

use crate::user_agent::UserAgent;
use bitcoin::p2p::{Magic, ServiceFlags};
use bitcoin::Network;
use std::fmt;
use std::time::Duration;

/// Protocol version advertised by default (BIP 0155 / BIP 0339 era).
pub const DEFAULT_PROTOCOL_VERSION: u32 = 70016;

/// Default timeout for connection establishment.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Default user agent, `/peermap:<version>/`.
pub fn default_user_agent() -> UserAgent {
    UserAgent::from_name_version("peermap", env!("CARGO_PKG_VERSION"))
}

/// Default listening port for a network.
pub fn default_port(network: Network) -> u16 {
    match network {
        Network::Bitcoin => 8333,
        Network::Signet => 38333,
        Network::Regtest => 18444,
        _ => 18333,
    }
}

/// Configuration used to build a connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfiguration {
    /// Network the connection speaks for, selects magic and default port.
    pub network: Network,
    /// Protocol version advertised in the version message.
    pub protocol_version: u32,
    /// User agent advertised in the version message.
    pub user_agent: UserAgent,
    /// Service flags advertised by this node.
    pub services: ServiceFlags,
    /// Block height advertised in version messages.
    pub start_height: i32,
    /// Whether the peer should relay transactions to us.
    pub relay: bool,
    /// Timeout for connection establishment.
    pub connection_timeout: Duration,
}

impl ConnectionConfiguration {
    /// Creates a new configuration for a non-listening node.
    ///
    /// Advertises no services, no chain, and asks peers not to relay
    /// transactions. Enough to be answered by a peer, nothing more.
    ///
    /// # Arguments
    ///
    /// * `network` - The network to connect on.
    /// * `protocol_version` - The protocol version to advertise.
    /// * `user_agent` - Custom user agent. Defaults to [`default_user_agent`] if None.
    ///
    /// # Returns
    ///
    /// A new ConnectionConfiguration configured for a non-listening node.
    pub fn non_listening(
        network: Network,
        protocol_version: u32,
        user_agent: Option<UserAgent>,
    ) -> Self {
        Self {
            network,
            protocol_version,
            user_agent: user_agent.unwrap_or_else(default_user_agent),
            services: ServiceFlags::NONE,
            start_height: 0,
            relay: false,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
        }
    }

    /// Set the timeout for connection establishment.
    ///
    /// # Example
    ///
    /// ```
    /// use bitcoin::Network;
    /// use peermap_connection::ConnectionConfiguration;
    /// use std::time::Duration;
    ///
    /// let config = ConnectionConfiguration::non_listening(Network::Bitcoin, 70016, None)
    ///     .with_connection_timeout(Duration::from_secs(5));
    /// assert_eq!(config.connection_timeout, Duration::from_secs(5));
    /// ```
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Network magic for framing.
    pub fn magic(&self) -> Magic {
        self.network.magic()
    }

    /// Default port of the configured network.
    pub fn default_port(&self) -> u16 {
        default_port(self.network)
    }
}

impl fmt::Display for ConnectionConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConnectionConfiguration {{ network: {}, protocol: {}, user_agent: \"{}\", services: {}, relay: {} }}",
            self.network, self.protocol_version, self.user_agent, self.services, self.relay
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_listening_defaults() {
        let config = ConnectionConfiguration::non_listening(Network::Bitcoin, 70016, None);
        assert_eq!(config.services, ServiceFlags::NONE);
        assert!(!config.relay);
        assert_eq!(config.start_height, 0);
        assert_eq!(config.connection_timeout, DEFAULT_CONNECTION_TIMEOUT);
        assert!(config.user_agent.as_str().starts_with("/peermap:"));
        assert_eq!(config.magic(), Magic::BITCOIN);
    }

    #[test]
    fn test_default_ports() {
        assert_eq!(default_port(Network::Bitcoin), 8333);
        assert_eq!(default_port(Network::Testnet), 18333);
        assert_eq!(default_port(Network::Signet), 38333);
        assert_eq!(default_port(Network::Regtest), 18444);
    }
}
