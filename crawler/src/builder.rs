//! Builder pattern for configuring and creating crawler instances.

use crate::aggregator::AddressPolicy;
use crate::crawler::Crawler;
use crate::error::CrawlerBuilderError;
use crate::scheduler::SchedulerConfig;
use bitcoin::Network;
use peermap_connection::{
    ConnectionConfiguration, UserAgent, DEFAULT_CONNECTION_TIMEOUT, DEFAULT_PROTOCOL_VERSION,
};
use std::time::Duration;

/// Builder for creating a customized [`Crawler`] instance.
///
/// # Example
///
/// ```
/// # fn main() -> Result<(), peermap_crawler::CrawlerBuilderError> {
/// use bitcoin::Network;
/// use peermap_crawler::CrawlerBuilder;
/// use std::time::Duration;
///
/// // Crawl mainnet with the defaults.
/// let basic_crawler = CrawlerBuilder::new(Network::Bitcoin).build();
///
/// // A smaller, quicker crawl.
/// let custom_crawler = CrawlerBuilder::new(Network::Bitcoin)
///     .with_user_agent("/my-custom-crawler:1.0/")?
///     .with_target(200)?
///     .with_concurrency(50)
///     .with_session_timeout(Duration::from_secs(10))
///     .with_global_timeout(Duration::from_secs(120))
///     .build();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CrawlerBuilder {
    /// Bitcoin network the crawler will operate on.
    network: Network,
    /// Custom user agent advertised for connection.
    user_agent: Option<UserAgent>,
    /// Protocol version to advertise in connections.
    protocol_version: u32,
    /// Scheduling limits and the address policy.
    scheduler: SchedulerConfig,
}

impl CrawlerBuilder {
    /// Create a new crawler builder for the specified network.
    ///
    /// # Arguments
    ///
    /// * `network` - The bitcoin network to crawl.
    ///
    /// # Returns
    ///
    /// A new `CrawlerBuilder` instance.
    pub fn new(network: Network) -> Self {
        CrawlerBuilder {
            network,
            user_agent: None,
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            scheduler: SchedulerConfig::default(),
        }
    }

    /// Set a custom user agent string for the crawler.
    ///
    /// The user agent identifies the crawler to other peers on the network.
    /// It must follow Bitcoin Core's convention: "/Name:Version/".
    ///
    /// # Arguments
    ///
    /// * `user_agent` - The user agent string to use.
    ///
    /// # Returns
    ///
    /// * `Ok(Self)` - The builder for method chaining if validation succeeds.
    /// * `Err(CrawlerBuilderError)` - If the user agent format is invalid.
    pub fn with_user_agent<S: Into<String>>(
        mut self,
        user_agent: S,
    ) -> Result<Self, CrawlerBuilderError> {
        self.user_agent = Some(UserAgent::new(user_agent.into())?);
        Ok(self)
    }

    /// Set the protocol version to advertise in connections.
    ///
    /// # Arguments
    ///
    /// * `version` - The protocol version to advertise.
    ///
    /// # Returns
    ///
    /// Self for method chaining.
    pub fn with_protocol_version(mut self, version: u32) -> Self {
        self.protocol_version = version;
        self
    }

    /// Set the number of distinct hosts after which the crawl stops.
    ///
    /// Seen hosts count, not successful visits, so the crawl can stop with
    /// most of the target never contacted.
    ///
    /// # Arguments
    ///
    /// * `target` - Population size to converge on (defaults to 1000).
    ///
    /// # Returns
    ///
    /// * `Ok(Self)` - The builder for method chaining.
    /// * `Err(CrawlerBuilderError::ZeroTarget)` - If `target` is zero.
    pub fn with_target(mut self, target: usize) -> Result<Self, CrawlerBuilderError> {
        if target == 0 {
            return Err(CrawlerBuilderError::ZeroTarget);
        }
        self.scheduler.target = target;
        Ok(self)
    }

    /// Set the maximum number of sessions in flight.
    ///
    /// This is the only throttle on the crawl and also caps the number of
    /// open sockets. Zero is raised to one.
    ///
    /// # Arguments
    ///
    /// * `concurrency` - Maximum concurrent sessions (defaults to 300).
    ///
    /// # Returns
    ///
    /// Self for method chaining.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.scheduler.concurrency = concurrency.max(1);
        self
    }

    /// Set the time budget of a single peer session.
    ///
    /// Covers the TCP connect, handshake and address collection.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Session deadline (defaults to 30 seconds).
    ///
    /// # Returns
    ///
    /// Self for method chaining.
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.scheduler.session_timeout = timeout;
        self
    }

    /// Set the time budget of the whole crawl.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Global deadline (defaults to 600 seconds).
    ///
    /// # Returns
    ///
    /// Self for method chaining.
    pub fn with_global_timeout(mut self, timeout: Duration) -> Self {
        self.scheduler.global_timeout = timeout;
        self
    }

    /// Pause after every scheduling pass that started new sessions.
    ///
    /// # Arguments
    ///
    /// * `delay` - Pause length (defaults to zero, no pause).
    ///
    /// # Returns
    ///
    /// Self for method chaining.
    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.scheduler.batch_delay = delay;
        self
    }

    /// Only dial and report globally routable addresses.
    ///
    /// Gossiped hosts in private or reserved ranges are still counted as
    /// discovered, but no session is ever opened to them.
    ///
    /// # Arguments
    ///
    /// * `public_only` - Skip private and reserved ranges.
    ///
    /// # Returns
    ///
    /// Self for method chaining.
    pub fn with_public_only(mut self, public_only: bool) -> Self {
        self.scheduler.policy = if public_only {
            AddressPolicy::PublicOnly
        } else {
            AddressPolicy::All
        };
        self
    }

    /// Build the crawler with the configured options.
    ///
    /// # Returns
    ///
    /// A configured `Crawler` instance.
    pub fn build(self) -> Crawler {
        let connection = ConnectionConfiguration::non_listening(
            self.network,
            self.protocol_version,
            self.user_agent,
        )
        .with_connection_timeout(DEFAULT_CONNECTION_TIMEOUT.min(self.scheduler.session_timeout));
        Crawler::new(self.network, connection, self.scheduler)
    }
}
