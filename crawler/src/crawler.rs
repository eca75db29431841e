use crate::aggregator::{Aggregator, CrawlResult};
use crate::connection::{Connector, TcpConnector};
use crate::error::CrawlError;
use crate::scheduler::{Scheduler, SchedulerConfig};
use bitcoin::Network;
use log::info;
use peermap_connection::{ConnectionConfiguration, PeerAddress};

/// A crawler for the bitcoin peer-to-peer network.
///
/// This crawler visits peers breadth-first from a set of seeds, performs the
/// version handshake with each, and asks them for more peers until it has
/// seen its target number of hosts, runs out of peers, or runs out of time.
///
/// Build one with [`crate::CrawlerBuilder`].
#[derive(Debug, Clone)]
pub struct Crawler {
    /// bitcoin network the [`Crawler`] operates on.
    network: Network,
    /// Wire side configuration shared by every session.
    connection: ConnectionConfiguration,
    scheduler: SchedulerConfig,
}

impl Crawler {
    pub(crate) fn new(
        network: Network,
        connection: ConnectionConfiguration,
        scheduler: SchedulerConfig,
    ) -> Self {
        Crawler {
            network,
            connection,
            scheduler,
        }
    }

    /// Crawl the network over TCP starting from `seeds`.
    ///
    /// # Arguments
    ///
    /// * `seeds` - Peers to start from. A zero port means the network's default.
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlResult)` - Whatever was learned, including partial results
    ///   after a deadline.
    /// * `Err(CrawlError::NoSeeds)` - If `seeds` is empty.
    pub async fn crawl(&self, seeds: Vec<PeerAddress>) -> Result<CrawlResult, CrawlError> {
        self.crawl_with(TcpConnector::new(self.connection.clone()), seeds)
            .await
    }

    /// Crawl starting from `seeds`, opening connections through `connector`.
    pub async fn crawl_with<C: Connector>(
        &self,
        connector: C,
        seeds: Vec<PeerAddress>,
    ) -> Result<CrawlResult, CrawlError> {
        if seeds.is_empty() {
            return Err(CrawlError::NoSeeds);
        }
        let default_port = self.connection.default_port();
        let seeds: Vec<PeerAddress> = seeds
            .into_iter()
            .map(|seed| seed.normalize_port(default_port))
            .collect();

        info!(
            "Crawling {} from {} seeds: target {}, concurrency {}, session timeout {:?}, global timeout {:?}",
            self.network,
            seeds.len(),
            self.scheduler.target,
            self.scheduler.concurrency,
            self.scheduler.session_timeout,
            self.scheduler.global_timeout
        );

        let mut aggregator = Aggregator::new(self.network, self.scheduler.policy);
        let scheduler = Scheduler::new(connector, self.connection.clone(), self.scheduler);
        let outcome = scheduler.run(seeds, &mut aggregator).await;

        let result = aggregator.build(
            outcome.total_discovered,
            outcome.total_visited,
            outcome.stop_reason,
            outcome.stats,
        );
        info!(
            "Crawl finished: {} nodes reported, {} discovered, {} visited",
            result.nodes.len(),
            result.total_discovered,
            result.total_visited
        );
        Ok(result)
    }
}
