//! Breadth-first discovery of the bitcoin peer-to-peer network.
//!
//! A crawl starts from seed addresses, visits every peer it hears about at
//! most once, and asks each for the peers it knows. It stops when enough
//! distinct hosts have been seen, when nothing is left to visit, or when its
//! time budget runs out.
//!
//! ```no_run
//! # async fn crawl() -> Result<(), Box<dyn std::error::Error>> {
//! use bitcoin::Network;
//! use peermap_crawler::{seeds, CrawlerBuilder, Output};
//!
//! let crawler = CrawlerBuilder::new(Network::Bitcoin).with_target(500)?.build();
//! let seeds = seeds::resolve(&seeds::Seed::defaults(Network::Bitcoin, 8333)).await;
//! let result = crawler.crawl(seeds).await?;
//! Output::Stdout.write(&result)?;
//! # Ok(())
//! # }
//! ```

mod aggregator;
mod builder;
mod connection;
mod crawler;
mod error;
mod frontier;
mod output;
mod scheduler;
pub mod seeds;
mod session;

pub use aggregator::{AddressPolicy, Aggregator, CrawlResult, NodeInfo};
pub use builder::CrawlerBuilder;
pub use connection::{Connector, PeerConnection, TcpConnector};
pub use crawler::Crawler;
pub use error::{CrawlError, CrawlerBuilderError, OutputError, SeedError};
pub use frontier::Frontier;
pub use output::Output;
pub use scheduler::{
    CrawlOutcome, CrawlStats, Scheduler, SchedulerConfig, StopReason, DEFAULT_CONCURRENCY,
    DEFAULT_GLOBAL_TIMEOUT, DEFAULT_SESSION_TIMEOUT, DEFAULT_TARGET,
};
pub use session::{PeerSession, SessionReport, SessionState};

// Re-exports.
pub use peermap_connection::{ConnectionError, PeerAddress, PeerProtocolVersion, PeerServices};
