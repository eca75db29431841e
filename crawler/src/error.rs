//! Error types for crawler configuration and runs.

use peermap_connection::UserAgentError;
use std::fmt;

/// Errors that can occur during crawler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlerBuilderError {
    /// User agent doesn't follow the required format.
    InvalidUserAgent(UserAgentError),
    /// A target population of zero would end the crawl before it starts.
    ZeroTarget,
}

impl fmt::Display for CrawlerBuilderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrawlerBuilderError::InvalidUserAgent(err) => {
                write!(f, "Invalid user agent: {err}")
            }
            CrawlerBuilderError::ZeroTarget => write!(f, "Target must be at least one peer"),
        }
    }
}

impl std::error::Error for CrawlerBuilderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CrawlerBuilderError::InvalidUserAgent(err) => Some(err),
            CrawlerBuilderError::ZeroTarget => None,
        }
    }
}

impl From<UserAgentError> for CrawlerBuilderError {
    fn from(err: UserAgentError) -> Self {
        CrawlerBuilderError::InvalidUserAgent(err)
    }
}

/// Errors which stop a crawl from starting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlError {
    /// No usable seed address was supplied or resolved.
    NoSeeds,
}

impl fmt::Display for CrawlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrawlError::NoSeeds => write!(f, "No seed address could be resolved"),
        }
    }
}

impl std::error::Error for CrawlError {}

/// Errors parsing a seed argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedError {
    Empty,
    /// The part after the last colon is not a port number.
    InvalidPort(String),
    InvalidHost(String),
}

impl fmt::Display for SeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeedError::Empty => write!(f, "Seed is empty"),
            SeedError::InvalidPort(seed) => write!(f, "Invalid port in seed '{seed}'"),
            SeedError::InvalidHost(seed) => write!(f, "Invalid host in seed '{seed}'"),
        }
    }
}

impl std::error::Error for SeedError {}

/// Errors writing a crawl result.
#[derive(Debug)]
pub enum OutputError {
    /// Creating, writing or renaming the output failed.
    Io(std::io::Error),
    /// The result could not be serialized.
    Json(serde_json::Error),
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputError::Io(err) => write!(f, "Failed to write crawl result: {err}"),
            OutputError::Json(err) => write!(f, "Failed to serialize crawl result: {err}"),
        }
    }
}

impl std::error::Error for OutputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OutputError::Io(err) => Some(err),
            OutputError::Json(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for OutputError {
    fn from(err: std::io::Error) -> Self {
        OutputError::Io(err)
    }
}

impl From<serde_json::Error> for OutputError {
    fn from(err: serde_json::Error) -> Self {
        OutputError::Json(err)
    }
}
