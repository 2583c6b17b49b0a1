//! Social graph analysis for Graph Compass
//!
//! This crate turns the raw follower/follow listings of the remote API into
//! the aggregate views the application serves: mutuals, credibility,
//! popularity and follow suggestions, plus the background emoji summary job.
//! Every remote read goes through the shared [`storage::CacheStore`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aggregate;
pub mod config;
pub mod fetcher;
pub mod graph;
pub mod profiles;
pub mod summary;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use aggregate::{GraphAggregator, Windowed};
pub use config::{GraphConfig, WindowConfig};
pub use fetcher::{fetch_all, PageLimits};
pub use graph::{FeedPage, GraphService, PostSummary};
pub use profiles::{FollowSet, ProfileSummary};
pub use summary::{
    EmojiLine, EmojiMatch, Keyword, SummaryRequest, SummaryWorker, TextAnalyzer,
    EMOJI_SUMMARY_NAMESPACE,
};

use thiserror::Error;

/// Graph error types
#[derive(Debug, Error)]
pub enum GraphError {
    /// Remote API failure
    #[error("API error: {0}")]
    Api(#[from] atproto_client::Error),

    /// Cache failure that could not be degraded (corrupt entry)
    #[error("Cache error: {0}")]
    Cache(#[from] storage::CacheError),

    /// Task store failure
    #[error("Task error: {0}")]
    Task(#[from] storage::TaskError),

    /// Credibility requested for an account with no followers
    #[error("{0} has no followers")]
    NoFollowers(String),

    /// Keyword extraction or emoji matching failed
    #[error("Analysis error: {0}")]
    Analysis(String),
}

/// Result type for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;
