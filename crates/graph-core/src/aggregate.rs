//! Follow graph aggregation
//!
//! Set operations (mutuals, credibility) intersect two cached follow sets.
//! Windowed operations (popularity, suggestions) walk a slice of the acting
//! account's sorted following list, fetching each member's following list in
//! turn, so one request costs at most `page_size` sub-fetches. The caller
//! advances with the returned `next` index until it comes back exhausted.

use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::ops::Range;

use crate::config::WindowConfig;
use crate::graph::GraphService;
use crate::profiles::FollowSet;
use crate::{GraphError, Result};
use atproto_client::Handle;

/// One window of a paginated aggregation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Windowed<T> {
    /// Aggregate for this window
    pub data: T,
    /// Index for the following call; `None` (serialized as `-1`) once exhausted
    #[serde(serialize_with = "serialize_next")]
    pub next: Option<usize>,
}

impl<T> Windowed<T> {
    /// Wire form of `next`
    pub fn next_index(&self) -> i64 {
        self.next.map_or(-1, |n| n as i64)
    }
}

fn serialize_next<S: Serializer>(next: &Option<usize>, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    match next {
        Some(n) => serializer.serialize_u64(*n as u64),
        None => serializer.serialize_i64(-1),
    }
}

/// Slice of a sorted list plus the continuation index
fn window_bounds(len: usize, index: usize, window: WindowConfig) -> (Range<usize>, Option<usize>) {
    let end = index.saturating_add(window.page_size);
    let range = index.min(len)..end.min(len);
    let next = (end < window.bound() && end < len).then_some(end);
    (range, next)
}

/// Aggregate queries over the cached graph
#[derive(Debug, Clone)]
pub struct GraphAggregator {
    graph: GraphService,
}

impl GraphAggregator {
    /// Create an aggregator over a graph service
    pub fn new(graph: GraphService) -> Self {
        Self { graph }
    }

    /// The underlying graph service
    pub fn graph(&self) -> &GraphService {
        &self.graph
    }

    /// Accounts that both follow and are followed by `handle`
    pub async fn mutuals(&self, handle: &str) -> Result<FollowSet> {
        let followers = self.graph.followers(handle).await?;
        let following = self.graph.following(handle).await?;
        Ok(followers.intersection(&following))
    }

    /// Accounts `me` follows that also follow `them`
    pub async fn credibility(&self, me: &str, them: &str) -> Result<FollowSet> {
        let my_following = self.graph.following(me).await?;
        let their_followers = self.graph.followers(them).await?;
        Ok(my_following.intersection(&their_followers))
    }

    /// Share of `them`'s followers that `me` follows, in `0.0..=1.0`
    ///
    /// Fails with [`GraphError::NoFollowers`] when `them` has no followers.
    pub async fn credibility_percent(&self, me: &str, them: &str) -> Result<f64> {
        let their_followers = self.graph.followers(them).await?;
        if their_followers.is_empty() {
            return Err(GraphError::NoFollowers(Handle::scrub(them)));
        }

        let lenders = self.credibility(me, them).await?;
        Ok(lenders.len() as f64 / their_followers.len() as f64)
    }

    async fn sorted_following(&self, me: &str) -> Result<Vec<String>> {
        let mut handles: Vec<String> = self
            .graph
            .following_handles(me)
            .await?
            .iter()
            .map(|handle| Handle::scrub(handle))
            .collect();
        handles.sort();
        Ok(handles)
    }

    /// How many accounts in the current window follow each handle
    pub async fn popularity(&self, me: &str, index: usize) -> Result<Windowed<BTreeMap<String, u32>>> {
        let config = self.graph.config();
        let my_following = self.sorted_following(me).await?;
        let (range, next) = window_bounds(my_following.len(), index, config.popularity);
        tracing::debug!(handle = %me, start = range.start, end = range.end, "popularity window");

        let mut counts = BTreeMap::new();
        for member in &my_following[range] {
            for followee in self.graph.following_handles(member).await? {
                let followee = Handle::scrub(&followee);
                if config.is_ignored(&followee) {
                    continue;
                }
                *counts.entry(followee).or_insert(0) += 1;
            }
        }

        Ok(Windowed { data: counts, next })
    }

    /// Accounts followed by the current window that `me` does not follow
    ///
    /// A handle reached through several members appears once per member.
    pub async fn suggestions(&self, me: &str, index: usize) -> Result<Windowed<Vec<String>>> {
        let window = self.graph.config().suggestions;
        self.suggest(me, index, window).await
    }

    /// Suggestions over the whole following list in one pass
    pub async fn recommendations(&self, me: &str) -> Result<Vec<String>> {
        Ok(self.suggest(me, 0, WindowConfig::unbounded()).await?.data)
    }

    async fn suggest(&self, me: &str, index: usize, window: WindowConfig) -> Result<Windowed<Vec<String>>> {
        let config = self.graph.config();
        let me = Handle::scrub(me);
        let my_following = self.sorted_following(&me).await?;
        let already: HashSet<&str> = my_following.iter().map(String::as_str).collect();
        let (range, next) = window_bounds(my_following.len(), index, window);
        tracing::debug!(handle = %me, start = range.start, end = range.end, "suggestions window");

        let mut suggestions = Vec::new();
        for member in &my_following[range] {
            for followee in self.graph.following_handles(member).await? {
                let followee = Handle::scrub(&followee);
                if followee == me || already.contains(followee.as_str()) || config.is_ignored(&followee) {
                    continue;
                }
                suggestions.push(followee);
            }
        }

        Ok(Windowed { data: suggestions, next })
    }
}
