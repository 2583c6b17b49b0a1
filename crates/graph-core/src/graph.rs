//! Cached graph accessors
//!
//! [`GraphService`] is the only place the remote API is called from. Every
//! accessor scrubs the handle, then wraps the remote walk in
//! [`CacheStore::get_or_compute`] under a fixed namespace.

use atproto_client::graph::{FeedViewPost, ProfileView};
use atproto_client::{GraphApi, Handle, Page};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use storage::CacheStore;

use crate::config::GraphConfig;
use crate::fetcher::{fetch_all, PageLimits};
use crate::profiles::{FollowSet, ProfileSummary};
use crate::{GraphError, Result};

/// Cache namespace for detailed profiles
pub const PROFILE_NAMESPACE: &str = "bsky.get-profile";
/// Cache namespace for follower sets
pub const FOLLOWERS_NAMESPACE: &str = "bsky.get-followers";
/// Cache namespace for following sets
pub const FOLLOWING_NAMESPACE: &str = "bsky.get-following";
/// Cache namespace for following handle lists
pub const FOLLOWING_HANDLES_NAMESPACE: &str = "bsky.get-following-handles";

/// Cache namespace for one author feed page
///
/// The cursor is part of the namespace, so each page is its own entry.
pub fn author_feed_namespace(cursor: Option<&str>) -> String {
    format!("bsky.get-author-feed-{}", cursor.unwrap_or_default())
}

/// A feed post reduced to what callers read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostSummary {
    /// AT URI of the post
    pub uri: String,
    /// CID of the post record
    pub cid: String,
    /// Author handle
    pub author: String,
    /// Post text
    pub text: String,
    /// Author-claimed creation timestamp
    pub created_at: Option<String>,
    /// Like count
    pub like_count: Option<u64>,
    /// Repost count
    pub repost_count: Option<u64>,
    /// Reply count
    pub reply_count: Option<u64>,
    /// Quote count
    pub quote_count: Option<u64>,
    /// Handle of the reposter when the item is a repost
    pub reason_by: Option<String>,
}

impl From<FeedViewPost> for PostSummary {
    fn from(item: FeedViewPost) -> Self {
        let reason_by = item
            .reason
            .as_ref()
            .and_then(|reason| reason.get("by"))
            .and_then(|by| by.get("handle"))
            .and_then(|handle| handle.as_str())
            .map(str::to_string);
        let post = item.post;

        Self {
            uri: post.uri,
            cid: post.cid,
            author: post.author.handle,
            text: post.record.text,
            created_at: post.record.created_at,
            like_count: post.like_count,
            repost_count: post.repost_count,
            reply_count: post.reply_count,
            quote_count: post.quote_count,
            reason_by,
        }
    }
}

/// One cached page of an author feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPage {
    /// Posts on this page
    pub feed: Vec<PostSummary>,
    /// Cursor for the next page; `None` at the end of the feed
    pub next: Option<String>,
}

/// Cached access to the remote social graph
#[derive(Clone)]
pub struct GraphService {
    api: Arc<dyn GraphApi>,
    cache: CacheStore,
    config: GraphConfig,
}

impl std::fmt::Debug for GraphService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphService")
            .field("cache", &self.cache)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GraphService {
    /// Create a graph service
    pub fn new(api: Arc<dyn GraphApi>, cache: CacheStore, config: GraphConfig) -> Self {
        Self { api, cache, config }
    }

    /// The cache every accessor goes through
    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Traversal configuration
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    fn follows_limits(&self) -> PageLimits {
        PageLimits::new(self.config.follows_page_size, self.config.max_follows_pages)
    }

    /// Detailed profile
    pub async fn profile(&self, handle: &str) -> Result<ProfileSummary> {
        let handle = Handle::new(handle);
        let actor = handle.as_str();

        self.cache
            .get_or_compute(PROFILE_NAMESPACE, actor, move || async move {
                let profile = self.api.get_profile(actor).await?;
                Ok::<_, GraphError>(ProfileSummary::from(profile))
            })
            .await
    }

    /// Accounts following `handle`, hidden profiles removed
    pub async fn followers(&self, handle: &str) -> Result<FollowSet> {
        let handle = Handle::new(handle);
        let actor = handle.as_str();

        self.cache
            .get_or_compute(FOLLOWERS_NAMESPACE, actor, move || async move {
                let profiles = fetch_all(
                    FOLLOWERS_NAMESPACE,
                    self.follows_limits(),
                    |cursor, limit| self.api.get_followers(actor, limit, cursor),
                    |profile: &ProfileView| !profile.is_hidden(),
                )
                .await?;
                let set: FollowSet = profiles.into_iter().map(ProfileSummary::from).collect();
                Ok::<_, GraphError>(set)
            })
            .await
    }

    /// Accounts `handle` follows, hidden profiles removed
    pub async fn following(&self, handle: &str) -> Result<FollowSet> {
        let handle = Handle::new(handle);
        let actor = handle.as_str();

        self.cache
            .get_or_compute(FOLLOWING_NAMESPACE, actor, move || async move {
                let profiles = self.fetch_follows(actor).await?;
                let set: FollowSet = profiles.into_iter().map(ProfileSummary::from).collect();
                Ok::<_, GraphError>(set)
            })
            .await
    }

    /// Handles `handle` follows, in listing order with repeated accounts dropped
    pub async fn following_handles(&self, handle: &str) -> Result<Vec<String>> {
        let handle = Handle::new(handle);
        let actor = handle.as_str();

        self.cache
            .get_or_compute(FOLLOWING_HANDLES_NAMESPACE, actor, move || async move {
                let profiles = self.fetch_follows(actor).await?;
                let mut seen = HashSet::new();
                let handles: Vec<String> = profiles
                    .into_iter()
                    .filter(|profile| seen.insert(profile.did.clone()))
                    .map(|profile| profile.handle)
                    .collect();
                Ok::<_, GraphError>(handles)
            })
            .await
    }

    async fn fetch_follows(&self, actor: &str) -> Result<Vec<ProfileView>> {
        let profiles = fetch_all(
            FOLLOWING_NAMESPACE,
            self.follows_limits(),
            |cursor, limit| self.api.get_follows(actor, limit, cursor),
            |profile: &ProfileView| !profile.is_hidden(),
        )
        .await?;
        Ok(profiles)
    }

    /// One page of the author feed, starting at `cursor`
    pub async fn author_feed(&self, handle: &str, cursor: Option<&str>) -> Result<FeedPage> {
        let handle = Handle::new(handle);
        let actor = handle.as_str();
        let cursor = cursor.filter(|c| !c.is_empty());
        let namespace = author_feed_namespace(cursor);

        self.cache
            .get_or_compute(&namespace, actor, move || async move {
                let page = self
                    .api
                    .get_author_feed(actor, self.config.feed_page_size, cursor.map(str::to_string))
                    .await?;
                Ok::<_, GraphError>(FeedPage {
                    feed: page.items.into_iter().map(PostSummary::from).collect(),
                    next: page.cursor,
                })
            })
            .await
    }

    /// Post texts from up to `pages` feed pages, newest first
    pub async fn author_feed_texts(&self, handle: &str, pages: usize) -> Result<Vec<String>> {
        let posts = fetch_all(
            "bsky.get-author-feed-texts",
            PageLimits::new(self.config.feed_page_size, pages),
            |cursor, _| async move {
                let page = self.author_feed(handle, cursor.as_deref()).await?;
                Ok::<_, GraphError>(Page::new(page.feed, page.next))
            },
            |_: &PostSummary| true,
        )
        .await?;

        Ok(posts.into_iter().map(|post| post.text).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{memory_cache, profile_with_viewer, FakeGraph};
    use atproto_client::graph::ViewerState;
    use storage::CacheBackend;

    fn service(fake: Arc<FakeGraph>) -> GraphService {
        GraphService::new(fake, memory_cache(), GraphConfig::default())
    }

    #[test]
    fn test_author_feed_namespace() {
        assert_eq!(author_feed_namespace(None), "bsky.get-author-feed-");
        assert_eq!(author_feed_namespace(Some("3kabc")), "bsky.get-author-feed-3kabc");
    }

    #[tokio::test]
    async fn test_followers_are_cached_under_scrubbed_handle() {
        let fake = Arc::new(FakeGraph::new().follow("bob.test", &["alice.test"]));
        let graph = service(fake.clone());

        let first = graph.followers("Alice.Test!").await.unwrap();
        let calls = fake.calls();
        let second = graph.followers("alice.test").await.unwrap();

        assert_eq!(first.handles(), vec!["bob.test"]);
        assert_eq!(first, second);
        assert_eq!(fake.calls(), calls);

        let key = CacheStore::key(FOLLOWERS_NAMESPACE, "alice.test");
        assert!(graph.cache().backend().get(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_following_walks_pages_and_dedups() {
        let fake = FakeGraph::new().follow("alice.test", &["b", "c", "d", "e", "b"]);
        let graph = GraphService::new(
            Arc::new(fake),
            memory_cache(),
            GraphConfig::default().with_follows_paging(2, 25),
        );

        let following = graph.following("alice.test").await.unwrap();
        assert_eq!(following.handles(), vec!["b", "c", "d", "e"]);

        let handles = graph.following_handles("alice.test").await.unwrap();
        assert_eq!(handles, vec!["b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn test_following_truncates_at_page_bound() {
        let fake = FakeGraph::new().follow("alice.test", &["b", "c", "d", "e", "f"]);
        let graph = GraphService::new(
            Arc::new(fake),
            memory_cache(),
            GraphConfig::default().with_follows_paging(2, 2),
        );

        let handles = graph.following_handles("alice.test").await.unwrap();
        assert_eq!(handles, vec!["b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn test_hidden_profiles_are_dropped() {
        let blocked = ViewerState { blocked_by: Some(true), ..Default::default() };
        let fake = FakeGraph::new()
            .follow("alice.test", &["bob.test", "handle.invalid"])
            .follow_profile("alice.test", profile_with_viewer("mallory.test", blocked));
        let graph = service(Arc::new(fake));

        let handles = graph.following_handles("alice.test").await.unwrap();
        assert_eq!(handles, vec!["bob.test"]);
    }

    #[tokio::test]
    async fn test_profile_counts() {
        let fake = FakeGraph::new()
            .follow("alice.test", &["bob.test"])
            .follow("carol.test", &["alice.test"]);
        let graph = service(Arc::new(fake));

        let profile = graph.profile("alice.test").await.unwrap();
        assert_eq!(profile.did, "did:plc:alice.test");
        assert_eq!(profile.followers_count, Some(1));
        assert_eq!(profile.follows_count, Some(1));
    }

    #[tokio::test]
    async fn test_remote_error_propagates_and_is_not_cached() {
        let fake = Arc::new(FakeGraph::new().follow("alice.test", &["bob.test"]).failing("alice.test"));
        let graph = service(fake.clone());

        assert!(matches!(
            graph.following("alice.test").await,
            Err(crate::GraphError::Api(_))
        ));

        let key = CacheStore::key(FOLLOWING_NAMESPACE, "alice.test");
        assert!(graph.cache().backend().get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_author_feed_pages_and_texts() {
        let texts: Vec<String> = (0..5).map(|i| format!("post {i}")).collect();
        let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let fake = FakeGraph::new().posts("alice.test", &text_refs);
        let mut config = GraphConfig::default();
        config.feed_page_size = 2;
        let graph = GraphService::new(Arc::new(fake), memory_cache(), config);

        let first = graph.author_feed("alice.test", None).await.unwrap();
        assert_eq!(first.feed.len(), 2);
        assert_eq!(first.next.as_deref(), Some("2"));

        let second = graph.author_feed("alice.test", first.next.as_deref()).await.unwrap();
        assert_eq!(second.feed[0].text, "post 2");

        let key = CacheStore::key(&author_feed_namespace(Some("2")), "alice.test");
        assert!(graph.cache().backend().get(&key).await.unwrap().is_some());

        assert_eq!(graph.author_feed_texts("alice.test", 2).await.unwrap().len(), 4);
        assert_eq!(graph.author_feed_texts("alice.test", 25).await.unwrap(), texts);
    }
}
