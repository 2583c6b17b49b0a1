//! In-memory graph fixtures for tests
//!
//! [`FakeGraph`] serves follow edges and author feeds from memory, paginated
//! with numeric offset cursors, and counts every remote call it receives.

use async_trait::async_trait;
use atproto_client::graph::{FeedViewPost, PostRecord, PostView, ProfileView, ViewerState};
use atproto_client::xrpc::XrpcError;
use atproto_client::{GraphApi, Page};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use storage::{CacheStore, KvStore};

/// Cache over a temporary sled store
pub fn memory_cache() -> CacheStore {
    CacheStore::with_backend(Arc::new(KvStore::in_memory().unwrap()))
}

/// Listing profile with DID `did:plc:{handle}`
pub fn profile(handle: &str) -> ProfileView {
    ProfileView {
        did: format!("did:plc:{}", handle),
        handle: handle.to_string(),
        display_name: None,
        description: None,
        avatar: None,
        banner: None,
        followers_count: None,
        follows_count: None,
        posts_count: None,
        created_at: None,
        indexed_at: None,
        viewer: None,
    }
}

/// Listing profile carrying a viewer state
pub fn profile_with_viewer(handle: &str, viewer: ViewerState) -> ProfileView {
    ProfileView { viewer: Some(viewer), ..profile(handle) }
}

fn post(author: &str, index: usize, text: &str) -> FeedViewPost {
    FeedViewPost {
        post: PostView {
            uri: format!("at://did:plc:{}/app.bsky.feed.post/{}", author, index),
            cid: format!("bafy{}", index),
            author: profile(author),
            record: PostRecord { text: text.to_string(), created_at: None },
            reply_count: None,
            repost_count: None,
            like_count: None,
            quote_count: None,
            indexed_at: None,
        },
        reason: None,
    }
}

fn page<T: Clone>(items: &[T], limit: u32, cursor: Option<String>) -> Page<T> {
    let offset = cursor.and_then(|c| c.parse::<usize>().ok()).unwrap_or(0).min(items.len());
    let end = offset.saturating_add(limit.max(1) as usize).min(items.len());
    let next = (end < items.len()).then(|| end.to_string());
    Page::new(items[offset..end].to_vec(), next)
}

/// In-memory [`GraphApi`]
#[derive(Debug, Default)]
pub struct FakeGraph {
    follows: HashMap<String, Vec<ProfileView>>,
    followers: HashMap<String, Vec<ProfileView>>,
    feeds: HashMap<String, Vec<FeedViewPost>>,
    failing: HashSet<String>,
    calls: AtomicUsize,
}

impl FakeGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add follow edges `who -> whom[..]`, in listing order
    ///
    /// Repeating a target repeats it in the listing.
    pub fn follow(mut self, who: &str, whom: &[&str]) -> Self {
        for target in whom {
            self = self.follow_profile(who, profile(target));
        }
        self.follows.entry(who.to_string()).or_default();
        self
    }

    /// Add a follow edge to an arbitrary profile view
    pub fn follow_profile(mut self, who: &str, target: ProfileView) -> Self {
        self.followers.entry(target.handle.clone()).or_default().push(profile(who));
        self.follows.entry(who.to_string()).or_default().push(target);
        self
    }

    /// Give `who` an author feed, newest first
    pub fn posts(mut self, who: &str, texts: &[&str]) -> Self {
        let feed = texts.iter().enumerate().map(|(i, text)| post(who, i, text)).collect();
        self.feeds.insert(who.to_string(), feed);
        self
    }

    /// Make every call about `actor` fail with a 502
    pub fn failing(mut self, actor: &str) -> Self {
        self.failing.insert(actor.to_string());
        self
    }

    /// Remote calls served so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self, actor: &str) -> atproto_client::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(actor) {
            return Err(XrpcError::new(502, "UpstreamFailure", format!("{} unavailable", actor)).into());
        }
        Ok(())
    }
}

#[async_trait]
impl GraphApi for FakeGraph {
    async fn get_followers(
        &self,
        actor: &str,
        limit: u32,
        cursor: Option<String>,
    ) -> atproto_client::Result<Page<ProfileView>> {
        self.enter(actor)?;
        let listing = self.followers.get(actor).map(Vec::as_slice).unwrap_or_default();
        Ok(page(listing, limit, cursor))
    }

    async fn get_follows(
        &self,
        actor: &str,
        limit: u32,
        cursor: Option<String>,
    ) -> atproto_client::Result<Page<ProfileView>> {
        self.enter(actor)?;
        let listing = self.follows.get(actor).map(Vec::as_slice).unwrap_or_default();
        Ok(page(listing, limit, cursor))
    }

    async fn get_profile(&self, actor: &str) -> atproto_client::Result<ProfileView> {
        self.enter(actor)?;

        let follows = self.follows.get(actor);
        let followers = self.followers.get(actor);
        let feed = self.feeds.get(actor);
        if follows.is_none() && followers.is_none() && feed.is_none() {
            return Err(XrpcError::new(400, "InvalidRequest", "Profile not found").into());
        }

        Ok(ProfileView {
            followers_count: Some(followers.map_or(0, Vec::len) as u64),
            follows_count: Some(follows.map_or(0, Vec::len) as u64),
            posts_count: Some(feed.map_or(0, Vec::len) as u64),
            ..profile(actor)
        })
    }

    async fn get_author_feed(
        &self,
        actor: &str,
        limit: u32,
        cursor: Option<String>,
    ) -> atproto_client::Result<Page<FeedViewPost>> {
        self.enter(actor)?;
        let feed = self.feeds.get(actor).map(Vec::as_slice).unwrap_or_default();
        Ok(page(feed, limit, cursor))
    }
}
