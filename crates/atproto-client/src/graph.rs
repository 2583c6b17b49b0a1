//! Social graph and feed queries
//!
//! The [`GraphApi`] trait is the seam the aggregation engine is written
//! against: four cursor-paginated (or single-shot) read calls. [`XrpcGraphApi`]
//! implements it over XRPC; tests substitute their own implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::INVALID_HANDLE;
use crate::xrpc::{XrpcClient, XrpcClientConfig, XrpcRequest};
use crate::{Error, Result};

/// Largest page the AppView accepts for follows, followers and feeds
pub const MAX_PAGE_LIMIT: u32 = 100;

// ============================================================================
// Response Types
// ============================================================================

/// Viewer state for a profile, relative to the requesting account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ViewerState {
    /// Whether the viewer is muting this profile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
    /// URI of the viewer's block record, if blocking
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocking: Option<String>,
    /// Whether this profile is blocking the viewer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<bool>,
    /// Moderation list through which the viewer blocks this profile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocking_by_list: Option<serde_json::Value>,
    /// URI of the viewer's follow record, if following
    #[serde(skip_serializing_if = "Option::is_none")]
    pub following: Option<String>,
    /// URI of this profile's follow record, if followed by this profile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub followed_by: Option<String>,
}

impl ViewerState {
    /// Whether a block exists in either direction
    pub fn is_blocked(&self) -> bool {
        self.blocking.is_some()
            || self.blocked_by == Some(true)
            || self.blocking_by_list.is_some()
    }
}

/// Profile view as returned by follower/follow listings and profile lookups
///
/// The detailed variant (`getProfile`) carries the count fields; listings leave
/// them out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    /// DID (stable identifier)
    pub did: String,
    /// Handle
    pub handle: String,
    /// Display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Profile description/bio
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Avatar image URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Banner image URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
    /// Followers count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub followers_count: Option<u64>,
    /// Follows count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follows_count: Option<u64>,
    /// Posts count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posts_count: Option<u64>,
    /// Created at timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Indexed at timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<String>,
    /// Viewer state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewer: Option<ViewerState>,
}

impl ProfileView {
    /// Whether the profile should be dropped from graph listings
    ///
    /// Hidden profiles carry the invalid handle sentinel or a block in either
    /// direction.
    pub fn is_hidden(&self) -> bool {
        self.handle == INVALID_HANDLE || self.viewer.as_ref().is_some_and(ViewerState::is_blocked)
    }
}

/// Post record body; only the text is read here
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    /// Post text
    #[serde(default)]
    pub text: String,
    /// Creation timestamp claimed by the author
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Post view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    /// AT URI of the post
    pub uri: String,
    /// CID of the post record
    pub cid: String,
    /// Post author
    pub author: ProfileView,
    /// Post record
    #[serde(default)]
    pub record: PostRecord,
    /// Reply count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_count: Option<u64>,
    /// Repost count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repost_count: Option<u64>,
    /// Like count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub like_count: Option<u64>,
    /// Quote count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_count: Option<u64>,
    /// Indexed at timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<String>,
}

/// Feed item: a post plus the reason it appears in the feed (e.g. a repost)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedViewPost {
    /// The post
    pub post: PostView,
    /// Reason for inclusion (repost, pin)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<serde_json::Value>,
}

/// One page of a cursor-paginated listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Cursor for the next page; `None` when there are no more pages
    pub cursor: Option<String>,
}

impl<T> Page<T> {
    /// Build a page, treating an empty cursor as the end of the listing
    pub fn new(items: Vec<T>, cursor: Option<String>) -> Self {
        Self {
            items,
            cursor: cursor.filter(|c| !c.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GetFollowersResponse {
    followers: Vec<ProfileView>,
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GetFollowsResponse {
    follows: Vec<ProfileView>,
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GetAuthorFeedResponse {
    feed: Vec<FeedViewPost>,
    #[serde(default)]
    cursor: Option<String>,
}

// ============================================================================
// Graph API
// ============================================================================

/// Remote social-graph listing service
///
/// Cursors are opaque: pass back exactly what the previous page returned.
#[async_trait]
pub trait GraphApi: Send + Sync {
    /// One page of accounts following `actor`
    async fn get_followers(
        &self,
        actor: &str,
        limit: u32,
        cursor: Option<String>,
    ) -> Result<Page<ProfileView>>;

    /// One page of accounts `actor` follows
    async fn get_follows(
        &self,
        actor: &str,
        limit: u32,
        cursor: Option<String>,
    ) -> Result<Page<ProfileView>>;

    /// Detailed profile for `actor`
    async fn get_profile(&self, actor: &str) -> Result<ProfileView>;

    /// One page of posts authored (or reposted) by `actor`
    async fn get_author_feed(
        &self,
        actor: &str,
        limit: u32,
        cursor: Option<String>,
    ) -> Result<Page<FeedViewPost>>;
}

/// [`GraphApi`] over XRPC
///
/// # Example
///
/// ```rust,no_run
/// use atproto_client::{GraphApi, XrpcGraphApi};
/// use atproto_client::xrpc::XrpcClientConfig;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let api = XrpcGraphApi::new(XrpcClientConfig::default())?;
///
///     let page = api.get_followers("bsky.app", 100, None).await?;
///     println!("{} followers on the first page", page.items.len());
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct XrpcGraphApi {
    client: XrpcClient,
}

impl XrpcGraphApi {
    /// Create a graph API client from an XRPC configuration
    pub fn new(config: XrpcClientConfig) -> Result<Self> {
        Ok(Self {
            client: XrpcClient::new(config)?,
        })
    }

    /// Wrap an existing XRPC client
    pub fn with_client(client: XrpcClient) -> Self {
        Self { client }
    }

    fn listing(nsid: &str, actor: &str, limit: u32, cursor: Option<String>) -> Result<XrpcRequest> {
        if actor.is_empty() {
            return Err(Error::InvalidInput("Actor cannot be empty".to_string()));
        }

        Ok(XrpcRequest::query(nsid)
            .param("actor", actor)
            .param("limit", limit.clamp(1, MAX_PAGE_LIMIT).to_string())
            .param_opt("cursor", cursor.filter(|c| !c.is_empty())))
    }
}

#[async_trait]
impl GraphApi for XrpcGraphApi {
    async fn get_followers(
        &self,
        actor: &str,
        limit: u32,
        cursor: Option<String>,
    ) -> Result<Page<ProfileView>> {
        let request = Self::listing("app.bsky.graph.getFollowers", actor, limit, cursor)?;
        let response = self.client.query::<GetFollowersResponse>(request).await?;
        Ok(Page::new(response.data.followers, response.data.cursor))
    }

    async fn get_follows(
        &self,
        actor: &str,
        limit: u32,
        cursor: Option<String>,
    ) -> Result<Page<ProfileView>> {
        let request = Self::listing("app.bsky.graph.getFollows", actor, limit, cursor)?;
        let response = self.client.query::<GetFollowsResponse>(request).await?;
        Ok(Page::new(response.data.follows, response.data.cursor))
    }

    async fn get_profile(&self, actor: &str) -> Result<ProfileView> {
        if actor.is_empty() {
            return Err(Error::InvalidInput("Actor cannot be empty".to_string()));
        }

        let request = XrpcRequest::query("app.bsky.actor.getProfile").param("actor", actor);
        let response = self.client.query::<ProfileView>(request).await?;
        Ok(response.data)
    }

    async fn get_author_feed(
        &self,
        actor: &str,
        limit: u32,
        cursor: Option<String>,
    ) -> Result<Page<FeedViewPost>> {
        let request = Self::listing("app.bsky.feed.getAuthorFeed", actor, limit, cursor)?;
        let response = self.client.query::<GetAuthorFeedResponse>(request).await?;
        Ok(Page::new(response.data.feed, response.data.cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(handle: &str, viewer: Option<ViewerState>) -> ProfileView {
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
            viewer,
        }
    }

    #[test]
    fn test_profile_view_deserialize_listing_entry() {
        let json = r#"{
            "did": "did:plc:alice",
            "handle": "alice.test",
            "displayName": "Alice",
            "createdAt": "2023-04-01T00:00:00.000Z",
            "viewer": {"muted": false, "blockedBy": false}
        }"#;

        let profile: ProfileView = serde_json::from_str(json).unwrap();
        assert_eq!(profile.did, "did:plc:alice");
        assert_eq!(profile.display_name.as_deref(), Some("Alice"));
        assert_eq!(profile.followers_count, None);
        assert!(!profile.is_hidden());
    }

    #[test]
    fn test_hidden_profiles() {
        assert!(profile(INVALID_HANDLE, None).is_hidden());

        let blocking = ViewerState {
            blocking: Some("at://did:plc:me/app.bsky.graph.block/1".to_string()),
            ..Default::default()
        };
        assert!(profile("bob.test", Some(blocking)).is_hidden());

        let blocked_by = ViewerState { blocked_by: Some(true), ..Default::default() };
        assert!(profile("bob.test", Some(blocked_by)).is_hidden());

        let by_list = ViewerState {
            blocking_by_list: Some(serde_json::json!({"uri": "at://list"})),
            ..Default::default()
        };
        assert!(profile("bob.test", Some(by_list)).is_hidden());

        let followed = ViewerState {
            followed_by: Some("at://did:plc:bob/app.bsky.graph.follow/1".to_string()),
            blocked_by: Some(false),
            ..Default::default()
        };
        assert!(!profile("bob.test", Some(followed)).is_hidden());
    }

    #[test]
    fn test_page_empty_cursor_is_end() {
        let page: Page<u8> = Page::new(vec![1, 2], Some(String::new()));
        assert_eq!(page.cursor, None);

        let page: Page<u8> = Page::new(vec![], Some("abc".to_string()));
        assert_eq!(page.cursor.as_deref(), Some("abc"));
    }

    #[test]
    fn test_listing_rejects_empty_actor() {
        let result = XrpcGraphApi::listing("app.bsky.graph.getFollows", "", 100, None);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_listing_clamps_limit() {
        let request =
            XrpcGraphApi::listing("app.bsky.graph.getFollows", "alice.test", 500, Some("c1".into()))
                .unwrap();
        assert_eq!(request.get_param("limit"), Some("100"));
        assert_eq!(request.get_param("cursor"), Some("c1"));
    }

    #[test]
    fn test_feed_view_post_without_text() {
        let json = r#"{
            "post": {
                "uri": "at://did:plc:alice/app.bsky.feed.post/1",
                "cid": "bafy",
                "author": {"did": "did:plc:alice", "handle": "alice.test"},
                "record": {"$type": "app.bsky.feed.post", "createdAt": "2024-01-01T00:00:00Z"}
            }
        }"#;

        let item: FeedViewPost = serde_json::from_str(json).unwrap();
        assert_eq!(item.post.record.text, "");
        assert!(item.reason.is_none());
    }
}
