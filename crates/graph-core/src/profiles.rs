//! Profile summaries and follow sets

use atproto_client::graph::ProfileView;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::{self, BTreeMap};

/// Flattened profile as served to callers and stored in the cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSummary {
    /// Stable account identifier
    pub did: String,
    /// Handle at fetch time
    pub handle: String,
    /// Avatar URL
    pub avatar: Option<String>,
    /// Display name
    pub display_name: Option<String>,
    /// Bio
    pub description: Option<String>,
    /// Account creation timestamp
    pub created_at: Option<String>,
    /// Follower count (detailed profiles only)
    pub followers_count: Option<u64>,
    /// Follow count (detailed profiles only)
    pub follows_count: Option<u64>,
    /// Post count (detailed profiles only)
    pub posts_count: Option<u64>,
    /// URI of the viewer's block record
    pub viewer_blocking: Option<String>,
    /// Whether the account blocks the viewer
    pub viewer_blocked_by: Option<bool>,
    /// List through which the viewer blocks the account
    pub viewer_blocking_by_list: Option<serde_json::Value>,
    /// URI of the account's follow of the viewer
    pub viewer_followed_by: Option<String>,
}

impl From<ProfileView> for ProfileSummary {
    fn from(profile: ProfileView) -> Self {
        let viewer = profile.viewer.unwrap_or_default();
        Self {
            did: profile.did,
            handle: profile.handle,
            avatar: profile.avatar,
            display_name: profile.display_name,
            description: profile.description,
            created_at: profile.created_at,
            followers_count: profile.followers_count,
            follows_count: profile.follows_count,
            posts_count: profile.posts_count,
            viewer_blocking: viewer.blocking,
            viewer_blocked_by: viewer.blocked_by,
            viewer_blocking_by_list: viewer.blocking_by_list,
            viewer_followed_by: viewer.followed_by,
        }
    }
}

/// One account's followers or follows, keyed by DID
///
/// Listings can repeat an account across pages; the set keeps the first
/// occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FollowSet(BTreeMap<String, ProfileSummary>);

impl FollowSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from profiles, deduplicating by DID
    pub fn from_profiles(profiles: impl IntoIterator<Item = ProfileSummary>) -> Self {
        let mut map = BTreeMap::new();
        for profile in profiles {
            map.entry(profile.did.clone()).or_insert(profile);
        }
        Self(map)
    }

    /// Members of `self` whose DID is also in `other`
    pub fn intersection(&self, other: &FollowSet) -> FollowSet {
        Self(
            self.0
                .iter()
                .filter(|(did, _)| other.contains(did))
                .map(|(did, profile)| (did.clone(), profile.clone()))
                .collect(),
        )
    }

    /// Whether the DID is a member
    pub fn contains(&self, did: &str) -> bool {
        self.0.contains_key(did)
    }

    /// Look up a member
    pub fn get(&self, did: &str) -> Option<&ProfileSummary> {
        self.0.get(did)
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over DID/profile pairs in DID order
    pub fn iter(&self) -> btree_map::Iter<'_, String, ProfileSummary> {
        self.0.iter()
    }

    /// Member handles, sorted
    pub fn handles(&self) -> Vec<String> {
        let mut handles: Vec<String> = self.0.values().map(|p| p.handle.clone()).collect();
        handles.sort();
        handles
    }
}

impl FromIterator<ProfileSummary> for FollowSet {
    fn from_iter<I: IntoIterator<Item = ProfileSummary>>(iter: I) -> Self {
        Self::from_profiles(iter)
    }
}
