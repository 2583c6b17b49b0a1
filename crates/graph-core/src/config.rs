//! Graph traversal limits
//!
//! All page sizes and bounds are configuration; nothing downstream hard-codes
//! them. Defaults match the public AppView limits.

use atproto_client::graph::MAX_PAGE_LIMIT;
use atproto_client::types::INVALID_HANDLE;

/// Window over a locally sorted following list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    /// Members examined per call
    pub page_size: usize,
    /// Number of windows before the walk reports exhaustion
    pub max_pages: usize,
}

impl WindowConfig {
    /// Create a window configuration
    pub fn new(page_size: usize, max_pages: usize) -> Self {
        Self { page_size, max_pages }
    }

    /// A single window covering any list
    pub fn unbounded() -> Self {
        Self { page_size: usize::MAX, max_pages: 1 }
    }

    /// First index that is never examined
    pub fn bound(&self) -> usize {
        self.page_size.saturating_mul(self.max_pages)
    }
}

/// Graph configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphConfig {
    /// Page size for follower/follow listings
    pub follows_page_size: u32,
    /// Maximum listing pages fetched per account
    pub max_follows_pages: usize,
    /// Page size for author feeds
    pub feed_page_size: u32,
    /// Popularity window
    pub popularity: WindowConfig,
    /// Suggestions window
    pub suggestions: WindowConfig,
    /// Handle the AppView reports for unresolvable accounts
    pub invalid_handle: String,
    /// Accounts never counted or suggested
    pub excluded_handles: Vec<String>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            follows_page_size: MAX_PAGE_LIMIT,
            max_follows_pages: 25,
            feed_page_size: MAX_PAGE_LIMIT,
            popularity: WindowConfig::new(50, 50),
            suggestions: WindowConfig::new(10, 10),
            invalid_handle: INVALID_HANDLE.to_string(),
            excluded_handles: vec!["bsky.app".to_string()],
        }
    }
}

impl GraphConfig {
    /// Create a default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `COMPASS_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `COMPASS_*` name
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        override_from(&lookup, "COMPASS_FOLLOWS_PAGE_SIZE", &mut config.follows_page_size);
        override_from(&lookup, "COMPASS_MAX_FOLLOWS_PAGES", &mut config.max_follows_pages);
        override_from(&lookup, "COMPASS_FEED_PAGE_SIZE", &mut config.feed_page_size);
        override_from(&lookup, "COMPASS_POPULARITY_PAGE_SIZE", &mut config.popularity.page_size);
        override_from(&lookup, "COMPASS_POPULARITY_MAX_PAGES", &mut config.popularity.max_pages);
        override_from(&lookup, "COMPASS_SUGGESTIONS_PAGE_SIZE", &mut config.suggestions.page_size);
        override_from(&lookup, "COMPASS_SUGGESTIONS_MAX_PAGES", &mut config.suggestions.max_pages);

        if let Some(list) = lookup("COMPASS_EXCLUDED_HANDLES") {
            config.excluded_handles = list
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_lowercase)
                .collect();
        }

        config
    }

    /// Set the popularity window
    pub fn with_popularity(mut self, window: WindowConfig) -> Self {
        self.popularity = window;
        self
    }

    /// Set the suggestions window
    pub fn with_suggestions(mut self, window: WindowConfig) -> Self {
        self.suggestions = window;
        self
    }

    /// Set the listing page size and page bound
    pub fn with_follows_paging(mut self, page_size: u32, max_pages: usize) -> Self {
        self.follows_page_size = page_size;
        self.max_follows_pages = max_pages;
        self
    }

    /// Set the excluded accounts
    pub fn with_excluded_handles(mut self, handles: Vec<String>) -> Self {
        self.excluded_handles = handles;
        self
    }

    /// Whether a followee handle is never counted or suggested
    pub fn is_ignored(&self, handle: &str) -> bool {
        handle.is_empty()
            || handle == self.invalid_handle
            || self.excluded_handles.iter().any(|h| h == handle)
    }
}

fn override_from<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    target: &mut T,
) {
    let Some(raw) = lookup(name) else {
        return;
    };

    match raw.trim().parse() {
        Ok(value) => *target = value,
        Err(_) => tracing::warn!(%name, value = %raw, "ignoring invalid configuration value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = GraphConfig::default();
        assert_eq!(config.follows_page_size, 100);
        assert_eq!(config.max_follows_pages, 25);
        assert_eq!(config.popularity.bound(), 2500);
        assert_eq!(config.suggestions.bound(), 100);
        assert!(config.is_ignored("handle.invalid"));
        assert!(config.is_ignored("bsky.app"));
        assert!(config.is_ignored(""));
        assert!(!config.is_ignored("alice.test"));
    }

    #[test]
    fn test_from_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            ("COMPASS_SUGGESTIONS_PAGE_SIZE", "5"),
            ("COMPASS_MAX_FOLLOWS_PAGES", "not a number"),
            ("COMPASS_EXCLUDED_HANDLES", "bsky.app, Team.Test ,"),
        ]
        .into_iter()
        .collect();

        let config = GraphConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.suggestions, WindowConfig::new(5, 10));
        assert_eq!(config.max_follows_pages, 25);
        assert_eq!(config.excluded_handles, vec!["bsky.app", "team.test"]);
    }

    #[test]
    fn test_unbounded_window() {
        assert_eq!(WindowConfig::unbounded().bound(), usize::MAX);
    }
}
