//! Core AT Protocol types

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Handle sentinel the AppView reports for accounts whose handle no longer resolves
pub const INVALID_HANDLE: &str = "handle.invalid";

/// Handle (username), always stored in normalized form
///
/// Normalization strips every character outside `[A-Za-z0-9._-]`, trims, and
/// lower-cases, so two handles are equal iff their normalized forms match.
///
/// # Examples
/// ```
/// use atproto_client::Handle;
///
/// let handle = Handle::new("Alice_123!!");
/// assert_eq!(handle.as_str(), "alice_123");
/// assert_eq!(handle, Handle::new("ALICE_123"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Handle(String);

impl Handle {
    /// Create a handle from raw user input
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(Self::scrub(raw.as_ref()))
    }

    /// Normalize a raw handle string
    pub fn scrub(raw: &str) -> String {
        static DISALLOWED: OnceLock<Regex> = OnceLock::new();
        let disallowed = DISALLOWED.get_or_init(|| Regex::new(r"[^a-zA-Z0-9._-]").unwrap());

        disallowed.replace_all(raw, "").trim().to_lowercase()
    }

    /// Get the normalized handle
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the handle is empty or the invalid sentinel
    pub fn is_invalid(&self) -> bool {
        self.0.is_empty() || self.0 == INVALID_HANDLE
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Handle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Handle {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for Handle {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<Handle> for String {
    fn from(handle: Handle) -> Self {
        handle.0
    }
}
