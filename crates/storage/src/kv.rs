//! Key-value store backed by sled
//!
//! The embedded cache backend. Every entry carries its own expiry; expired
//! entries read as absent and are removed lazily on access or in bulk by
//! [`KvStore::purge_expired`].

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sled::Db;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;

use crate::cache::{self, CacheBackend, CacheError};

/// Key-value store error types
#[derive(Debug, Error)]
pub enum KvError {
    /// Sled database error
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for key-value operations
pub type Result<T> = std::result::Result<T, KvError>;

/// Key-value store configuration
#[derive(Debug, Clone)]
pub struct KvConfig {
    /// Database path
    pub path: String,
    /// Cache capacity in bytes
    pub cache_capacity: u64,
    /// Enable compression
    pub use_compression: bool,
    /// Flush interval in milliseconds (None for immediate flush)
    pub flush_every_ms: Option<u64>,
    /// Drop expired entries when the store is opened
    pub purge_on_open: bool,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            path: "compass_cache.db".to_string(),
            cache_capacity: 64 * 1024 * 1024, // 64MB
            use_compression: true,
            flush_every_ms: Some(500),
            purge_on_open: true,
        }
    }
}

impl KvConfig {
    /// Create a new configuration with a custom path
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), ..Default::default() }
    }

    /// Set cache capacity in bytes
    pub fn cache_capacity(mut self, bytes: u64) -> Self {
        self.cache_capacity = bytes;
        self
    }

    /// Enable or disable compression
    pub fn use_compression(mut self, enabled: bool) -> Self {
        self.use_compression = enabled;
        self
    }

    /// Set flush interval in milliseconds
    pub fn flush_every_ms(mut self, ms: Option<u64>) -> Self {
        self.flush_every_ms = ms;
        self
    }

    /// Enable or disable purging expired entries on open
    pub fn purge_on_open(mut self, enabled: bool) -> Self {
        self.purge_on_open = enabled;
        self
    }
}

/// A value with its write time and expiry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry {
    /// Serialized payload
    pub value: String,
    /// When the entry was written
    pub created_at: SystemTime,
    /// When the entry stops being readable
    pub expires_at: SystemTime,
}

impl StoredEntry {
    fn new(value: impl Into<String>, ttl: Duration) -> Self {
        let created_at = SystemTime::now();
        Self { value: value.into(), created_at, expires_at: created_at + ttl }
    }

    /// Whether the entry has passed its expiry
    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_at
    }
}

/// Key-value store implementation
#[derive(Clone)]
pub struct KvStore {
    db: Arc<Db>,
}

impl KvStore {
    /// Create a new key-value store with configuration
    pub fn new(config: KvConfig) -> Result<Self> {
        let mut db_config = sled::Config::new()
            .path(&config.path)
            .cache_capacity(config.cache_capacity)
            .use_compression(config.use_compression);

        if let Some(ms) = config.flush_every_ms {
            db_config = db_config.flush_every_ms(Some(ms));
        }

        let db = db_config.open()?;
        tracing::debug!(path = %config.path, "opened kv store");
        let store = Self { db: Arc::new(db) };

        if config.purge_on_open {
            let removed = store.purge_expired()?;
            if removed > 0 {
                tracing::info!(path = %config.path, removed, "purged expired entries");
            }
        }

        Ok(store)
    }

    /// Create an in-memory key-value store (for testing)
    pub fn in_memory() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Get a value by key
    pub fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        match self.db.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Set a value by key
    pub fn set<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        let bytes = serde_json::to_vec(value)?;
        self.db.insert(key.as_bytes(), bytes)?;
        Ok(())
    }

    /// Remove a value by key
    pub fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.db.remove(key.as_bytes())?.is_some())
    }

    /// All keys ending with `suffix`
    ///
    /// sled orders keys lexicographically, so a suffix match is a full scan.
    pub fn keys_with_suffix(&self, suffix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();

        for key in self.db.iter().keys() {
            let key = key?;
            if key.ends_with(suffix.as_bytes()) {
                if let Ok(key_str) = String::from_utf8(key.to_vec()) {
                    keys.push(key_str);
                }
            }
        }

        Ok(keys)
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> Result<usize> {
        let mut removed = 0;

        for item in self.db.iter() {
            let (key, bytes) = item?;
            let expired = match serde_json::from_slice::<StoredEntry>(&bytes) {
                Ok(entry) => entry.is_expired(),
                Err(_) => false,
            };
            if expired && self.db.remove(&key)?.is_some() {
                removed += 1;
            }
        }

        Ok(removed)
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Get the number of keys in the store
    pub fn len(&self) -> usize {
        self.db.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }
}

#[async_trait]
impl CacheBackend for KvStore {
    async fn get(&self, key: &str) -> cache::Result<Option<String>> {
        let Some(bytes) = self.db.get(key.as_bytes()).map_err(KvError::from)? else {
            return Ok(None);
        };
        let entry: StoredEntry = serde_json::from_slice(&bytes)
            .map_err(|source| CacheError::Corrupt { key: key.to_string(), source })?;

        if entry.is_expired() {
            tracing::debug!(%key, "dropping expired entry");
            self.remove(key)?;
            return Ok(None);
        }

        Ok(Some(entry.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> cache::Result<()> {
        KvStore::set(self, key, &StoredEntry::new(value, ttl))?;
        Ok(())
    }

    async fn delete_by_suffix(&self, suffix: &str) -> cache::Result<usize> {
        if suffix.is_empty() {
            return Err(CacheError::EmptySuffix);
        }

        let mut count = 0;
        for key in self.keys_with_suffix(suffix)? {
            if self.remove(&key)? {
                count += 1;
            }
        }
        Ok(count)
    }
}
