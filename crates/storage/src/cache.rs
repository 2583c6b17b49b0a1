//! Memoizing cache
//!
//! [`CacheStore`] is the single "don't repeat expensive work" primitive: every
//! remote graph query is wrapped in [`CacheStore::get_or_compute`]. Values are
//! stored as JSON under `"{namespace}-{discriminator}"` with a fixed TTL.
//!
//! # Consistency
//!
//! There is no locking. Two concurrent misses on the same key both run their
//! compute closure and both write; the last write wins. With a shared backend
//! (Redis) this race is real across processes, and it is just as real inside a
//! single process on the sled backend. Computations are expected to be
//! idempotent, so the duplicate work is the only cost.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::kv::KvError;

/// TTL applied to every cache entry (one day)
pub const DEFAULT_TTL: Duration = Duration::from_secs(86_400);

/// Cache error types
#[derive(Debug, Error)]
pub enum CacheError {
    /// Backend unreachable or command failed
    #[error("Backend error: {0}")]
    Backend(String),

    /// A stored value could not be decoded
    #[error("Corrupt cache entry {key}: {source}")]
    Corrupt {
        /// Full cache key
        key: String,
        /// Decode failure
        source: serde_json::Error,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Suffix would match every key
    #[error("Refusing to delete keys for an empty suffix")]
    EmptySuffix,

    /// KV store error
    #[error("KV store error: {0}")]
    Kv(#[from] KvError),
}

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Raw string store the cache sits on
///
/// Implementations hold serialized JSON and honour the TTL given on write.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Read a value; `None` when absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value with an expiry
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Delete every key ending in `suffix`, returning how many were removed
    async fn delete_by_suffix(&self, suffix: &str) -> Result<usize>;
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL for entries
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl: DEFAULT_TTL }
    }
}

impl CacheConfig {
    /// Create a new cache configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entry TTL
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Memoizing cache over an injected backend
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    config: CacheConfig,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore").field("config", &self.config).finish_non_exhaustive()
    }
}

impl CacheStore {
    /// Create a cache over a backend
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        Self { backend, config }
    }

    /// Create a cache with the default one-day TTL
    pub fn with_backend(backend: Arc<dyn CacheBackend>) -> Self {
        Self::new(backend, CacheConfig::default())
    }

    /// Build the cache key for a namespace and discriminator
    pub fn key(namespace: &str, discriminator: &str) -> String {
        format!("{}-{}", namespace, discriminator)
    }

    /// The backend this cache writes through to
    pub fn backend(&self) -> Arc<dyn CacheBackend> {
        Arc::clone(&self.backend)
    }

    /// The configured entry TTL
    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }

    /// Return the cached value for the key, or compute, store and return it
    ///
    /// - A hit never invokes `compute`.
    /// - A backend read failure is logged and treated as a miss.
    /// - A failing write-back is logged; the computed value is still returned.
    /// - An error from `compute` propagates untouched and nothing is written.
    /// - A stored value that does not decode as `T`, or a backend record
    ///   that does not decode at all, is returned as [`CacheError::Corrupt`]
    ///   rather than recomputed.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        namespace: &str,
        discriminator: &str,
        compute: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let key = Self::key(namespace, discriminator);

        let cached = match self.backend.get(&key).await {
            Ok(cached) => cached,
            Err(err @ CacheError::Corrupt { .. }) => return Err(E::from(err)),
            Err(err) => {
                tracing::warn!(%key, %namespace, %discriminator, error = %err, "cache read failed");
                None
            }
        };

        if let Some(raw) = cached {
            tracing::debug!(%key, %namespace, %discriminator, "cache hit");
            return serde_json::from_str(&raw)
                .map_err(|source| E::from(CacheError::Corrupt { key, source }));
        }

        tracing::debug!(%key, %namespace, %discriminator, "cache miss");
        let value = compute().await?;

        match serde_json::to_string(&value) {
            Ok(raw) => {
                if let Err(err) = self.backend.set(&key, &raw, self.config.ttl).await {
                    tracing::warn!(%key, error = %err, "cache write failed");
                }
            }
            Err(err) => tracing::warn!(%key, error = %err, "cache value not serializable"),
        }

        Ok(value)
    }

    /// Delete every cache entry whose key ends with `suffix`
    pub async fn delete_by_suffix(&self, suffix: &str) -> Result<usize> {
        if suffix.is_empty() {
            return Err(CacheError::EmptySuffix);
        }

        let deleted = self.backend.delete_by_suffix(suffix).await?;
        tracing::info!(%suffix, deleted, "cache delete");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::KvStore;
    use mockall::mock;
    use mockall::predicate::eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    mock! {
        pub Backend {}

        #[async_trait]
        impl CacheBackend for Backend {
            async fn get(&self, key: &str) -> Result<Option<String>>;
            async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
            async fn delete_by_suffix(&self, suffix: &str) -> Result<usize>;
        }
    }

    fn kv_cache() -> CacheStore {
        CacheStore::with_backend(Arc::new(KvStore::in_memory().unwrap()))
    }

    #[test]
    fn test_key_format() {
        assert_eq!(
            CacheStore::key("bsky.get-followers", "alice.test"),
            "bsky.get-followers-alice.test"
        );
    }

    #[tokio::test]
    async fn test_second_call_hits_without_compute() {
        let cache = kv_cache();
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let first: Vec<String> = cache
            .get_or_compute("ns", "alice", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, CacheError>(vec!["bob".to_string(), "carol".to_string()])
            })
            .await
            .unwrap();
        let second: Vec<String> = cache
            .get_or_compute("ns", "alice", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, CacheError>(vec![])
            })
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_compute_error_propagates_and_is_not_cached() {
        #[derive(Debug)]
        enum TestError {
            Remote,
            Cache,
        }
        impl From<CacheError> for TestError {
            fn from(_: CacheError) -> Self {
                TestError::Cache
            }
        }

        let cache = kv_cache();

        let result: std::result::Result<u32, TestError> =
            cache.get_or_compute("ns", "k", || async { Err(TestError::Remote) }).await;
        assert!(matches!(result, Err(TestError::Remote)));

        let value: std::result::Result<u32, TestError> =
            cache.get_or_compute("ns", "k", || async { Ok(7) }).await;
        assert_eq!(value.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_backend_read_failure_degrades_to_compute() {
        let mut backend = MockBackend::new();
        backend
            .expect_get()
            .times(1)
            .returning(|_| Err(CacheError::Backend("connection refused".to_string())));
        backend
            .expect_set()
            .with(eq("ns-k"), eq("42"), eq(DEFAULT_TTL))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let cache = CacheStore::with_backend(Arc::new(backend));
        let value: u32 = cache
            .get_or_compute("ns", "k", || async { Ok::<_, CacheError>(42) })
            .await
            .unwrap();

        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_write_failure_still_returns_value() {
        let mut backend = MockBackend::new();
        backend.expect_get().times(1).returning(|_| Ok(None));
        backend
            .expect_set()
            .times(1)
            .returning(|_, _, _| Err(CacheError::Backend("read only replica".to_string())));

        let cache = CacheStore::with_backend(Arc::new(backend));
        let value: String = cache
            .get_or_compute("ns", "k", || async { Ok::<_, CacheError>("fresh".to_string()) })
            .await
            .unwrap();

        assert_eq!(value, "fresh");
    }

    #[tokio::test]
    async fn test_hit_reads_once_and_never_writes() {
        let mut backend = MockBackend::new();
        backend
            .expect_get()
            .with(eq("ns-k"))
            .times(1)
            .returning(|_| Ok(Some("[1,2,3]".to_string())));
        backend.expect_set().never();

        let cache = CacheStore::with_backend(Arc::new(backend));
        let value: Vec<u8> = cache
            .get_or_compute("ns", "k", || async {
                Err::<Vec<u8>, _>(CacheError::Backend("compute ran on a hit".to_string()))
            })
            .await
            .unwrap();

        assert_eq!(value, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_an_error_not_a_miss() {
        let mut backend = MockBackend::new();
        backend
            .expect_get()
            .returning(|_| Ok(Some("{not json".to_string())));
        backend.expect_set().never();

        let cache = CacheStore::with_backend(Arc::new(backend));
        let result: Result<Vec<String>> = cache
            .get_or_compute("ns", "k", || async { Ok(vec![]) })
            .await;

        match result {
            Err(CacheError::Corrupt { key, .. }) => assert_eq!(key, "ns-k"),
            other => panic!("expected corrupt entry error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_corrupt_sled_record_is_not_recomputed() {
        let kv = KvStore::in_memory().unwrap();
        kv.set("ns-k", &"garbage").unwrap();
        let cache = CacheStore::with_backend(Arc::new(kv.clone()));
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let result: Result<u32> = cache
            .get_or_compute("ns", "k", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            })
            .await;

        assert!(matches!(result, Err(CacheError::Corrupt { ref key, .. }) if key == "ns-k"));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        let stored: Option<String> = kv.get("ns-k").unwrap();
        assert_eq!(stored.as_deref(), Some("garbage"));
    }

    #[tokio::test]
    async fn test_delete_by_suffix() {
        let cache = kv_cache();
        for ns in ["bsky.get-followers", "bsky.get-following"] {
            let _: u8 = cache
                .get_or_compute(ns, "alice.test", || async { Ok::<_, CacheError>(1) })
                .await
                .unwrap();
        }
        let _: u8 = cache
            .get_or_compute("bsky.get-followers", "bob.test", || async { Ok::<_, CacheError>(1) })
            .await
            .unwrap();

        assert_eq!(cache.delete_by_suffix("alice.test").await.unwrap(), 2);
        assert_eq!(cache.delete_by_suffix("alice.test").await.unwrap(), 0);
        assert!(matches!(cache.delete_by_suffix("").await, Err(CacheError::EmptySuffix)));

        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let _: u8 = cache
            .get_or_compute("bsky.get-followers", "bob.test", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, CacheError>(1)
            })
            .await
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
