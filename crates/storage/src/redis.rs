//! Redis cache backend
//!
//! Shared backend for deployments that run more than one process. Entries are
//! plain string values with a native `EX` expiry.

use async_trait::async_trait;
use fred::clients::Pool;
use fred::prelude::*;
use fred::types::scan::ScanType;
use fred::types::{Builder, Expiration};
use std::time::Duration;

use crate::cache::{self, CacheBackend, CacheError};

const SCAN_PAGE_SIZE: u32 = 250;

/// Redis connection configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Connection URL, e.g. `redis://localhost:6379`
    pub url: String,
    /// Pool size
    pub max_clients: usize,
    /// Connect and command timeout
    pub timeout: Duration,
}

impl RedisConfig {
    /// Create a configuration for a URL
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), max_clients: 4, timeout: Duration::from_secs(5) }
    }

    /// Set the pool size
    pub fn max_clients(mut self, max_clients: usize) -> Self {
        self.max_clients = max_clients;
        self
    }
}

fn backend_error(err: impl std::fmt::Display) -> CacheError {
    CacheError::Backend(err.to_string())
}

/// Escape glob metacharacters so a suffix matches literally in `SCAN MATCH`
fn suffix_pattern(suffix: &str) -> String {
    let mut pattern = String::with_capacity(suffix.len() + 1);
    pattern.push('*');
    for c in suffix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern
}

/// Redis-backed [`CacheBackend`]
pub struct RedisBackend {
    pool: Pool,
}

impl RedisBackend {
    /// Connect a pool and wait until every client is ready
    pub async fn connect(config: &RedisConfig) -> cache::Result<Self> {
        let redis_config = Config::from_url(&config.url).map_err(backend_error)?;
        let timeout = config.timeout;

        let pool = Builder::from_config(redis_config)
            .with_connection_config(|cfg| {
                cfg.connection_timeout = timeout;
                cfg.internal_command_timeout = timeout;
                cfg.max_command_attempts = 3;
            })
            .set_policy(ReconnectPolicy::new_exponential(0, 100, 1000, 2))
            .build_pool(config.max_clients.max(1))
            .map_err(backend_error)?;

        pool.init().await.map_err(backend_error)?;
        pool.wait_for_connect().await.map_err(backend_error)?;

        tracing::info!(url = %config.url, clients = config.max_clients, "connected to redis");
        Ok(Self { pool })
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> cache::Result<Option<String>> {
        self.pool.get::<Option<String>, _>(key).await.map_err(backend_error)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> cache::Result<()> {
        let expiration = Expiration::EX(ttl.as_secs().max(1) as i64);
        self.pool
            .set::<(), _, _>(key, value, Some(expiration), None, false)
            .await
            .map_err(backend_error)
    }

    async fn delete_by_suffix(&self, suffix: &str) -> cache::Result<usize> {
        if suffix.is_empty() {
            return Err(CacheError::EmptySuffix);
        }

        let pattern = suffix_pattern(suffix);
        let mut cursor = "0".to_string();
        let mut deleted = 0usize;

        loop {
            let (next_cursor, keys): (String, Vec<String>) = self
                .pool
                .scan_page::<(String, Vec<String>), String, String>(
                    cursor,
                    pattern.clone(),
                    Some(SCAN_PAGE_SIZE),
                    None::<ScanType>,
                )
                .await
                .map_err(backend_error)?;

            if !keys.is_empty() {
                let removed = self.pool.del::<i64, _>(keys).await.map_err(backend_error)?;
                deleted += removed.max(0) as usize;
            }

            if next_cursor == "0" {
                break;
            }
            cursor = next_cursor;
        }

        Ok(deleted)
    }
}
