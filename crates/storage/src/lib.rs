//! Storage layer for Graph Compass
//!
//! This crate provides the memoizing cache every graph query goes through,
//! the backends it can sit on (a local sled key-value store or a shared Redis),
//! and the task store that tracks background jobs.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod kv;
pub mod redis;
pub mod tasks;

pub use cache::{CacheBackend, CacheConfig, CacheError, CacheStore, DEFAULT_TTL};
pub use kv::{KvConfig, KvError, KvStore};
pub use redis::{RedisBackend, RedisConfig};
pub use tasks::{AsyncTaskRecord, TaskEntry, TaskError, TaskStatus, TaskStore};
