//! Background task records
//!
//! A task record moves `in_progress -> completed | failed` exactly once and is
//! never rewritten after that. Records live in the same backend as the cache,
//! under the same `"{namespace}-{discriminator}"` key scheme and TTL, so an
//! expired record simply lets the task be started again.
//!
//! As with the cache there is no locking: two callers that both see no record
//! may both create one and both launch a worker.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::cache::{CacheBackend, CacheError, CacheStore};

/// Task store error types
#[derive(Debug, Error)]
pub enum TaskError {
    /// Backend failure
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// A stored record could not be decoded
    #[error("Corrupt task record {key}: {source}")]
    Corrupt {
        /// Full task key
        key: String,
        /// Decode failure
        source: serde_json::Error,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for task operations
pub type Result<T> = std::result::Result<T, TaskError>;

/// Task lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Worker launched, no result yet
    InProgress,
    /// Finished with a result
    Completed,
    /// Finished with an error description
    Failed,
}

impl TaskStatus {
    /// Whether the status is final
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::InProgress)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Persisted task record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsyncTaskRecord {
    /// Full task key
    pub task_id: String,
    /// Lifecycle state
    pub task_status: TaskStatus,
    /// Result on completion, error message on failure
    pub task_data: Option<serde_json::Value>,
}

impl AsyncTaskRecord {
    fn in_progress(task_id: impl Into<String>) -> Self {
        Self { task_id: task_id.into(), task_status: TaskStatus::InProgress, task_data: None }
    }

    /// Whether the record has reached a final state
    pub fn is_terminal(&self) -> bool {
        self.task_status.is_terminal()
    }
}

/// Outcome of [`TaskStore::start_or_get`]
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEntry {
    /// No record existed; a fresh `in_progress` record was written and the
    /// caller owns launching the worker
    Created(AsyncTaskRecord),
    /// A record already existed and is returned as stored
    Existing(AsyncTaskRecord),
}

impl TaskEntry {
    /// The record, whichever way it was obtained
    pub fn record(&self) -> &AsyncTaskRecord {
        match self {
            TaskEntry::Created(record) | TaskEntry::Existing(record) => record,
        }
    }

    /// Consume into the record
    pub fn into_record(self) -> AsyncTaskRecord {
        match self {
            TaskEntry::Created(record) | TaskEntry::Existing(record) => record,
        }
    }

    /// Whether this call created the record
    pub fn is_created(&self) -> bool {
        matches!(self, TaskEntry::Created(_))
    }
}

/// Task state machine over a cache backend
#[derive(Clone)]
pub struct TaskStore {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskStore").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

impl TaskStore {
    /// Create a task store over a backend
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    /// Share the backend and TTL of an existing cache
    pub fn from_cache(cache: &CacheStore) -> Self {
        Self::new(cache.backend(), cache.ttl())
    }

    /// Read the record for a key, if any
    pub async fn get(&self, namespace: &str, discriminator: &str) -> Result<Option<AsyncTaskRecord>> {
        let key = CacheStore::key(namespace, discriminator);
        self.read(&key).await
    }

    /// Return the existing record, or create an `in_progress` one
    pub async fn start_or_get(&self, namespace: &str, discriminator: &str) -> Result<TaskEntry> {
        let key = CacheStore::key(namespace, discriminator);

        if let Some(record) = self.read(&key).await? {
            tracing::debug!(task_id = %key, status = %record.task_status, "task exists");
            return Ok(TaskEntry::Existing(record));
        }

        let record = AsyncTaskRecord::in_progress(&key);
        self.write(&record).await?;
        tracing::info!(task_id = %key, "task started");

        Ok(TaskEntry::Created(record))
    }

    /// Record a successful result
    pub async fn complete<T>(
        &self,
        namespace: &str,
        discriminator: &str,
        result: &T,
    ) -> Result<AsyncTaskRecord>
    where
        T: Serialize + ?Sized,
    {
        let data = serde_json::to_value(result)?;
        self.finish(namespace, discriminator, TaskStatus::Completed, data).await
    }

    /// Record a failure with a human-readable message
    pub async fn fail(
        &self,
        namespace: &str,
        discriminator: &str,
        error: impl fmt::Display,
    ) -> Result<AsyncTaskRecord> {
        let data = serde_json::Value::String(error.to_string());
        self.finish(namespace, discriminator, TaskStatus::Failed, data).await
    }

    async fn finish(
        &self,
        namespace: &str,
        discriminator: &str,
        status: TaskStatus,
        data: serde_json::Value,
    ) -> Result<AsyncTaskRecord> {
        let key = CacheStore::key(namespace, discriminator);

        if let Some(existing) = self.read(&key).await? {
            if existing.is_terminal() {
                tracing::warn!(
                    task_id = %key,
                    status = %existing.task_status,
                    attempted = %status,
                    "task already finished, ignoring"
                );
                return Ok(existing);
            }
        }

        let record = AsyncTaskRecord { task_id: key, task_status: status, task_data: Some(data) };
        self.write(&record).await?;

        match status {
            TaskStatus::Failed => tracing::warn!(task_id = %record.task_id, "task failed"),
            _ => tracing::info!(task_id = %record.task_id, "task completed"),
        }

        Ok(record)
    }

    async fn read(&self, key: &str) -> Result<Option<AsyncTaskRecord>> {
        match self.backend.get(key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| TaskError::Corrupt { key: key.to_string(), source }),
            None => Ok(None),
        }
    }

    async fn write(&self, record: &AsyncTaskRecord) -> Result<()> {
        let raw = serde_json::to_string(record)?;
        self.backend.set(&record.task_id, &raw, self.ttl).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::KvStore;
    use serde_json::json;

    fn store() -> TaskStore {
        let cache = CacheStore::with_backend(Arc::new(KvStore::in_memory().unwrap()));
        TaskStore::from_cache(&cache)
    }

    #[test]
    fn test_record_serialization() {
        let record = AsyncTaskRecord::in_progress("emoji-summary-alice.test");
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({
                "task_id": "emoji-summary-alice.test",
                "task_status": "in_progress",
                "task_data": null
            })
        );
    }

    #[tokio::test]
    async fn test_start_creates_then_returns_existing() {
        let tasks = store();

        let first = tasks.start_or_get("emoji-summary", "alice.test").await.unwrap();
        assert!(first.is_created());
        assert_eq!(first.record().task_id, "emoji-summary-alice.test");
        assert_eq!(first.record().task_status, TaskStatus::InProgress);
        assert_eq!(first.record().task_data, None);

        let second = tasks.start_or_get("emoji-summary", "alice.test").await.unwrap();
        assert!(!second.is_created());
        assert_eq!(second.record(), first.record());
    }

    #[tokio::test]
    async fn test_complete_is_visible_to_poll() {
        let tasks = store();
        tasks.start_or_get("emoji-summary", "alice.test").await.unwrap();

        let result = vec![("🐈", "cat", "my cat is great")];
        tasks.complete("emoji-summary", "alice.test", &result).await.unwrap();

        let entry = tasks.start_or_get("emoji-summary", "alice.test").await.unwrap();
        let TaskEntry::Existing(record) = entry else {
            panic!("completed task must not be recreated");
        };
        assert_eq!(record.task_status, TaskStatus::Completed);
        assert_eq!(record.task_data, Some(json!([["🐈", "cat", "my cat is great"]])));
    }

    #[tokio::test]
    async fn test_terminal_record_is_never_overwritten() {
        let tasks = store();
        tasks.start_or_get("emoji-summary", "bob.test").await.unwrap();

        tasks.fail("emoji-summary", "bob.test", "keyword service unavailable").await.unwrap();
        let after = tasks.complete("emoji-summary", "bob.test", &json!([])).await.unwrap();

        assert_eq!(after.task_status, TaskStatus::Failed);
        assert_eq!(after.task_data, Some(json!("keyword service unavailable")));

        let stored = tasks.get("emoji-summary", "bob.test").await.unwrap().unwrap();
        assert_eq!(stored, after);
    }

    #[tokio::test]
    async fn test_get_missing_record() {
        let tasks = store();
        assert!(tasks.get("emoji-summary", "nobody.test").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_an_error() {
        let backend = Arc::new(KvStore::in_memory().unwrap());
        backend
            .set("emoji-summary-x", &crate::kv::StoredEntry {
                value: "not json".to_string(),
                created_at: std::time::SystemTime::now(),
                expires_at: std::time::SystemTime::now() + Duration::from_secs(60),
            })
            .unwrap();
        let tasks = TaskStore::new(backend, Duration::from_secs(60));

        let err = tasks.start_or_get("emoji-summary", "x").await.unwrap_err();
        assert!(matches!(err, TaskError::Corrupt { .. }));
    }
}
