//! Emoji summary background job
//!
//! The job reads an account's recent posts, asks the text analyzer for the
//! dominant keywords and the emoji that best match them, and quotes the first
//! post line each matched keyword appears in. Progress is tracked in the
//! [`TaskStore`]; callers poll the record rather than awaiting the job.

use async_trait::async_trait;
use atproto_client::Handle;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storage::{AsyncTaskRecord, TaskStore};

use crate::graph::GraphService;
use crate::{GraphError, Result};

/// Task namespace for emoji summaries
pub const EMOJI_SUMMARY_NAMESPACE: &str = "emoji-summary";

/// Extracted keyword with its relevance score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    /// Keyword or key phrase
    pub keyword: String,
    /// Relevance score
    pub score: f64,
}

/// Emoji matched to a keyword
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmojiMatch {
    /// Keyword the emoji was matched against
    pub keyword: String,
    /// Similarity score
    pub score: f64,
    /// Matched emoji
    pub emoji: String,
}

/// Result row: an emoji, its keyword and the post line quoting it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmojiLine {
    /// Matched emoji
    pub emoji: String,
    /// Keyword
    pub keyword: String,
    /// First post line containing the keyword
    pub line: String,
}

/// Keyword extraction and emoji matching service
#[async_trait]
pub trait TextAnalyzer: Send + Sync {
    /// Up to `max_results` keywords for `text`
    async fn extract_keywords(&self, text: &str, max_results: usize) -> anyhow::Result<Vec<Keyword>>;

    /// Best emoji for each keyword
    async fn match_emojis(&self, keywords: &[Keyword]) -> anyhow::Result<Vec<EmojiMatch>>;
}

/// Quote the first line containing each matched keyword
///
/// Matches whose keyword appears in no line are dropped.
pub fn join_matches_to_lines(lines: &[String], matches: &[EmojiMatch]) -> Vec<EmojiLine> {
    matches
        .iter()
        .filter_map(|m| {
            lines.iter().find(|line| line.contains(m.keyword.as_str())).map(|line| EmojiLine {
                emoji: m.emoji.clone(),
                keyword: m.keyword.clone(),
                line: line.clone(),
            })
        })
        .collect()
}

/// Parameters for one summary job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryRequest {
    /// Keywords requested from the analyzer
    pub num_keywords: usize,
    /// Feed pages read
    pub num_feed_pages: usize,
}

impl Default for SummaryRequest {
    fn default() -> Self {
        Self { num_keywords: 25, num_feed_pages: 25 }
    }
}

/// Launches and runs emoji summary jobs
#[derive(Clone)]
pub struct SummaryWorker {
    graph: GraphService,
    analyzer: Arc<dyn TextAnalyzer>,
    tasks: TaskStore,
}

impl SummaryWorker {
    /// Create a worker
    pub fn new(graph: GraphService, analyzer: Arc<dyn TextAnalyzer>, tasks: TaskStore) -> Self {
        Self { graph, analyzer, tasks }
    }

    /// Return the task record for `handle`, launching the job if it is new
    ///
    /// The job is spawned only when this call created the record; polling an
    /// existing record never launches a second worker.
    pub async fn start(&self, handle: &str, request: SummaryRequest) -> Result<AsyncTaskRecord> {
        let handle = Handle::scrub(handle);
        let entry = self.tasks.start_or_get(EMOJI_SUMMARY_NAMESPACE, &handle).await?;

        if entry.is_created() {
            let worker = self.clone();
            let task_id = entry.record().task_id.clone();
            tracing::info!(%task_id, %handle, "launching emoji summary");
            tokio::spawn(async move {
                worker
                    .run_emoji_summary(&task_id, &handle, request.num_keywords, request.num_feed_pages)
                    .await;
            });
        }

        Ok(entry.into_record())
    }

    /// Current task record for `handle`, if any
    pub async fn status(&self, handle: &str) -> Result<Option<AsyncTaskRecord>> {
        let handle = Handle::scrub(handle);
        Ok(self.tasks.get(EMOJI_SUMMARY_NAMESPACE, &handle).await?)
    }

    /// Run the job to completion and record the outcome
    ///
    /// Any failure is written to the task record; the return value is empty in
    /// that case.
    pub async fn run_emoji_summary(
        &self,
        task_id: &str,
        handle: &str,
        num_keywords: usize,
        num_feed_pages: usize,
    ) -> Vec<EmojiLine> {
        match self.summarize(handle, num_keywords, num_feed_pages).await {
            Ok(lines) => {
                if let Err(err) = self.tasks.complete(EMOJI_SUMMARY_NAMESPACE, handle, &lines).await {
                    tracing::warn!(%task_id, error = %err, "failed to record emoji summary");
                }
                lines
            }
            Err(err) => {
                tracing::warn!(%task_id, %handle, error = %err, "emoji summary failed");
                if let Err(store_err) = self.tasks.fail(EMOJI_SUMMARY_NAMESPACE, handle, &err).await {
                    tracing::warn!(%task_id, error = %store_err, "failed to record emoji summary failure");
                }
                Vec::new()
            }
        }
    }

    async fn summarize(
        &self,
        handle: &str,
        num_keywords: usize,
        num_feed_pages: usize,
    ) -> Result<Vec<EmojiLine>> {
        let lines = self.graph.author_feed_texts(handle, num_feed_pages).await?;
        tracing::debug!(%handle, lines = lines.len(), "collected feed text");

        let text = lines.join("\n");
        let keywords = self
            .analyzer
            .extract_keywords(&text, num_keywords)
            .await
            .map_err(|err| GraphError::Analysis(format!("keyword extraction: {err:#}")))?;
        let matches = self
            .analyzer
            .match_emojis(&keywords)
            .await
            .map_err(|err| GraphError::Analysis(format!("emoji matching: {err:#}")))?;

        Ok(join_matches_to_lines(&lines, &matches))
    }
}
