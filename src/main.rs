//! Graph Compass - follow graph explorer for Bluesky
//!
//! Main entry point for the `compass` CLI. Every command prints JSON on stdout.

mod logging;

use anyhow::Context;
use atproto_client::xrpc::{XrpcClientConfig, DEFAULT_SERVICE_URL};
use atproto_client::XrpcGraphApi;
use clap::{Parser, Subcommand};
use graph_core::{GraphAggregator, GraphConfig, GraphError, GraphService};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use storage::{CacheBackend, CacheStore, KvConfig, KvStore, RedisBackend, RedisConfig, TaskStore};

/// Graph Compass - follow graph explorer
#[derive(Parser, Debug)]
#[command(name = "compass")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Shared Redis cache; a local sled store is used when unset
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Redis connection pool size
    #[arg(long, env = "REDIS_MAX_CLIENTS", default_value_t = 4)]
    redis_max_clients: usize,

    /// Path of the local cache database
    #[arg(long, default_value = "compass_cache.db")]
    cache_path: String,

    /// AppView service URL
    #[arg(long, env = "COMPASS_SERVICE_URL", default_value = DEFAULT_SERVICE_URL)]
    service_url: String,

    /// Pre-issued access token sent as a bearer token
    #[arg(long, env = "COMPASS_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show a detailed profile
    Profile {
        /// Account handle
        handle: String,
    },

    /// List accounts following a handle
    Followers {
        /// Account handle
        handle: String,
    },

    /// List accounts a handle follows
    Following {
        /// Account handle
        handle: String,
    },

    /// List the handles a handle follows
    FollowingHandles {
        /// Account handle
        handle: String,
    },

    /// Accounts that follow a handle back
    Mutuals {
        /// Account handle
        handle: String,
    },

    /// Accounts you follow that also follow them
    Credibility {
        /// Your handle
        me: String,
        /// Their handle
        them: String,
    },

    /// Count who the accounts you follow are following
    Popularity {
        /// Your handle
        me: String,

        /// Window start in your sorted following list
        #[arg(short, long, default_value_t = 0)]
        index: usize,
    },

    /// Accounts followed by the accounts you follow, excluding your follows
    Suggestions {
        /// Your handle
        me: String,

        /// Window start in your sorted following list
        #[arg(short, long, default_value_t = 0)]
        index: usize,
    },

    /// Suggestions over your whole following list at once
    Recommendations {
        /// Your handle
        me: String,
    },

    /// One page of an author feed
    Feed {
        /// Account handle
        handle: String,

        /// Cursor returned by the previous page
        #[arg(short, long)]
        cursor: Option<String>,
    },

    /// Post texts from several feed pages
    FeedTexts {
        /// Account handle
        handle: String,

        /// Number of pages to read
        #[arg(short, long, default_value_t = 1)]
        pages: usize,
    },

    /// Show the emoji summary task record for a handle
    ///
    /// Records are created by library callers of `SummaryWorker::start`; this
    /// command only reads them.
    TaskStatus {
        /// Account handle
        handle: String,
    },

    /// Delete every cache entry whose key ends with a suffix
    ClearCache {
        /// Key suffix, usually a handle
        suffix: String,
    },
}

struct Backend {
    cache: CacheStore,
    local: Option<KvStore>,
}

async fn open_backend(cli: &Cli) -> anyhow::Result<Backend> {
    match &cli.redis_url {
        Some(url) => {
            let redis = RedisBackend::connect(&RedisConfig::new(url).max_clients(cli.redis_max_clients))
                .await
                .context("Failed to connect to Redis")?;
            Ok(Backend { cache: CacheStore::with_backend(Arc::new(redis)), local: None })
        }
        None => {
            let kv = KvStore::new(KvConfig::new(&cli.cache_path))
                .with_context(|| format!("Failed to open cache at {}", cli.cache_path))?;
            let backend: Arc<dyn CacheBackend> = Arc::new(kv.clone());
            Ok(Backend { cache: CacheStore::with_backend(backend), local: Some(kv) })
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli, cache: CacheStore) -> anyhow::Result<()> {
    let mut xrpc = XrpcClientConfig::new(&cli.service_url);
    if let Some(token) = &cli.access_token {
        xrpc = xrpc.with_bearer_token(token);
    }
    let api = Arc::new(XrpcGraphApi::new(xrpc)?);
    let graph = GraphService::new(api, cache.clone(), GraphConfig::from_env());
    let aggregator = GraphAggregator::new(graph.clone());

    match cli.command {
        Commands::Profile { handle } => print_json(&graph.profile(&handle).await?),
        Commands::Followers { handle } => print_json(&graph.followers(&handle).await?),
        Commands::Following { handle } => print_json(&graph.following(&handle).await?),
        Commands::FollowingHandles { handle } => {
            print_json(&graph.following_handles(&handle).await?)
        }
        Commands::Mutuals { handle } => print_json(&aggregator.mutuals(&handle).await?),
        Commands::Credibility { me, them } => {
            let lenders = aggregator.credibility(&me, &them).await?;
            let percent = match aggregator.credibility_percent(&me, &them).await {
                Ok(percent) => Some(percent),
                Err(GraphError::NoFollowers(_)) => None,
                Err(err) => return Err(err.into()),
            };
            print_json(&json!({ "lenders": lenders, "percent": percent }))
        }
        Commands::Popularity { me, index } => {
            let window = aggregator.popularity(&me, index).await?;
            print_json(&json!({ "popularity": window.data, "next": window.next_index() }))
        }
        Commands::Suggestions { me, index } => {
            let window = aggregator.suggestions(&me, index).await?;
            print_json(&json!({ "suggestions": window.data, "next": window.next_index() }))
        }
        Commands::Recommendations { me } => {
            print_json(&json!({ "recommendations": aggregator.recommendations(&me).await? }))
        }
        Commands::Feed { handle, cursor } => {
            print_json(&graph.author_feed(&handle, cursor.as_deref()).await?)
        }
        Commands::FeedTexts { handle, pages } => {
            print_json(&json!({ "feed": graph.author_feed_texts(&handle, pages).await? }))
        }
        Commands::TaskStatus { handle } => {
            let record = TaskStore::from_cache(&cache)
                .get(graph_core::EMOJI_SUMMARY_NAMESPACE, &atproto_client::Handle::scrub(&handle))
                .await?;
            print_json(&record)
        }
        Commands::ClearCache { suffix } => {
            let deleted = cache.delete_by_suffix(&suffix).await?;
            print_json(&json!({ "status": "ok", "deleted": deleted }))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init()?;

    let backend = open_backend(&cli).await?;
    let result = run(cli, backend.cache).await;

    if let Some(kv) = backend.local {
        if let Err(err) = kv.flush() {
            tracing::warn!(error = %err, "failed to flush cache");
        }
    }

    result
}
