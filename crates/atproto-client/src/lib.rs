//! AT Protocol Client Library
//!
//! This crate provides the read-only slice of the AT Protocol needed to walk
//! the social graph: an XRPC query client, the response types for profiles,
//! follows and author feeds, and the [`GraphApi`] trait that the rest of the
//! workspace is written against.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod graph;
pub mod types;
pub mod xrpc;

pub use graph::{GraphApi, Page, XrpcGraphApi};
pub use types::Handle;

/// Result type for AT Protocol operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for AT Protocol operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// XRPC error (transport failure or non-2xx response)
    #[error("XRPC error: {0}")]
    Xrpc(#[from] xrpc::XrpcError),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Whether the failure is transient (network error or 5xx)
    ///
    /// Nothing in this workspace retries; the classification is surfaced so
    /// callers can decide for themselves.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Xrpc(err) => err.is_network_error(),
            _ => false,
        }
    }
}
