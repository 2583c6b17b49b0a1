//! XRPC client implementation
//!
//! This module implements the query half of the XRPC (Cross-Platform Remote
//! Procedure Call) protocol used by AT Protocol services: request/response
//! types, error handling, and the HTTP client. Failures are returned as-is;
//! nothing here retries.

use reqwest::{Client as ReqwestClient, Response as ReqwestResponse};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

// =============================================================================
// Error Types
// =============================================================================

/// XRPC error with HTTP status and message
///
/// This represents errors returned from XRPC endpoints, including both
/// network failures (status 0) and application-level errors.
///
/// # Examples
/// ```
/// use atproto_client::xrpc::XrpcError;
///
/// let error = XrpcError::new(404, "NotFound", "Profile not found");
/// assert_eq!(error.status(), 404);
/// assert!(!error.is_network_error());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XrpcError {
    /// HTTP status code (0 when the request never got a response)
    status: u16,
    /// Error code (e.g., "InvalidRequest", "NotFound")
    error: String,
    /// Human-readable error message
    message: String,
}

impl XrpcError {
    /// Create a new XRPC error
    pub fn new(status: u16, error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            message: message.into(),
        }
    }

    /// Get the HTTP status code
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Get the error code
    pub fn error(&self) -> &str {
        &self.error
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Check if this is a transient network-related error
    ///
    /// Network failure statuses: 0, 1, 408, 425, 429, 500, 502, 503, 504, 522, 524
    pub fn is_network_error(&self) -> bool {
        matches!(
            self.status,
            0 | 1 | 408 | 425 | 429 | 500 | 502 | 503 | 504 | 522 | 524
        )
    }
}

impl std::fmt::Display for XrpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "XRPC error {}: {} - {}",
            self.status, self.error, self.message
        )
    }
}

impl std::error::Error for XrpcError {}

// =============================================================================
// Request Types
// =============================================================================

/// XRPC query request
///
/// Represents a GET request to an XRPC endpoint with NSID, query parameters
/// and headers. Repeated parameters (e.g. `actors`) are kept in order.
#[derive(Debug, Clone)]
pub struct XrpcRequest {
    /// NSID path (e.g., "app.bsky.graph.getFollowers")
    pub nsid: String,
    /// Query parameters
    pub params: Vec<(String, String)>,
    /// Request headers
    pub headers: HashMap<String, String>,
}

impl XrpcRequest {
    /// Create a new GET request (query)
    pub fn query(nsid: impl Into<String>) -> Self {
        Self {
            nsid: nsid.into(),
            params: Vec::new(),
            headers: HashMap::new(),
        }
    }

    /// Add a query parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Add a query parameter when the value is present
    pub fn param_opt(self, key: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.param(key, value),
            None => self,
        }
    }

    /// Add a header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Look up the first value of a query parameter
    pub fn get_param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// XRPC response
#[derive(Debug, Clone)]
pub struct XrpcResponse<T> {
    /// HTTP status code
    pub status: u16,
    /// Response data
    pub data: T,
}

impl<T> XrpcResponse<T> {
    /// Create a new response
    pub fn new(status: u16, data: T) -> Self {
        Self { status, data }
    }
}

/// Standard XRPC error response format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XrpcErrorResponse {
    /// Error code
    pub error: String,
    /// Error message
    #[serde(default)]
    pub message: String,
}

// =============================================================================
// Client Configuration
// =============================================================================

/// Public AppView, which serves the graph and feed queries without a session
pub const DEFAULT_SERVICE_URL: &str = "https://public.api.bsky.app";

/// Configuration for XRPC client
#[derive(Debug, Clone)]
pub struct XrpcClientConfig {
    /// Base service URL (e.g., "https://public.api.bsky.app")
    pub service_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// User agent string
    pub user_agent: String,
    /// Custom headers to include in all requests
    pub default_headers: HashMap<String, String>,
}

impl Default for XrpcClientConfig {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            timeout: Duration::from_secs(30),
            user_agent: format!("Graph-Compass/{}", env!("CARGO_PKG_VERSION")),
            default_headers: HashMap::new(),
        }
    }
}

impl XrpcClientConfig {
    /// Create a new config with a service URL
    pub fn new(service_url: impl Into<String>) -> Self {
        Self {
            service_url: service_url.into(),
            ..Default::default()
        }
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Add a default header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(key.into(), value.into());
        self
    }

    /// Send a pre-issued access token with every request
    pub fn with_bearer_token(self, token: impl AsRef<str>) -> Self {
        self.with_header("Authorization", format!("Bearer {}", token.as_ref()))
    }
}

// =============================================================================
// XRPC Client Implementation
// =============================================================================

/// XRPC client for making queries against AT Protocol services
///
/// # Examples
/// ```
/// use atproto_client::xrpc::{XrpcClient, XrpcClientConfig, XrpcRequest};
///
/// async fn example() -> Result<(), Box<dyn std::error::Error>> {
///     let client = XrpcClient::new(XrpcClientConfig::default())?;
///
///     let request = XrpcRequest::query("app.bsky.actor.getProfile").param("actor", "bsky.app");
///     let response = client.query::<serde_json::Value>(request).await?;
///     println!("{}", response.data);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct XrpcClient {
    /// HTTP client
    client: ReqwestClient,
    /// Configuration
    config: XrpcClientConfig,
}

impl XrpcClient {
    /// Create a new XRPC client
    pub fn new(config: XrpcClientConfig) -> Result<Self, XrpcError> {
        let client = ReqwestClient::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| XrpcError::new(0, "ClientError", format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Make a query request (GET)
    pub async fn query<T>(&self, request: XrpcRequest) -> Result<XrpcResponse<T>, XrpcError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!(
            "{}/xrpc/{}",
            self.config.service_url.trim_end_matches('/'),
            request.nsid
        );

        let mut req = self.client.get(&url).query(&request.params);

        for (key, value) in &self.config.default_headers {
            req = req.header(key, value);
        }

        for (key, value) in &request.headers {
            req = req.header(key, value);
        }

        tracing::trace!(nsid = %request.nsid, "xrpc query");

        let response = req.send().await.map_err(|e| {
            XrpcError::new(0, "NetworkError", format!("Request failed: {}", e))
        })?;

        self.parse_response(response).await
    }

    /// Parse reqwest response into XrpcResponse
    async fn parse_response<T>(&self, response: ReqwestResponse) -> Result<XrpcResponse<T>, XrpcError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let status = response.status().as_u16();

        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();

            if let Ok(error_response) = serde_json::from_str::<XrpcErrorResponse>(&error_body) {
                return Err(XrpcError::new(
                    status,
                    error_response.error,
                    error_response.message,
                ));
            } else {
                return Err(XrpcError::new(
                    status,
                    "Unknown",
                    format!("HTTP {}: {}", status, error_body),
                ));
            }
        }

        let body = response.text().await.map_err(|e| {
            XrpcError::new(0, "ParseError", format!("Failed to read response: {}", e))
        })?;

        let data: T = serde_json::from_str(&body).map_err(|e| {
            XrpcError::new(status, "ParseError", format!("Failed to parse JSON: {}", e))
        })?;

        Ok(XrpcResponse::new(status, data))
    }

    /// Get the client configuration
    pub fn config(&self) -> &XrpcClientConfig {
        &self.config
    }

    /// Get the service URL
    pub fn service_url(&self) -> &str {
        &self.config.service_url
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xrpc_error_network() {
        let error = XrpcError::new(503, "ServiceUnavailable", "Service is down");
        assert_eq!(error.status(), 503);
        assert_eq!(error.error(), "ServiceUnavailable");
        assert_eq!(error.message(), "Service is down");
        assert!(error.is_network_error());

        let error = XrpcError::new(0, "NetworkError", "connection reset");
        assert!(error.is_network_error());
    }

    #[test]
    fn test_xrpc_error_application() {
        let error = XrpcError::new(400, "InvalidRequest", "Bad input");
        assert_eq!(error.status(), 400);
        assert!(!error.is_network_error());
    }

    #[test]
    fn test_xrpc_request_query() {
        let req = XrpcRequest::query("app.bsky.graph.getFollows")
            .param("actor", "alice.test")
            .param("limit", "100")
            .param_opt("cursor", None::<String>)
            .header("Accept", "application/json");

        assert_eq!(req.nsid, "app.bsky.graph.getFollows");
        assert_eq!(req.get_param("actor"), Some("alice.test"));
        assert_eq!(req.get_param("cursor"), None);
        assert_eq!(
            req.headers.get("Accept"),
            Some(&"application/json".to_string())
        );
    }

    #[test]
    fn test_xrpc_request_param_opt_present() {
        let req = XrpcRequest::query("app.bsky.feed.getAuthorFeed")
            .param_opt("cursor", Some("3kabc"));
        assert_eq!(req.get_param("cursor"), Some("3kabc"));
    }

    #[test]
    fn test_client_config_default() {
        let config = XrpcClientConfig::default();
        assert_eq!(config.service_url, DEFAULT_SERVICE_URL);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.user_agent.starts_with("Graph-Compass/"));
    }

    #[test]
    fn test_client_config_builder() {
        let config = XrpcClientConfig::new("https://custom.server")
            .with_timeout(Duration::from_secs(60))
            .with_user_agent("CustomAgent/1.0")
            .with_bearer_token("abc");

        assert_eq!(config.service_url, "https://custom.server");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.user_agent, "CustomAgent/1.0");
        assert_eq!(
            config.default_headers.get("Authorization"),
            Some(&"Bearer abc".to_string())
        );
    }

    #[test]
    fn test_xrpc_error_display() {
        let error = XrpcError::new(404, "NotFound", "Profile not found");
        let display = format!("{}", error);
        assert!(display.contains("404"));
        assert!(display.contains("NotFound"));
        assert!(display.contains("Profile not found"));
    }

    #[test]
    fn test_xrpc_client_new() {
        let config = XrpcClientConfig::new("https://bsky.social").with_timeout(Duration::from_secs(60));

        let client = XrpcClient::new(config).unwrap();
        assert_eq!(client.service_url(), "https://bsky.social");
        assert_eq!(client.config().timeout, Duration::from_secs(60));
    }
}
