//! HTTP client for feed fetches
//!
//! Builds the shared reqwest client used by all adapters. Directory
//! mirrors are plain HTTPS; an optional SOCKS proxy covers deployments
//! that reach the directory network through a tunnel.

use reqwest::{Client, Proxy};
use std::time::Duration;
use thiserror::Error;

/// Fetch layer configuration
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Optional SOCKS5 proxy address (e.g. socks5h://127.0.0.1:9050)
    pub proxy_addr: Option<String>,
    /// Default request timeout in seconds; adapters may use tighter budgets
    pub timeout_secs: u64,
    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            proxy_addr: None,
            timeout_secs: 60,
            user_agent: format!("relay-sentinel/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Errors from feed fetching and parsing
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Unexpected status: {0}")]
    Status(u16),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl FetchError {
    /// Whether this was a shape mismatch rather than a connectivity issue.
    /// Logged differently so the two failure modes stay distinguishable.
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse(_))
    }
}

/// Create the HTTP client shared by all source adapters
pub fn create_client(config: &FetchConfig) -> Result<Client, FetchError> {
    let mut builder = Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(&config.user_agent);

    if let Some(addr) = &config.proxy_addr {
        let proxy = Proxy::all(addr).map_err(|e| FetchError::ClientBuild(e.to_string()))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| FetchError::ClientBuild(e.to_string()))
}

/// GET a URL and return the body text, failing on non-success status.
pub async fn fetch_text(client: &Client, url: &str) -> Result<String, FetchError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }
    Ok(response.text().await?)
}
