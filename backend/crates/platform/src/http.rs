//! HTTP Client Infrastructure
//!
//! A single `reqwest::Client` is shared by every backend call so connections
//! are pooled. Every request is bounded by the configured timeout: a hung
//! request must degrade into the offline path instead of stalling a scan.

use std::time::Duration;

use thiserror::Error;

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(4);

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Total time allowed for one request, connect included
    pub timeout: Duration,
    /// Time allowed to establish the TCP/TLS connection
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: Duration::from_secs(2),
            user_agent: concat!("attendance-scanner/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpClientConfig {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            connect_timeout: timeout.min(Duration::from_secs(2)),
            ..Default::default()
        }
    }
}

/// Error while building the client
#[derive(Debug, Error)]
#[error("failed to build HTTP client: {0}")]
pub struct ClientBuildError(#[from] reqwest::Error);

/// Build the shared client
pub fn build_client(config: &HttpClientConfig) -> Result<reqwest::Client, ClientBuildError> {
    let client = reqwest::Client::builder()
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .user_agent(config.user_agent.clone())
        .build()?;
    Ok(client)
}

/// Join a base URL and an endpoint path without doubling or dropping `/`
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
