//! Herald HTTP Client
//!
//! A typed client for the Herald relay API, shared by the CLI and any tooling
//! that needs deployment history or wants to trigger a pipeline.
//!
//! # Example
//!
//! ```no_run
//! use herald_client::HeraldClient;
//! use herald_core::domain::ProjectId;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = HeraldClient::new("http://localhost:8080");
//!
//!     let bootstrap = client.bootstrap(&ProjectId::new("shop")).await?;
//!     println!("{} deployments", bootstrap.stats.total);
//!     Ok(())
//! }
//! ```

pub mod error;
mod pipelines;
mod projects;

// Re-export commonly used types
pub use error::{ClientError, Result};

use reqwest::{Client, Url};
use serde::de::DeserializeOwned;

/// HTTP client for the Herald relay API
#[derive(Debug, Clone)]
pub struct HeraldClient {
    /// Base URL of the relay (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl HeraldClient {
    /// Create a new client
    ///
    /// # Example
    /// ```
    /// use herald_client::HeraldClient;
    ///
    /// let client = HeraldClient::new("http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the relay
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build an endpoint URL, escaping each path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ClientError::InvalidRequest(format!("Invalid server URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| {
                ClientError::InvalidRequest(format!("Server URL cannot be a base: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Check the status code and deserialize the JSON body
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::debug!("Request failed with {}: {}", status, error_text);
            return Err(ClientError::from_body(status.as_u16(), &error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}
