//! Deepstyle document store client
//!
//! Reads and writes deepstyle job documents held in a CouchDB-style database,
//! where every write must present the document's current revision and stale
//! writes are rejected rather than merged.
//!
//! The crate is organised around that optimistic-concurrency rule:
//! - [`DocumentStore`]: the store primitives (fetch, revision-checked save,
//!   attachment fetch and put), implemented over HTTP by [`CouchStore`]
//! - [`edit_with_retry`]: applies a single-field mutation and, on a revision
//!   conflict, reloads the snapshot and retries within a [`RetryPolicy`]
//! - [`upload_attachment`]: revision-qualified attachment PUT with the same
//!   refresh-and-retry discipline
//! - [`JobClient`]: job-level operations built on the two loops above
//!
//! # Example
//!
//! ```no_run
//! use deepstyle_client::{CouchStore, JobClient, StoreConfig};
//! use deepstyle_core::domain::job::JobState;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = StoreConfig::from_env()?;
//!     config.validate()?;
//!     let jobs = JobClient::with_policy(CouchStore::from_config(&config)?, config.retry_policy());
//!
//!     let mut job = jobs.load("job-42").await?;
//!     if job.is_ready_to_process() {
//!         jobs.update_state(&mut job, JobState::BeingProcessed).await?;
//!     }
//!     Ok(())
//! }
//! ```

mod attachment;
pub mod config;
pub mod error;
mod jobs;
mod retry;
mod store;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use attachment::{Attachment, DEFAULT_CONTENT_TYPE, upload_attachment};
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use jobs::JobClient;
pub use retry::{RetryPolicy, edit_with_retry};
pub use store::{AttachmentWrite, DocumentStore};

use deepstyle_core::dto::store::ErrorResponse;
use reqwest::{Client, Url};

/// HTTP client for one database of a CouchDB-style store
#[derive(Debug, Clone)]
pub struct CouchStore {
    /// Database URL (e.g., "http://localhost:5984/deepstyle")
    database_url: String,
    /// HTTP client instance
    client: Client,
}

impl CouchStore {
    /// Create a new store client
    ///
    /// # Arguments
    /// * `database_url` - URL of the database, including its name
    ///
    /// # Example
    /// ```
    /// use deepstyle_client::CouchStore;
    ///
    /// let store = CouchStore::new("http://localhost:5984/deepstyle");
    /// ```
    pub fn new(database_url: impl Into<String>) -> Self {
        Self::with_client(database_url, Client::new())
    }

    /// Create a new store client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    ///
    /// # Arguments
    /// * `database_url` - URL of the database, including its name
    /// * `client` - A configured reqwest Client
    pub fn with_client(database_url: impl Into<String>, client: Client) -> Self {
        let database_url = database_url.into();
        Self {
            database_url: database_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Create a store client whose requests are bounded by the configured timeout
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self::with_client(config.database_url.clone(), client))
    }

    /// Get the database URL
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Build the URL of a document or one of its attachments
    ///
    /// Each segment is percent-encoded, so ids and attachment names may
    /// contain characters that are not valid in a URL path.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.database_url)
            .map_err(|e| StoreError::InvalidUrl(format!("{}: {}", self.database_url, e)))?;

        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidUrl(self.database_url.clone()))?
            .pop_if_empty()
            .extend(segments);

        Ok(url)
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Turn a non-success response into an API error
    ///
    /// The store reports failures as `{"error": .., "reason": ..}`; anything
    /// else is passed through as raw text.
    async fn api_error(response: reqwest::Response) -> StoreError {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.to_string())
            .unwrap_or(body);

        StoreError::api_error(status, message)
    }
}
