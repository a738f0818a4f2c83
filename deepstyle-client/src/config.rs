//! Store configuration
//!
//! Defines where the job database lives and how patient the client is with
//! it: the per-request timeout and the attempt ceiling for conflicting writes.

use std::time::Duration;

use crate::retry::RetryPolicy;

/// Store connection configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database URL, including the database name (e.g., "http://localhost:5984/deepstyle")
    pub database_url: String,

    /// Upper bound on each HTTP request; a timeout is reported as a transport error
    pub request_timeout: Duration,

    /// Writes attempted before a conflicting update or upload gives up
    pub max_attempts: u32,
}

impl StoreConfig {
    /// Creates a new configuration with defaults
    pub fn new(database_url: String) -> Self {
        Self {
            database_url,
            request_timeout: Duration::from_secs(30),
            max_attempts: RetryPolicy::DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - DEEPSTYLE_DATABASE_URL (required)
    /// - DEEPSTYLE_REQUEST_TIMEOUT (optional, seconds, default: 30)
    /// - DEEPSTYLE_MAX_ATTEMPTS (optional, default: 10)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Creates configuration from any variable source, using the same
    /// names and fallbacks as [`StoreConfig::from_env`]
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = var("DEEPSTYLE_DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DEEPSTYLE_DATABASE_URL environment variable not set"))?;

        let request_timeout = var("DEEPSTYLE_REQUEST_TIMEOUT")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));

        let max_attempts = var("DEEPSTYLE_MAX_ATTEMPTS")
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(RetryPolicy::DEFAULT_MAX_ATTEMPTS);

        Ok(Self {
            database_url,
            request_timeout,
            max_attempts,
        })
    }

    /// Retry policy for document writes and attachment uploads
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_url.is_empty() {
            anyhow::bail!("database_url cannot be empty");
        }

        if !self.database_url.starts_with("http://") && !self.database_url.starts_with("https://")
        {
            anyhow::bail!("database_url must start with http:// or https://");
        }

        if self.request_timeout.is_zero() {
            anyhow::bail!("request_timeout must be greater than 0");
        }

        if self.max_attempts == 0 {
            anyhow::bail!("max_attempts must be greater than 0");
        }

        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new("http://localhost:5984/deepstyle".to_string())
    }
}
