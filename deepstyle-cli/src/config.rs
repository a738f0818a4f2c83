//! Configuration module
//!
//! Collects the store settings given on the command line or through the
//! environment.

use std::time::Duration;

use anyhow::{Context, Result};
use deepstyle_client::StoreConfig;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the job database
    pub database_url: String,
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
}

impl Config {
    /// Validated store configuration for these settings
    pub fn store_config(&self) -> Result<StoreConfig> {
        let mut store = StoreConfig::new(self.database_url.trim_end_matches('/').to_string());
        store.request_timeout = Duration::from_secs(self.request_timeout_secs);
        store.max_attempts = self.max_attempts;

        store
            .validate()
            .with_context(|| format!("invalid store configuration for {}", self.database_url))?;
        Ok(store)
    }
}
