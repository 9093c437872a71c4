//! Application state and shared resources.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::blocks::BlockTable;
use crate::config::AppConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,

    /// Attacker → decoy-set block table
    pub blocks: Arc<BlockTable>,

    /// Client used to forward proxied requests
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self> {
        // The delayed decoy variant adds a full second per request, so the
        // forwarding timeout has to sit well above that.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            config,
            blocks: Arc::new(BlockTable::new()),
            http,
        })
    }
}
