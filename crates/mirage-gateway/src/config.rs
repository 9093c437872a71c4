//! Configuration management for the gateway.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use mirage_common::constants::{DEFAULT_GATEWAY_PORT, DEFAULT_LEGITIMATE_URL};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Legitimate upstream base URL
    #[serde(default = "default_legitimate_url")]
    pub legitimate_url: String,
}

fn default_port() -> u16 {
    DEFAULT_GATEWAY_PORT
}

fn default_legitimate_url() -> String {
    DEFAULT_LEGITIMATE_URL.to_string()
}

impl AppConfig {
    /// Load configuration from file, with CLI/env overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let mut config = if Path::new(config_path).exists() {
            let settings = config::Config::builder()
                .add_source(config::File::with_name(config_path))
                .build()
                .context("Failed to load config file")?;

            settings
                .try_deserialize()
                .context("Failed to parse config")?
        } else {
            Self::default()
        };

        if let Some(port) = args.port {
            config.port = port;
        }
        if let Some(ref url) = args.legitimate_url {
            config.legitimate_url = url.clone();
        }

        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            legitimate_url: default_legitimate_url(),
        }
    }
}
