//! Configuration management for the orchestrator.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use mirage_common::constants::{
    DEFAULT_ALERT_LISTEN_ADDR, DEFAULT_AUTO_CLEANUP_MINUTES, DEFAULT_MANAGER_URL,
};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Gateway base URL
    #[serde(default = "default_manager_url")]
    pub manager_url: String,

    /// Namespace responses and decoys live in
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Alert sink listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Image the decoy pods run (the upstream image)
    #[serde(default = "default_decoy_image")]
    pub decoy_image: String,

    /// Name of the upstream service being impersonated
    #[serde(default = "default_upstream_service")]
    pub upstream_service: String,

    /// Minutes until a newly created response tears itself down
    #[serde(default = "default_ttl_minutes")]
    pub default_ttl_minutes: i64,
}

fn default_manager_url() -> String {
    DEFAULT_MANAGER_URL.to_string()
}
fn default_namespace() -> String {
    "default".to_string()
}
fn default_listen_addr() -> String {
    DEFAULT_ALERT_LISTEN_ADDR.to_string()
}
fn default_decoy_image() -> String {
    "frontend-api:latest".to_string()
}
fn default_upstream_service() -> String {
    "frontend-api".to_string()
}
fn default_ttl_minutes() -> i64 {
    DEFAULT_AUTO_CLEANUP_MINUTES
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

        if let Some(ref url) = args.manager_url {
            config.manager_url = url.clone();
        }
        if let Some(ref ns) = args.namespace {
            config.namespace = ns.clone();
        }
        if let Some(ref listen) = args.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(ref image) = args.decoy_image {
            config.decoy_image = image.clone();
        }

        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            manager_url: default_manager_url(),
            namespace: default_namespace(),
            listen_addr: default_listen_addr(),
            decoy_image: default_decoy_image(),
            upstream_service: default_upstream_service(),
            default_ttl_minutes: default_ttl_minutes(),
        }
    }
}
