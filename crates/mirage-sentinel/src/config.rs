//! Configuration management for the sentinel.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use mirage_common::constants::{
    DEFAULT_AUTH_FAILURE_LIMIT, DEFAULT_AUTH_FAILURE_WINDOW_SECS, DEFAULT_CONTROLLER_URL,
    DEFAULT_COOLDOWN_PERIOD_SECS, DEFAULT_RATE_LIMIT_THRESHOLD, DEFAULT_RATE_LIMIT_WINDOW_SECS,
    DEFAULT_WATCH_LABELS,
};

use crate::tracker::WindowConfig;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Orchestrator alert sink URL
    #[serde(default = "default_controller_url")]
    pub controller_url: String,

    /// Namespace the upstream pods live in
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Label selector matching the upstream pods
    #[serde(default = "default_watch_labels")]
    pub watch_labels: String,

    /// Requests per address per window before a rate-abuse alert
    #[serde(default = "default_rate_threshold")]
    pub rate_limit_threshold: u32,

    /// Rate window length in seconds
    #[serde(default = "default_rate_window")]
    pub rate_limit_window_secs: u64,

    /// Auth failures per address per window before a brute-force alert
    #[serde(default = "default_auth_limit")]
    pub auth_failure_limit: u32,

    /// Auth-failure window length in seconds
    #[serde(default = "default_auth_window")]
    pub auth_failure_window_secs: u64,

    /// Minimum interval between alert dispatches for one address
    #[serde(default = "default_cooldown")]
    pub cooldown_period_secs: u64,
}

fn default_controller_url() -> String {
    DEFAULT_CONTROLLER_URL.to_string()
}
fn default_namespace() -> String {
    "default".to_string()
}
fn default_watch_labels() -> String {
    DEFAULT_WATCH_LABELS.to_string()
}
fn default_rate_threshold() -> u32 {
    DEFAULT_RATE_LIMIT_THRESHOLD
}
fn default_rate_window() -> u64 {
    DEFAULT_RATE_LIMIT_WINDOW_SECS
}
fn default_auth_limit() -> u32 {
    DEFAULT_AUTH_FAILURE_LIMIT
}
fn default_auth_window() -> u64 {
    DEFAULT_AUTH_FAILURE_WINDOW_SECS
}
fn default_cooldown() -> u64 {
    DEFAULT_COOLDOWN_PERIOD_SECS
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

        if let Some(ref url) = args.controller_url {
            config.controller_url = url.clone();
        }
        if let Some(ref ns) = args.namespace {
            config.namespace = ns.clone();
        }
        if let Some(ref labels) = args.watch_labels {
            config.watch_labels = labels.clone();
        }
        if let Some(v) = args.rate_limit_threshold {
            config.rate_limit_threshold = v;
        }
        if let Some(v) = args.rate_limit_window {
            config.rate_limit_window_secs = v;
        }
        if let Some(v) = args.auth_failure_limit {
            config.auth_failure_limit = v;
        }
        if let Some(v) = args.auth_failure_window {
            config.auth_failure_window_secs = v;
        }
        if let Some(v) = args.cooldown_period {
            config.cooldown_period_secs = v;
        }

        Ok(config)
    }

    /// Window parameters for the attacker tracker
    pub fn windows(&self) -> WindowConfig {
        WindowConfig {
            rate_threshold: self.rate_limit_threshold,
            rate_window: chrono::Duration::seconds(self.rate_limit_window_secs as i64),
            auth_limit: self.auth_failure_limit,
            auth_window: chrono::Duration::seconds(self.auth_failure_window_secs as i64),
            cooldown: chrono::Duration::seconds(self.cooldown_period_secs as i64),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            controller_url: default_controller_url(),
            namespace: default_namespace(),
            watch_labels: default_watch_labels(),
            rate_limit_threshold: default_rate_threshold(),
            rate_limit_window_secs: default_rate_window(),
            auth_failure_limit: default_auth_limit(),
            auth_failure_window_secs: default_auth_window(),
            cooldown_period_secs: default_cooldown(),
        }
    }
}
