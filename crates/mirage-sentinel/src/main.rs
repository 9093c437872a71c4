//! # Mirage Sentinel
//!
//! Log-stream attack detector. Discovers upstream pods by label, tails their
//! stdout, classifies lines against the rule set, and reports attackers to
//! the orchestrator's alert sink with per-address cooldown.
//!
//! ## Architecture
//! ```text
//! Pod watch → tail worker per pod → rule engine → alert sink (orchestrator)
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod dispatch;
mod engine;
mod rules;
mod tailer;
mod tracker;
mod watcher;

use config::AppConfig;
use dispatch::AlertDispatcher;
use engine::Engine;
use rules::RuleSet;
use tracker::AttackerTracker;

/// Mirage Sentinel - log-stream attack detector
#[derive(Parser, Debug)]
#[command(name = "mirage-sentinel")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/sentinel.toml")]
    config: String,

    /// Orchestrator alert sink URL (overrides config)
    #[arg(long, env = "CONTROLLER_URL")]
    controller_url: Option<String>,

    /// Namespace to watch (overrides config)
    #[arg(long, env = "NAMESPACE")]
    namespace: Option<String>,

    /// Label selector for upstream pods (overrides config)
    #[arg(long, env = "WATCH_LABELS")]
    watch_labels: Option<String>,

    /// Requests per window before a rate-abuse alert
    #[arg(long, env = "RATE_LIMIT_THRESHOLD")]
    rate_limit_threshold: Option<u32>,

    /// Rate window length in seconds
    #[arg(long, env = "RATE_LIMIT_WINDOW")]
    rate_limit_window: Option<u64>,

    /// Auth failures per window before a brute-force alert
    #[arg(long, env = "AUTH_FAILURE_LIMIT")]
    auth_failure_limit: Option<u32>,

    /// Auth-failure window length in seconds
    #[arg(long, env = "AUTH_FAILURE_WINDOW")]
    auth_failure_window: Option<u64>,

    /// Per-address alert cooldown in seconds
    #[arg(long, env = "COOLDOWN_PERIOD")]
    cooldown_period: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Emit one JSON object per line
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.json_logs)?;

    info!("Starting Mirage Sentinel v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load(&args.config, &args)?;
    info!(
        controller_url = %config.controller_url,
        namespace = %config.namespace,
        watch_labels = %config.watch_labels,
        rate_limit = config.rate_limit_threshold,
        auth_limit = config.auth_failure_limit,
        cooldown_secs = config.cooldown_period_secs,
        "Configuration loaded"
    );

    // Rule compilation failure is a startup failure
    let rules = RuleSet::new().context("Failed to compile detection rules")?;
    let tracker = AttackerTracker::new(config.windows());
    let dispatcher =
        AlertDispatcher::new(config.controller_url.clone()).context("Failed to build dispatcher")?;
    let engine = Arc::new(Engine::new(config.clone(), rules, tracker, dispatcher));

    let client = kube::Client::try_default()
        .await
        .context("Failed to connect to the cluster")?;

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    let watcher_handle = tokio::spawn(watcher::run(
        client,
        config.clone(),
        engine,
        shutdown_tx.clone(),
    ));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to install Ctrl+C handler")?;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());

    let _ = watcher_handle.await;

    info!("Sentinel shutdown complete");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }

    Ok(())
}
