//! # Mirage Gateway
//!
//! The ingress edge of Mirage. Terminates inbound requests, decides per
//! request between the legitimate upstream and a per-attacker decoy fan-out,
//! and exposes a small control API for the orchestrator.
//!
//! ## Architecture
//! ```text
//! Client → Gateway → frontend-api (legitimate)
//!             ↓
//!          decoy-1 / decoy-2 / decoy-3 (round-robin per blocked address)
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod blocks;
mod config;
mod proxy;
mod routes;
mod state;

use config::AppConfig;
use state::AppState;

/// Mirage Gateway - deception-routing reverse proxy
#[derive(Parser, Debug)]
#[command(name = "mirage-gateway")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/gateway.toml")]
    config: String,

    /// Listen port (overrides config)
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Legitimate upstream URL (overrides config)
    #[arg(long, env = "LEGITIMATE_SERVICE_URL")]
    legitimate_url: Option<String>,

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

    info!("Starting Mirage Gateway v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load(&args.config, &args)?;

    // A broken upstream URL is a startup failure, not a per-request one
    reqwest::Url::parse(&config.legitimate_url)
        .with_context(|| format!("Invalid legitimate upstream URL: {}", config.legitimate_url))?;

    info!(
        upstream = %config.legitimate_url,
        port = config.port,
        "Configuration loaded"
    );

    let state = AppState::new(config.clone())?;
    let app = routes::create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "Gateway listening");

    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received");
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await
    .context("Server error")?;

    info!("Gateway shutdown complete");
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
