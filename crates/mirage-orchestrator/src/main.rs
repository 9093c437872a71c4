//! # Mirage Orchestrator
//!
//! Translates attack alerts into AttackResponse resources and reconciles
//! each one toward a decoy fleet, network isolation, and a gateway block
//! entry, then tears everything down when the response's TTL expires.
//!
//! ## Architecture
//! ```text
//! Sentinel alert → /api/alerts → AttackResponse (CRD)
//!                                      ↓ reconcile
//!                    decoy pods + network policies + gateway entry
//!                                      ↓ TTL
//!                              cascade delete + gateway clear
//! ```

use anyhow::{Context as _, Result};
use clap::Parser;
use futures::StreamExt;
use kube::runtime::{controller::Controller, watcher};
use kube::Api;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod crd;
mod decoys;
mod gateway;
mod observer;
mod reconcile;
mod routes;

use config::AppConfig;
use crd::AttackResponse;
use gateway::GatewayClient;
use observer::Observer;
use reconcile::Context;
use routes::ApiState;

/// Mirage Orchestrator - AttackResponse reconciler and alert sink
#[derive(Parser, Debug)]
#[command(name = "mirage-orchestrator")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/orchestrator.toml")]
    config: String,

    /// Gateway base URL (overrides config)
    #[arg(long, env = "MANAGER_URL")]
    manager_url: Option<String>,

    /// Namespace to operate in (overrides config)
    #[arg(long, env = "NAMESPACE")]
    namespace: Option<String>,

    /// Alert sink listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Decoy image (overrides config)
    #[arg(long, env = "DECOY_IMAGE")]
    decoy_image: Option<String>,

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

    info!("Starting Mirage Orchestrator v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load(&args.config, &args)?;
    info!(
        manager_url = %config.manager_url,
        namespace = %config.namespace,
        listen = %config.listen_addr,
        "Configuration loaded"
    );

    let client = kube::Client::try_default()
        .await
        .context("Failed to connect to the cluster")?;

    let observer = Observer::new();
    let gateway = GatewayClient::new(config.manager_url.clone())?;

    let context = Arc::new(Context::new(
        client.clone(),
        config.namespace.clone(),
        config.decoy_image.clone(),
        gateway,
        observer.clone(),
    ));

    let responses: Api<AttackResponse> = Api::namespaced(client.clone(), &config.namespace);

    let controller = tokio::spawn(
        Controller::new(responses, watcher::Config::default())
            .shutdown_on_signal()
            .run(reconcile::reconcile, reconcile::error_policy, context)
            .for_each(|result| async move {
                match result {
                    Ok((obj, _)) => {
                        tracing::debug!(resource = %obj.name, "Reconciled");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Reconcile failed");
                    }
                }
            }),
    );

    let api_state = ApiState {
        client,
        namespace: config.namespace.clone(),
        upstream_service: config.upstream_service.clone(),
        default_ttl_minutes: config.default_ttl_minutes,
        observer,
    };
    let app = routes::create_router(api_state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "Alert sink listening");

    let server = tokio::spawn(async move {
        let shutdown_signal = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
            info!("Shutdown signal received");
        };

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
    });

    let (controller_result, server_result) = tokio::join!(controller, server);
    controller_result.context("Controller task panicked")?;
    server_result
        .context("Server task panicked")?
        .context("Server error")?;

    info!("Orchestrator shutdown complete");
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
