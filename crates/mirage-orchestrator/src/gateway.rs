//! Client for programming the gateway's block table.

use anyhow::{Context, Result};
use std::time::Duration;

use mirage_common::constants::PROGRAMMING_TIMEOUT_SECS;
use mirage_common::{BlockRequest, CleanupRequest, CleanupResponse, MirageError};

/// Thin client over the gateway control API. Calls are best-effort with a
/// short timeout; the reconciler decides how to retry.
#[derive(Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
}

impl GatewayClient {
    pub fn new(base_url: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(PROGRAMMING_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http, base_url })
    }

    /// Install (or overwrite) the block entry routing `source_ip` across
    /// `decoy_urls`.
    pub async fn install_block(
        &self,
        source_ip: &str,
        decoy_urls: &[String],
    ) -> Result<(), MirageError> {
        let body = BlockRequest {
            source_ip: source_ip.to_string(),
            decoy_urls: decoy_urls.to_vec(),
        };

        let resp = self
            .http
            .post(format!("{}/api/block_ip", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| MirageError::GatewayProgramming(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(MirageError::GatewayProgramming(format!(
                "gateway returned status {}",
                resp.status()
            )));
        }

        tracing::info!(
            action = "gateway_block_installed",
            source_ip = %source_ip,
            decoys = decoy_urls.len(),
            "Gateway programmed"
        );

        Ok(())
    }

    /// Remove the block entry for `source_ip`. Clearing an address the
    /// gateway no longer knows is a successful no-op.
    pub async fn clear_block(&self, source_ip: &str) -> Result<bool, MirageError> {
        let body = CleanupRequest {
            source_ip: source_ip.to_string(),
        };

        let resp = self
            .http
            .post(format!("{}/api/cleanup", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| MirageError::GatewayProgramming(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(MirageError::GatewayProgramming(format!(
                "gateway returned status {}",
                resp.status()
            )));
        }

        let parsed: CleanupResponse = resp
            .json()
            .await
            .map_err(|e| MirageError::GatewayProgramming(e.to_string()))?;

        tracing::info!(
            action = "gateway_block_cleared",
            source_ip = %source_ip,
            removed = parsed.removed,
            "Gateway entry cleared"
        );

        Ok(parsed.removed)
    }
}
