//! Alert delivery to the orchestrator's alert sink.

use anyhow::{Context, Result};
use std::time::Duration;

use mirage_common::constants::ALERT_DISPATCH_TIMEOUT_SECS;
use mirage_common::{Alert, MirageError};

/// Posts attack records to the orchestrator. Delivery is best-effort: the
/// caller decides what a failure means for cooldown state.
pub struct AlertDispatcher {
    http: reqwest::Client,
    controller_url: String,
}

impl AlertDispatcher {
    pub fn new(controller_url: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(ALERT_DISPATCH_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            controller_url,
        })
    }

    pub async fn send(&self, alert: &Alert) -> Result<(), MirageError> {
        let resp = self
            .http
            .post(&self.controller_url)
            .json(alert)
            .send()
            .await
            .map_err(|e| MirageError::AlertDelivery(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(MirageError::AlertDelivery(format!(
                "alert sink returned status {}",
                resp.status()
            )));
        }

        tracing::debug!(
            action = "alert_sent",
            source_ip = %alert.source_ip,
            attack_type = %alert.attack_type,
            "Alert delivered"
        );

        Ok(())
    }
}
