//! Common error types for Mirage components.

use thiserror::Error;

/// Common errors across Mirage components
#[derive(Debug, Error)]
pub enum MirageError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input/request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Legitimate upstream or decoy target unreachable
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Kubernetes API error
    #[error("Cluster error: {0}")]
    Cluster(String),

    /// Gateway programming call failed
    #[error("Gateway programming error: {0}")]
    GatewayProgramming(String),

    /// Alert delivery failure
    #[error("Alert delivery error: {0}")]
    AlertDelivery(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl MirageError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Config(_) => 500,
            Self::InvalidInput(_) => 400,
            Self::UpstreamUnavailable(_) => 502,
            Self::Cluster(_) => 503,
            Self::GatewayProgramming(_) => 502,
            Self::AlertDelivery(_) => 502,
            Self::Internal(_) => 500,
            Self::Timeout(_) => 504,
        }
    }

    /// Returns true if this error should be retried on a later tick
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Cluster(_) | Self::GatewayProgramming(_) | Self::AlertDelivery(_) | Self::Timeout(_)
        )
    }
}
