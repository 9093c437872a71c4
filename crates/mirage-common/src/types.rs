//! Core types shared across Mirage components.

use serde::{Deserialize, Serialize};

/// Attack classification produced by the sentinel.
///
/// The set is closed; the orchestrator and the gateway treat the value as an
/// opaque tag, but the severity mapping below is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackKind {
    Sqli,
    PathTraversal,
    RateAbuse,
    AuthBruteforce,
}

impl AttackKind {
    /// Fixed kind → severity mapping
    pub fn severity(&self) -> Severity {
        match self {
            Self::Sqli => Severity::Critical,
            Self::PathTraversal => Severity::High,
            Self::AuthBruteforce => Severity::High,
            Self::RateAbuse => Severity::Medium,
        }
    }

    /// Wire name of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqli => "sqli",
            Self::PathTraversal => "path_traversal",
            Self::RateAbuse => "rate_abuse",
            Self::AuthBruteforce => "auth_bruteforce",
        }
    }
}

impl std::fmt::Display for AttackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
        };
        f.write_str(s)
    }
}

/// Behavioral flavor of a honeypot instance.
///
/// `ALL` is both the creation order and the order the gateway's round-robin
/// traverses for a fresh decoy set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecoyVariant {
    /// Behaviorally indistinguishable from the upstream
    Mirror,
    /// Adds a fixed artificial latency per request
    Delayed,
    /// Logs request detail at high fidelity
    Verbose,
}

impl DecoyVariant {
    pub const ALL: [DecoyVariant; 3] = [Self::Mirror, Self::Delayed, Self::Verbose];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mirror => "mirror",
            Self::Delayed => "delayed",
            Self::Verbose => "verbose",
        }
    }

    /// Per-request latency injected by this variant, in milliseconds
    pub fn artificial_latency_ms(&self) -> u64 {
        match self {
            Self::Delayed => 1000,
            _ => 0,
        }
    }

    /// Request logging fidelity for this variant
    pub fn log_detail(&self) -> &'static str {
        match self {
            Self::Verbose => "verbose",
            _ => "normal",
        }
    }
}

impl std::fmt::Display for DecoyVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attack record sent from the sentinel to the orchestrator alert sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Detection time, RFC 3339
    pub timestamp: String,

    pub attack_type: AttackKind,

    pub source_ip: String,

    /// The offending log line, or a summary for windowed detections
    pub evidence: String,

    pub severity: Severity,

    /// Pod whose log stream produced the detection
    pub pod_name: String,
}

impl Alert {
    pub fn new(kind: AttackKind, source_ip: String, evidence: String, pod_name: String) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            attack_type: kind,
            source_ip,
            evidence,
            severity: kind.severity(),
            pod_name,
        }
    }
}

/// Request body for the gateway's `/api/block_ip` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRequest {
    pub source_ip: String,
    pub decoy_urls: Vec<String>,
}

/// Response body for `/api/block_ip`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockResponse {
    pub success: bool,
    pub message: String,
    pub source_ip: String,
    pub decoy_urls: Vec<String>,
}

/// Request body for the gateway's `/api/cleanup` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupRequest {
    pub source_ip: String,
}

/// Response body for `/api/cleanup`. `removed` reports whether an entry
/// was actually present; the call itself is idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupResponse {
    pub success: bool,
    pub message: String,
    pub source_ip: String,
    pub removed: bool,
}

/// Gateway block-table statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayStats {
    pub total_blocked_ips: usize,
    pub blocked_ips: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attack_kind_wire_names() {
        assert_eq!(serde_json::to_string(&AttackKind::Sqli).unwrap(), "\"sqli\"");
        assert_eq!(
            serde_json::to_string(&AttackKind::PathTraversal).unwrap(),
            "\"path_traversal\""
        );
        assert_eq!(
            serde_json::to_string(&AttackKind::AuthBruteforce).unwrap(),
            "\"auth_bruteforce\""
        );
        assert_eq!(
            serde_json::to_string(&AttackKind::RateAbuse).unwrap(),
            "\"rate_abuse\""
        );
    }

    #[test]
    fn test_severity_mapping() {
        assert_eq!(AttackKind::Sqli.severity(), Severity::Critical);
        assert_eq!(AttackKind::PathTraversal.severity(), Severity::High);
        assert_eq!(AttackKind::AuthBruteforce.severity(), Severity::High);
        assert_eq!(AttackKind::RateAbuse.severity(), Severity::Medium);
    }

    #[test]
    fn test_variant_order_and_env() {
        let names: Vec<_> = DecoyVariant::ALL.iter().map(|v| v.as_str()).collect();
        assert_eq!(names, vec!["mirror", "delayed", "verbose"]);

        assert_eq!(DecoyVariant::Mirror.artificial_latency_ms(), 0);
        assert_eq!(DecoyVariant::Delayed.artificial_latency_ms(), 1000);
        assert_eq!(DecoyVariant::Verbose.artificial_latency_ms(), 0);
        assert_eq!(DecoyVariant::Verbose.log_detail(), "verbose");
        assert_eq!(DecoyVariant::Delayed.log_detail(), "normal");
    }

    #[test]
    fn test_alert_round_trip() {
        let alert = Alert::new(
            AttackKind::Sqli,
            "192.168.1.66".to_string(),
            "' OR '1'='1".to_string(),
            "frontend-api-abc".to_string(),
        );

        let json = serde_json::to_string(&alert).unwrap();
        let parsed: Alert = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.attack_type, AttackKind::Sqli);
        assert_eq!(parsed.severity, Severity::Critical);
        assert_eq!(parsed.source_ip, "192.168.1.66");
    }
}
