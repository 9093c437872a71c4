//! Shared constants for Mirage components.

/// Default gateway listen port
pub const DEFAULT_GATEWAY_PORT: u16 = 8080;

/// Default legitimate upstream URL (in-cluster service)
pub const DEFAULT_LEGITIMATE_URL: &str = "http://frontend-api:8080";

/// Default orchestrator alert sink URL
pub const DEFAULT_CONTROLLER_URL: &str = "http://orchestrator:8090/api/alerts";

/// Default gateway base URL seen from the orchestrator
pub const DEFAULT_MANAGER_URL: &str = "http://manager:8080";

/// Default alert-sink listen address
pub const DEFAULT_ALERT_LISTEN_ADDR: &str = "0.0.0.0:8090";

/// Default label selector for upstream pods
pub const DEFAULT_WATCH_LABELS: &str = "app=frontend-api";

/// Requests per address per window before a rate-abuse alert
pub const DEFAULT_RATE_LIMIT_THRESHOLD: u32 = 50;

/// Rate window length in seconds
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Auth failures per address per window before a brute-force alert
pub const DEFAULT_AUTH_FAILURE_LIMIT: u32 = 3;

/// Auth-failure window length in seconds
pub const DEFAULT_AUTH_FAILURE_WINDOW_SECS: u64 = 60;

/// Minimum interval between alert dispatches for one address, in seconds
pub const DEFAULT_COOLDOWN_PERIOD_SECS: u64 = 300;

/// Decoys per attacker, one per variant
pub const DECOY_COUNT: usize = 3;

/// Default minutes until an AttackResponse tears itself down
pub const DEFAULT_AUTO_CLEANUP_MINUTES: i64 = 15;

/// Port decoy pods serve on
pub const DECOY_PORT: u16 = 8080;

/// Timeout for control-plane programming calls (seconds)
pub const PROGRAMMING_TIMEOUT_SECS: u64 = 2;

/// Timeout for alert dispatch (seconds)
pub const ALERT_DISPATCH_TIMEOUT_SECS: u64 = 5;

/// HTTP header names
pub mod headers {
    /// Client chain header, first extraction choice for the source address
    pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

    /// Real-client header, second extraction choice
    pub const X_REAL_IP: &str = "x-real-ip";

    /// Marker set on every request the gateway forwards to a decoy
    pub const X_DECOY_ROUTED: &str = "x-decoy-routed";
}

/// Label keys and values on cluster objects
pub mod labels {
    /// app label carried by every decoy pod
    pub const DECOY_APP: &str = "decoy";

    /// Ties a decoy pod to its owning AttackResponse
    pub const RESPONSE_KEY: &str = "response";

    /// Decoy behavioral variant
    pub const VARIANT_KEY: &str = "decoy-variant";

    /// Attacker address a decoy was staged for
    pub const SOURCE_IP_KEY: &str = "source-ip";

    /// Attack kind that triggered the staging
    pub const ATTACK_TYPE_KEY: &str = "attack-type";

    /// app label the isolation policy ingress rule matches (the gateway)
    pub const GATEWAY_APP: &str = "manager";

    /// app label the isolation policy egress rule matches (metrics sink)
    pub const METRICS_SINK_APP: &str = "reporter-service";
}
