//! The AttackResponse custom resource.
//!
//! One resource captures the intent "route attacker X to a dedicated decoy
//! fleet until time T". Decoy pods and isolation policies are owned by the
//! resource, so deleting it cascades.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use mirage_common::constants::{DECOY_COUNT, DEFAULT_AUTO_CLEANUP_MINUTES};

/// AttackResponse Custom Resource Definition
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "mirage.dev",
    version = "v1alpha1",
    kind = "AttackResponse",
    namespaced,
    status = "AttackResponseStatus",
    shortname = "ar",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Source", "type":"string", "jsonPath":".spec.sourceIP"}"#,
    printcolumn = r#"{"name":"Attack", "type":"string", "jsonPath":".spec.attackType"}"#,
    printcolumn = r#"{"name":"Cleanup", "type":"string", "jsonPath":".status.cleanupScheduledAt"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AttackResponseSpec {
    /// Upstream services being impersonated
    pub services: Vec<String>,

    /// Decoys to stage, one per variant
    #[serde(default = "default_decoy_count")]
    pub decoy_count: i32,

    /// Minutes until the resource tears itself down
    #[serde(default = "default_auto_cleanup_minutes")]
    pub auto_cleanup_minutes: i64,

    /// Attacker address this response targets
    #[serde(rename = "sourceIP")]
    pub source_ip: String,

    /// Attack kind that triggered the response
    pub attack_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
}

fn default_decoy_count() -> i32 {
    DECOY_COUNT as i32
}

fn default_auto_cleanup_minutes() -> i64 {
    DEFAULT_AUTO_CLEANUP_MINUTES
}

/// Observed state of an AttackResponse
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttackResponseStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,

    /// Names of the staged decoy pods, in variant order
    #[serde(default)]
    pub decoy_pods: Vec<String>,

    /// URLs the gateway fans out across, in variant order
    #[serde(rename = "decoyURLs", default)]
    pub decoy_urls: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup_scheduled_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Lifecycle phase of an AttackResponse.
///
/// `Pending → Creating → Active → deleted at cleanup`; `Creating → Failed`
/// on an irrecoverable create error. There is no way back from `Active`
/// to `Pending`.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, JsonSchema, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Pending,
    Creating,
    Active,
    Failed,
    #[serde(rename = "TerminatingByTTL")]
    TerminatingByTtl,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Pending => "Pending",
            Phase::Creating => "Creating",
            Phase::Active => "Active",
            Phase::Failed => "Failed",
            Phase::TerminatingByTtl => "TerminatingByTTL",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_defaults() {
        let json = r#"{
            "services": ["frontend-api"],
            "sourceIP": "10.0.0.9",
            "attackType": "sqli"
        }"#;
        let spec: AttackResponseSpec = serde_json::from_str(json).unwrap();

        assert_eq!(spec.decoy_count, 3);
        assert_eq!(spec.auto_cleanup_minutes, 15);
        assert_eq!(spec.source_ip, "10.0.0.9");
    }

    #[test]
    fn test_spec_wire_field_names() {
        let spec = AttackResponseSpec {
            services: vec!["frontend-api".into()],
            decoy_count: 3,
            auto_cleanup_minutes: 15,
            source_ip: "10.0.0.9".into(),
            attack_type: "sqli".into(),
            severity: Some("critical".into()),
        };
        let json = serde_json::to_value(&spec).unwrap();

        assert!(json.get("sourceIP").is_some());
        assert!(json.get("attackType").is_some());
        assert!(json.get("autoCleanupMinutes").is_some());
        assert!(json.get("decoyCount").is_some());
    }

    #[test]
    fn test_status_wire_field_names() {
        let status = AttackResponseStatus {
            phase: Some(Phase::Active),
            decoy_pods: vec!["decoy-a".into()],
            decoy_urls: vec!["http://decoy-a:8080".into()],
            created_at: Some("2026-01-01T00:00:00Z".into()),
            cleanup_scheduled_at: Some("2026-01-01T00:15:00Z".into()),
            message: Some("fleet ready".into()),
        };
        let json = serde_json::to_value(&status).unwrap();

        assert_eq!(json["phase"], "Active");
        assert!(json.get("decoyPods").is_some());
        assert!(json.get("decoyURLs").is_some());
        assert!(json.get("cleanupScheduledAt").is_some());
    }

    #[test]
    fn test_phase_display_and_wire() {
        assert_eq!(Phase::TerminatingByTtl.to_string(), "TerminatingByTTL");
        assert_eq!(
            serde_json::to_string(&Phase::TerminatingByTtl).unwrap(),
            "\"TerminatingByTTL\""
        );
        assert_eq!(serde_json::to_string(&Phase::Pending).unwrap(), "\"Pending\"");
    }
}
