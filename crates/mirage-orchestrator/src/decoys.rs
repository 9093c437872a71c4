//! Builders for decoy pods and their isolation policies.

use k8s_openapi::api::core::v1::{Container, EnvVar, Pod, PodSpec, ResourceRequirements};
use k8s_openapi::api::networking::v1::{
    NetworkPolicy, NetworkPolicyEgressRule, NetworkPolicyIngressRule, NetworkPolicyPeer,
    NetworkPolicyPort, NetworkPolicySpec,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

use mirage_common::constants::{labels, DECOY_PORT};
use mirage_common::DecoyVariant;

use crate::crd::AttackResponse;

/// Stable, unique decoy pod name for a response/variant pair
pub fn decoy_name(response_name: &str, variant: DecoyVariant) -> String {
    format!("decoy-{response_name}-{variant}")
}

/// URL the gateway uses to reach a decoy
pub fn decoy_url(pod_name: &str) -> String {
    format!("http://{pod_name}:{DECOY_PORT}")
}

fn decoy_labels(ar: &AttackResponse, response_name: &str, variant: DecoyVariant) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), labels::DECOY_APP.to_string()),
        (labels::RESPONSE_KEY.to_string(), response_name.to_string()),
        (labels::VARIANT_KEY.to_string(), variant.to_string()),
        (labels::SOURCE_IP_KEY.to_string(), ar.spec.source_ip.clone()),
        (
            labels::ATTACK_TYPE_KEY.to_string(),
            ar.spec.attack_type.clone(),
        ),
    ])
}

/// Build one decoy pod: the upstream image with per-variant behavior
/// injected through the environment, owned by the AttackResponse so the
/// TTL delete cascades.
pub fn decoy_pod(
    ar: &AttackResponse,
    response_name: &str,
    namespace: &str,
    variant: DecoyVariant,
    image: &str,
    owner: OwnerReference,
) -> Pod {
    let name = decoy_name(response_name, variant);

    let env = vec![
        EnvVar {
            name: "IS_DECOY".to_string(),
            value: Some("true".to_string()),
            ..Default::default()
        },
        EnvVar {
            name: "DECOY_VARIANT".to_string(),
            value: Some(variant.to_string()),
            ..Default::default()
        },
        EnvVar {
            name: "ARTIFICIAL_LATENCY_MS".to_string(),
            value: Some(variant.artificial_latency_ms().to_string()),
            ..Default::default()
        },
        EnvVar {
            name: "LOG_DETAIL".to_string(),
            value: Some(variant.log_detail().to_string()),
            ..Default::default()
        },
    ];

    let quantities = BTreeMap::from([
        ("memory".to_string(), Quantity("40Mi".to_string())),
        ("cpu".to_string(), Quantity("20m".to_string())),
    ]);

    Pod {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(namespace.to_string()),
            labels: Some(decoy_labels(ar, response_name, variant)),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "decoy".to_string(),
                image: Some(image.to_string()),
                image_pull_policy: Some("IfNotPresent".to_string()),
                env: Some(env),
                resources: Some(ResourceRequirements {
                    requests: Some(quantities.clone()),
                    limits: Some(quantities),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Build the isolation policy for one decoy: ingress only from the gateway,
/// egress only to the metrics sink plus DNS.
pub fn decoy_policy(
    response_name: &str,
    namespace: &str,
    pod_name: &str,
    owner: OwnerReference,
) -> NetworkPolicy {
    let pod_selector = LabelSelector {
        match_labels: Some(BTreeMap::from([
            ("app".to_string(), labels::DECOY_APP.to_string()),
            (labels::RESPONSE_KEY.to_string(), response_name.to_string()),
        ])),
        ..Default::default()
    };

    let from_gateway = NetworkPolicyPeer {
        pod_selector: Some(LabelSelector {
            match_labels: Some(BTreeMap::from([(
                "app".to_string(),
                labels::GATEWAY_APP.to_string(),
            )])),
            ..Default::default()
        }),
        ..Default::default()
    };

    let to_metrics_sink = NetworkPolicyPeer {
        pod_selector: Some(LabelSelector {
            match_labels: Some(BTreeMap::from([(
                "app".to_string(),
                labels::METRICS_SINK_APP.to_string(),
            )])),
            ..Default::default()
        }),
        ..Default::default()
    };

    let dns_ports = vec![
        NetworkPolicyPort {
            port: Some(IntOrString::Int(53)),
            protocol: Some("UDP".to_string()),
            ..Default::default()
        },
        NetworkPolicyPort {
            port: Some(IntOrString::Int(53)),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        },
    ];

    NetworkPolicy {
        metadata: ObjectMeta {
            name: Some(format!("decoy-policy-{pod_name}")),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([(
                labels::RESPONSE_KEY.to_string(),
                response_name.to_string(),
            )])),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: Some(NetworkPolicySpec {
            pod_selector,
            policy_types: Some(vec!["Ingress".to_string(), "Egress".to_string()]),
            ingress: Some(vec![NetworkPolicyIngressRule {
                from: Some(vec![from_gateway]),
                ..Default::default()
            }]),
            egress: Some(vec![
                NetworkPolicyEgressRule {
                    to: Some(vec![to_metrics_sink]),
                    ..Default::default()
                },
                NetworkPolicyEgressRule {
                    ports: Some(dns_ports),
                    ..Default::default()
                },
            ]),
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::AttackResponseSpec;

    fn response() -> AttackResponse {
        AttackResponse::new(
            "ar-10-0-0-9-1700000000",
            AttackResponseSpec {
                services: vec!["frontend-api".into()],
                decoy_count: 3,
                auto_cleanup_minutes: 15,
                source_ip: "10.0.0.9".into(),
                attack_type: "sqli".into(),
                severity: Some("critical".into()),
            },
        )
    }

    fn owner() -> OwnerReference {
        OwnerReference {
            api_version: "mirage.dev/v1alpha1".into(),
            kind: "AttackResponse".into(),
            name: "ar-10-0-0-9-1700000000".into(),
            uid: "uid-123".into(),
            controller: Some(true),
            ..Default::default()
        }
    }

    #[test]
    fn test_decoy_names_are_stable_per_variant() {
        assert_eq!(
            decoy_name("ar-x", DecoyVariant::Mirror),
            "decoy-ar-x-mirror"
        );
        assert_eq!(
            decoy_name("ar-x", DecoyVariant::Delayed),
            "decoy-ar-x-delayed"
        );
        assert_eq!(decoy_url("decoy-ar-x-mirror"), "http://decoy-ar-x-mirror:8080");
    }

    #[test]
    fn test_pod_env_per_variant() {
        let ar = response();
        let pod = decoy_pod(
            &ar,
            "ar-10-0-0-9-1700000000",
            "default",
            DecoyVariant::Delayed,
            "frontend-api:latest",
            owner(),
        );

        let env = pod.spec.unwrap().containers[0].env.clone().unwrap();
        let get = |k: &str| {
            env.iter()
                .find(|e| e.name == k)
                .and_then(|e| e.value.clone())
                .unwrap()
        };

        assert_eq!(get("DECOY_VARIANT"), "delayed");
        assert_eq!(get("ARTIFICIAL_LATENCY_MS"), "1000");
        assert_eq!(get("LOG_DETAIL"), "normal");
        assert_eq!(get("IS_DECOY"), "true");
    }

    #[test]
    fn test_pod_owned_and_labeled() {
        let ar = response();
        let pod = decoy_pod(
            &ar,
            "ar-10-0-0-9-1700000000",
            "default",
            DecoyVariant::Mirror,
            "frontend-api:latest",
            owner(),
        );

        let labels = pod.metadata.labels.unwrap();
        assert_eq!(labels["app"], "decoy");
        assert_eq!(labels["source-ip"], "10.0.0.9");
        assert_eq!(labels["attack-type"], "sqli");

        let owners = pod.metadata.owner_references.unwrap();
        assert_eq!(owners[0].kind, "AttackResponse");
        assert_eq!(owners[0].controller, Some(true));
    }

    #[test]
    fn test_policy_isolates_decoys() {
        let policy = decoy_policy(
            "ar-10-0-0-9-1700000000",
            "default",
            "decoy-ar-10-0-0-9-1700000000-mirror",
            owner(),
        );

        let spec = policy.spec.unwrap();
        assert_eq!(
            spec.policy_types,
            Some(vec!["Ingress".to_string(), "Egress".to_string()])
        );

        let ingress = spec.ingress.unwrap();
        let from = ingress[0].from.as_ref().unwrap();
        let ingress_labels = from[0]
            .pod_selector
            .as_ref()
            .unwrap()
            .match_labels
            .as_ref()
            .unwrap();
        assert_eq!(ingress_labels["app"], "manager");

        let egress = spec.egress.unwrap();
        assert_eq!(egress.len(), 2);
        let sink_labels = egress[0].to.as_ref().unwrap()[0]
            .pod_selector
            .as_ref()
            .unwrap()
            .match_labels
            .as_ref()
            .unwrap();
        assert_eq!(sink_labels["app"], "reporter-service");

        // Second rule is DNS on 53
        let dns_ports = egress[1].ports.as_ref().unwrap();
        assert_eq!(dns_ports.len(), 2);
    }
}
