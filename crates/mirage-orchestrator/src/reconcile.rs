//! AttackResponse reconciliation: decoy fleet, isolation, gateway entry,
//! TTL teardown.

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::networking::v1::NetworkPolicy;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::runtime::controller::Action;
use kube::{Client, Resource, ResourceExt};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use mirage_common::DecoyVariant;

use crate::crd::{AttackResponse, Phase};
use crate::decoys;
use crate::gateway::GatewayClient;
use crate::observer::{self, Observer};

/// Consecutive decoy-creation failures tolerated before the resource is
/// parked in `Failed` until its TTL removes it.
const MAX_CREATE_FAILURES: u32 = 5;

/// Delay between decoy creations, to spread startup cost
const CREATE_STAGGER: Duration = Duration::from_millis(500);

/// Upper bound on the requeue interval; the TTL check runs at least this
/// often.
const RECONCILE_PERIOD: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Decoy creation failed: {0}")]
    DecoyCreation(String),

    #[error("Resource has no usable metadata: {0}")]
    MissingMeta(String),
}

/// Shared reconciler context
pub struct Context {
    pub client: Client,
    pub namespace: String,
    pub decoy_image: String,
    pub gateway: GatewayClient,
    pub observer: Observer,
    failures: Mutex<HashMap<String, u32>>,
}

impl Context {
    pub fn new(
        client: Client,
        namespace: String,
        decoy_image: String,
        gateway: GatewayClient,
        observer: Observer,
    ) -> Self {
        Self {
            client,
            namespace,
            decoy_image,
            gateway,
            observer,
            failures: Mutex::new(HashMap::new()),
        }
    }
}

pub async fn reconcile(ar: Arc<AttackResponse>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = ar.name_any();
    let api: Api<AttackResponse> = Api::namespaced(ctx.client.clone(), &ctx.namespace);

    tracing::debug!(action = "reconcile", resource = %name, "Processing AttackResponse");

    let status = ar.status.clone().unwrap_or_default();

    // Fresh resource: stamp phase and schedule, then run again immediately
    if status.phase.is_none() {
        let now = Utc::now();
        let cleanup = now + chrono::Duration::minutes(ar.spec.auto_cleanup_minutes);
        patch_status(
            &api,
            &name,
            json!({
                "phase": Phase::Pending,
                "createdAt": now.to_rfc3339(),
                "cleanupScheduledAt": cleanup.to_rfc3339(),
            }),
        )
        .await?;
        return Ok(Action::requeue(Duration::ZERO));
    }

    // TTL reached: tear the whole response down
    if let Some(due) = status.cleanup_scheduled_at.as_deref().and_then(parse_rfc3339) {
        if Utc::now() >= due {
            return teardown(&api, &ar, &ctx, &name).await;
        }
    }

    if matches!(status.phase, Some(Phase::Pending) | Some(Phase::Creating)) {
        return provision(&api, &ar, &ctx, &name).await;
    }

    // Active or Failed: just keep the TTL check coming
    Ok(Action::requeue(requeue_delay(
        status.cleanup_scheduled_at.as_deref(),
    )))
}

pub fn error_policy(_ar: Arc<AttackResponse>, err: &Error, _ctx: Arc<Context>) -> Action {
    tracing::warn!(action = "reconcile_error", error = %err, "Requeueing with backoff");
    Action::requeue(Duration::from_secs(5))
}

/// Delete the resource (cascading to its decoys and policies) and release
/// the gateway entry afterwards. Until the clear lands, the gateway's
/// decoy-unreachable handling covers the window.
async fn teardown(
    api: &Api<AttackResponse>,
    ar: &AttackResponse,
    ctx: &Arc<Context>,
    name: &str,
) -> Result<Action, Error> {
    tracing::info!(
        action = "teardown",
        resource = %name,
        source_ip = %ar.spec.source_ip,
        "TTL reached, deleting response"
    );

    ctx.observer.publish(
        observer::TEARDOWN,
        json!({ "name": name, "source_ip": ar.spec.source_ip }),
    );

    // Best-effort phase marker; the delete below is what matters
    let _ = patch_status(api, name, json!({ "phase": Phase::TerminatingByTtl })).await;

    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => {}
        Err(kube::Error::Api(e)) if e.code == 404 => {}
        Err(e) => return Err(e.into()),
    }

    if let Err(e) = ctx.gateway.clear_block(&ar.spec.source_ip).await {
        // The entry points at pods that are on their way out; the gateway
        // answers those with its defined decoy-unreachable error until a
        // later clear or reinstall lands
        tracing::warn!(
            action = "gateway_clear_failed",
            source_ip = %ar.spec.source_ip,
            error = %e,
            "Gateway entry not cleared during teardown"
        );
    }

    ctx.failures.lock().remove(name);

    Ok(Action::await_change())
}

/// Drive a Pending/Creating resource toward Active: stage the missing
/// decoys (variant order, staggered), then program the gateway, then flip
/// the phase. Idempotent; every step tolerates re-running.
async fn provision(
    api: &Api<AttackResponse>,
    ar: &AttackResponse,
    ctx: &Arc<Context>,
    name: &str,
) -> Result<Action, Error> {
    let status = ar.status.clone().unwrap_or_default();

    if status.phase == Some(Phase::Pending) {
        patch_status(api, name, json!({ "phase": Phase::Creating })).await?;
    }

    let owner = ar
        .controller_owner_ref(&())
        .ok_or_else(|| Error::MissingMeta(name.to_string()))?;

    let pods: Api<Pod> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
    let policies: Api<NetworkPolicy> = Api::namespaced(ctx.client.clone(), &ctx.namespace);

    let mut decoy_pods = status.decoy_pods.clone();
    let mut decoy_urls = status.decoy_urls.clone();

    let wanted: Vec<DecoyVariant> = DecoyVariant::ALL
        .into_iter()
        .take(ar.spec.decoy_count.max(0) as usize)
        .collect();

    let mut created_any = false;
    for variant in wanted {
        let pod_name = decoys::decoy_name(name, variant);
        if decoy_pods.contains(&pod_name) {
            continue;
        }

        if created_any {
            tokio::time::sleep(CREATE_STAGGER).await;
        }

        let pod = decoys::decoy_pod(ar, name, &ctx.namespace, variant, &ctx.decoy_image, owner.clone());
        match pods.create(&PostParams::default(), &pod).await {
            Ok(_) => {}
            // A previous pass got this far before losing its status patch
            Err(kube::Error::Api(e)) if e.code == 409 => {}
            Err(e) => return fail_creation(api, ctx, name, e.to_string()).await,
        }
        created_any = true;

        tracing::info!(
            action = "decoy_created",
            resource = %name,
            pod = %pod_name,
            variant = %variant,
            source_ip = %ar.spec.source_ip,
            "Decoy staged"
        );

        let policy = decoys::decoy_policy(name, &ctx.namespace, &pod_name, owner.clone());
        match policies.create(&PostParams::default(), &policy).await {
            Ok(_) => {}
            Err(kube::Error::Api(e)) if e.code == 409 => {}
            Err(e) => {
                tracing::warn!(
                    action = "policy_create_failed",
                    pod = %pod_name,
                    error = %e,
                    "Isolation policy not created"
                );
            }
        }

        decoy_pods.push(pod_name.clone());
        decoy_urls.push(decoys::decoy_url(&pod_name));

        patch_status(
            api,
            name,
            json!({ "decoyPods": decoy_pods, "decoyURLs": decoy_urls }),
        )
        .await?;
    }

    ctx.failures.lock().remove(name);

    // Every decoy exists and is recorded; only now is the gateway allowed
    // to see them. On failure the status stays short of Active and the
    // install is retried.
    if let Err(e) = ctx
        .gateway
        .install_block(&ar.spec.source_ip, &decoy_urls)
        .await
    {
        tracing::warn!(
            action = "gateway_install_failed",
            resource = %name,
            source_ip = %ar.spec.source_ip,
            error = %e,
            "Gateway install failed, retrying"
        );
        return Ok(Action::requeue(Duration::from_secs(5)));
    }

    patch_status(
        api,
        name,
        json!({ "phase": Phase::Active, "message": "fleet ready" }),
    )
    .await?;

    ctx.observer.publish(
        observer::FLEET_READY,
        json!({
            "name": name,
            "source_ip": ar.spec.source_ip,
            "decoy_urls": decoy_urls,
            "count": decoy_pods.len(),
        }),
    );

    tracing::info!(
        action = "fleet_ready",
        resource = %name,
        source_ip = %ar.spec.source_ip,
        decoys = decoy_pods.len(),
        "Response active"
    );

    Ok(Action::requeue(requeue_delay(
        status.cleanup_scheduled_at.as_deref(),
    )))
}

/// Count a creation failure; park the resource in Failed once the cap is
/// reached, otherwise surface the error so the controller backs off.
async fn fail_creation(
    api: &Api<AttackResponse>,
    ctx: &Arc<Context>,
    name: &str,
    message: String,
) -> Result<Action, Error> {
    let attempts = {
        let mut failures = ctx.failures.lock();
        let entry = failures.entry(name.to_string()).or_insert(0);
        *entry += 1;
        *entry
    };

    tracing::error!(
        action = "decoy_create_failed",
        resource = %name,
        attempts,
        error = %message,
        "Decoy creation failed"
    );

    if attempts >= MAX_CREATE_FAILURES {
        patch_status(
            api,
            name,
            json!({ "phase": Phase::Failed, "message": message }),
        )
        .await?;
        // Failed resources sit until the TTL deletes them
        return Ok(Action::requeue(RECONCILE_PERIOD));
    }

    Err(Error::DecoyCreation(message))
}

async fn patch_status(
    api: &Api<AttackResponse>,
    name: &str,
    status: serde_json::Value,
) -> Result<(), Error> {
    api.patch_status(
        name,
        &PatchParams::default(),
        &Patch::Merge(json!({ "status": status })),
    )
    .await?;
    Ok(())
}

fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Requeue at `min(reconcile period, time until cleanup)` so the TTL pass
/// runs near the deadline.
fn requeue_delay(cleanup_scheduled_at: Option<&str>) -> Duration {
    let Some(due) = cleanup_scheduled_at.and_then(parse_rfc3339) else {
        return RECONCILE_PERIOD;
    };

    let until = (due - Utc::now()).num_seconds();
    if until <= 0 {
        Duration::from_secs(1)
    } else {
        RECONCILE_PERIOD.min(Duration::from_secs(until as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rfc3339() {
        assert!(parse_rfc3339("2026-01-01T00:00:00Z").is_some());
        assert!(parse_rfc3339("2026-01-01T00:00:00+02:00").is_some());
        assert!(parse_rfc3339("not a time").is_none());
    }

    #[test]
    fn test_requeue_caps_at_reconcile_period() {
        let far = (Utc::now() + chrono::Duration::minutes(30)).to_rfc3339();
        assert_eq!(requeue_delay(Some(far.as_str())), RECONCILE_PERIOD);
        assert_eq!(requeue_delay(None), RECONCILE_PERIOD);
    }

    #[test]
    fn test_requeue_tracks_imminent_deadline() {
        let soon = (Utc::now() + chrono::Duration::seconds(10)).to_rfc3339();
        let delay = requeue_delay(Some(soon.as_str()));
        assert!(delay <= Duration::from_secs(10));
        assert!(delay >= Duration::from_secs(1));

        let past = (Utc::now() - chrono::Duration::seconds(10)).to_rfc3339();
        assert_eq!(requeue_delay(Some(past.as_str())), Duration::from_secs(1));
    }
}
