//! Alert sink and observer stream endpoints.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use kube::api::PostParams;
use kube::Api;
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;

use mirage_common::Alert;

use crate::crd::{AttackResponse, AttackResponseSpec};
use crate::observer::{self, Observer, ObserverEvent};

/// State shared by the alert-sink handlers
#[derive(Clone)]
pub struct ApiState {
    pub client: kube::Client,
    pub namespace: String,
    pub upstream_service: String,
    pub default_ttl_minutes: i64,
    pub observer: Observer,
}

/// Create the alert-sink router
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/alerts", post(handle_alert))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .with_state(state)
}

#[derive(Serialize)]
struct AlertAccepted {
    success: bool,
    message: String,
    appgraph: String,
}

/// Accept an attack record and turn it into an AttackResponse resource.
///
/// Duplicate alerts for the same address may create additional resources;
/// the gateway's install-overwrites semantics absorb that.
async fn handle_alert(
    State(state): State<ApiState>,
    Json(alert): Json<Alert>,
) -> Result<(StatusCode, Json<AlertAccepted>), (StatusCode, String)> {
    if alert.source_ip.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "source_ip is required".to_string()));
    }

    tracing::info!(
        action = "received_alert",
        source_ip = %alert.source_ip,
        attack_type = %alert.attack_type,
        severity = %alert.severity,
        pod = %alert.pod_name,
        "Alert received"
    );

    state.observer.publish(
        observer::RECEIVED_ALERT,
        json!({
            "source_ip": alert.source_ip,
            "attack_type": alert.attack_type,
            "severity": alert.severity,
            "evidence": alert.evidence,
        }),
    );

    let name = format!(
        "ar-{}-{}",
        alert.source_ip.replace(['.', ':'], "-"),
        Utc::now().timestamp()
    );

    let response = AttackResponse::new(
        &name,
        AttackResponseSpec {
            services: vec![state.upstream_service.clone()],
            decoy_count: mirage_common::constants::DECOY_COUNT as i32,
            auto_cleanup_minutes: state.default_ttl_minutes,
            source_ip: alert.source_ip.clone(),
            attack_type: alert.attack_type.to_string(),
            severity: Some(alert.severity.to_string()),
        },
    );

    let api: Api<AttackResponse> = Api::namespaced(state.client.clone(), &state.namespace);
    api.create(&PostParams::default(), &response)
        .await
        .map_err(|e| {
            tracing::error!(action = "response_create_failed", error = %e, "Failed to create AttackResponse");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create AttackResponse".to_string(),
            )
        })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(AlertAccepted {
            success: true,
            message: "Alert processed and decoys scheduled".to_string(),
            appgraph: name,
        }),
    ))
}

/// Observer stream: lifecycle events pushed as JSON messages
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    let rx = state.observer.subscribe();
    ws.on_upgrade(move |socket| stream_events(socket, rx))
}

async fn stream_events(mut socket: WebSocket, mut rx: broadcast::Receiver<ObserverEvent>) {
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => {
                    let Ok(text) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Lossy by design: a slow consumer loses the oldest events
                    tracing::debug!(skipped, "Observer subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(_)) => {} // ignore client messages, connection stays open
                _ => break,
            },
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "orchestrator",
    }))
}
