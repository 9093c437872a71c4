//! One log-tail worker per watched pod.

use futures::{AsyncBufReadExt, TryStreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::api::LogParams;
use kube::Api;
use std::sync::Arc;

use crate::engine::Engine;
use crate::watcher::ActiveTails;

/// Follow a pod's log stream until it ends, the pod goes away, or shutdown
/// is requested. Errors end the worker, not the process; the next watch
/// event restarts it.
pub async fn tail_pod(
    pods: Api<Pod>,
    pod_name: String,
    engine: Arc<Engine>,
    active: ActiveTails,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    let params = LogParams {
        follow: true,
        tail_lines: Some(10),
        ..Default::default()
    };

    let stream = match pods.log_stream(&pod_name, &params).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(pod = %pod_name, error = %e, "Failed to open log stream");
            active.lock().remove(&pod_name);
            return;
        }
    };

    tracing::info!(pod = %pod_name, "Streaming pod logs");

    let mut lines = stream.lines();

    loop {
        tokio::select! {
            next = lines.try_next() => match next {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        engine.process_line(line, &pod_name).await;
                    }
                }
                Ok(None) => {
                    tracing::info!(pod = %pod_name, "Log stream ended");
                    break;
                }
                Err(e) => {
                    tracing::warn!(pod = %pod_name, error = %e, "Log stream error");
                    break;
                }
            },
            _ = shutdown.recv() => {
                tracing::debug!(pod = %pod_name, "Tail worker shutting down");
                break;
            }
        }
    }

    active.lock().remove(&pod_name);
}
