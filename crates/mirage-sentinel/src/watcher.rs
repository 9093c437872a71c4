//! Pod discovery: a label-filtered watch that starts one tail worker per
//! Running pod and never tails the same pod twice.

use anyhow::Result;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, ResourceExt};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::pin::pin;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::engine::Engine;
use crate::tailer;

/// Names of pods currently being tailed. Workers deregister themselves on
/// exit so a pod that restarts gets picked up again by the next watch event.
pub type ActiveTails = Arc<Mutex<HashSet<String>>>;

pub async fn run(
    client: Client,
    config: AppConfig,
    engine: Arc<Engine>,
    shutdown_tx: tokio::sync::broadcast::Sender<()>,
) -> Result<()> {
    let pods: Api<Pod> = Api::namespaced(client, &config.namespace);
    let watch_config = watcher::Config::default().labels(&config.watch_labels);

    let active: ActiveTails = Arc::new(Mutex::new(HashSet::new()));

    tracing::info!(
        namespace = %config.namespace,
        labels = %config.watch_labels,
        "Pod watcher started"
    );

    let mut stream = pin!(watcher(pods.clone(), watch_config).applied_objects());
    let mut shutdown = shutdown_tx.subscribe();

    loop {
        tokio::select! {
            event = stream.next() => match event {
                Some(Ok(pod)) => {
                    handle_pod(&pods, pod, &engine, &active, &shutdown_tx);
                }
                Some(Err(e)) => {
                    // The watcher re-lists and reconnects on its own
                    tracing::warn!(error = %e, "Pod watch error");
                }
                None => break,
            },
            _ = shutdown.recv() => {
                tracing::info!("Pod watcher shutting down");
                break;
            }
        }
    }

    Ok(())
}

fn handle_pod(
    pods: &Api<Pod>,
    pod: Pod,
    engine: &Arc<Engine>,
    active: &ActiveTails,
    shutdown_tx: &tokio::sync::broadcast::Sender<()>,
) {
    let name = pod.name_any();

    let running = pod
        .status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .map(|phase| phase == "Running")
        .unwrap_or(false);
    if !running {
        return;
    }

    // One worker per pod; deletions end the stream and free the slot
    {
        let mut guard = active.lock();
        if !guard.insert(name.clone()) {
            return;
        }
    }

    tracing::info!(pod = %name, "Starting log tail worker");

    tokio::spawn(tailer::tail_pod(
        pods.clone(),
        name,
        engine.clone(),
        active.clone(),
        shutdown_tx.subscribe(),
    ));
}
