//! Bounded, lossy broadcast of lifecycle events for UI collaborators.

use serde::Serialize;
use tokio::sync::broadcast;

/// Capacity of the event ring; once full, the oldest events are dropped
/// for lagging subscribers rather than back-pressuring the reconciler.
const CHANNEL_CAPACITY: usize = 100;

/// One lifecycle event pushed over `/ws`
#[derive(Debug, Clone, Serialize)]
pub struct ObserverEvent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub timestamp: String,
    pub data: serde_json::Value,
}

/// Event kinds
pub const RECEIVED_ALERT: &str = "received_alert";
pub const FLEET_READY: &str = "fleet_ready";
pub const TEARDOWN: &str = "teardown";

/// Handle for publishing and subscribing to observer events.
#[derive(Clone)]
pub struct Observer {
    tx: broadcast::Sender<ObserverEvent>,
}

impl Observer {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event. Nobody listening is fine.
    pub fn publish(&self, kind: &'static str, data: serde_json::Value) {
        let event = ObserverEvent {
            kind,
            timestamp: chrono::Utc::now().to_rfc3339(),
            data,
        };
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ObserverEvent> {
        self.tx.subscribe()
    }
}

impl Default for Observer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let observer = Observer::new();
        let mut rx = observer.subscribe();

        observer.publish(FLEET_READY, serde_json::json!({"source_ip": "10.0.0.9"}));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, "fleet_ready");
        assert_eq!(event.data["source_ip"], "10.0.0.9");
    }

    #[tokio::test]
    async fn test_overflow_drops_oldest() {
        let observer = Observer::new();
        let mut rx = observer.subscribe();

        for i in 0..(CHANNEL_CAPACITY + 10) {
            observer.publish(RECEIVED_ALERT, serde_json::json!({ "seq": i }));
        }

        // The slow subscriber lost the head of the stream, not the tail
        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(n)) => assert!(n >= 10),
            other => panic!("expected lag, got {other:?}"),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        let observer = Observer::new();
        observer.publish(TEARDOWN, serde_json::json!({}));
    }
}
