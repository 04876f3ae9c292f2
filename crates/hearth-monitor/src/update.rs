use std::collections::HashMap;

use hearth_domain::{Node, NodeId, PowerState, Service};
use hearth_metrics::MetricsSink;
use hearth_store::NodeStore;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::trace;

/// Buffered capacity of the update stream. On overflow updates are dropped;
/// the UI holds last-value semantics, so a dropped intermediate is harmless.
pub const UPDATE_CHANNEL_CAPACITY: usize = 100;

/// One hot-stream event for the external WebSocket layer.
#[derive(Debug, Clone, Serialize)]
pub struct NodeUpdate {
    pub id: NodeId,
    pub observed: PowerState,
    pub services: Vec<Service>,
    pub node: Node,
    pub latest_metrics: HashMap<String, f64>,
}

/// Non-blocking fan-in side of the update stream.
#[derive(Clone)]
pub struct UpdateSender {
    tx: mpsc::Sender<NodeUpdate>,
}

impl UpdateSender {
    pub fn channel() -> (UpdateSender, mpsc::Receiver<NodeUpdate>) {
        let (tx, rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        (UpdateSender { tx }, rx)
    }

    /// Never blocks a worker; a full channel drops the update.
    pub fn send(&self, update: NodeUpdate) {
        if let Err(e) = self.tx.try_send(update) {
            trace!("update dropped: {}", e);
        }
    }

    /// Snapshot a node from the store and emit it.
    pub async fn notify(&self, store: &dyn NodeStore, sink: &MetricsSink, id: &NodeId) {
        let Ok(node) = store.get(id).await else { return };
        let latest_metrics = sink.latest_values(id.as_str()).await;
        self.send(NodeUpdate {
            id: node.id.clone(),
            observed: node.observed,
            services: node.services.clone(),
            latest_metrics,
            node,
        });
    }
}
