//! The collaborator-facing facade. The external HTTP/WebSocket layer
//! consumes exactly this surface: node listings, desired-state writes,
//! explicit effector invocations, the hot update stream and metric reads.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hearth_command::Commander;
use hearth_config::Config;
use hearth_domain::{Node, NodeId, PowerState, ServerAction};
use hearth_effector::{CommandRunner, HypervisorConnector, WakeSender};
use hearth_metrics::{MetricsSink, TimeSeriesWriter};
use hearth_store::{InMemoryStore, NodeStore, StoreError};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::discovery::Discovery;
use crate::error::ControlError;
use crate::init::Initializer;
use crate::reconcile::Reconciler;
use crate::scheduler::Scheduler;
use crate::status::StatusCheck;
use crate::telemetry::SystemCheck;
use crate::update::{NodeUpdate, UpdateSender};

/// Operator-invoked effector operations. Equivalent to setting the desired
/// state and forcing an immediate reconcile of that node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplicitOp {
    Wake,
    Suspend,
    Shutdown,
    Stop,
}

pub struct Controller {
    store: Arc<dyn NodeStore>,
    sink: MetricsSink,
    writer: Arc<dyn TimeSeriesWriter>,
    reconciler: Arc<Reconciler>,
    scheduler: Arc<Scheduler>,
    updates_rx: Mutex<Option<mpsc::Receiver<NodeUpdate>>>,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl Controller {
    /// Assemble the core from a validated config and the effector seams.
    /// Seeds the store with the configured nodes.
    pub async fn new(
        config: Config,
        writer: Arc<dyn TimeSeriesWriter>,
        runner: Arc<dyn CommandRunner>,
        wol: Arc<dyn WakeSender>,
        connector: Arc<dyn HypervisorConnector>,
    ) -> Result<Self, ControlError> {
        let store: Arc<dyn NodeStore> = Arc::new(InMemoryStore::new());
        for node in config.nodes {
            store.add(node).await?;
        }

        let settings = config.settings;
        let sink = MetricsSink::new(writer.clone());
        let (updates_tx, updates_rx) = UpdateSender::channel();
        let commander = Arc::new(Commander::new(runner));

        let initializer = Arc::new(Initializer::new(
            store.clone(),
            commander.clone(),
            connector.clone(),
            sink.clone(),
            settings.clone(),
        ));
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            commander.clone(),
            wol,
            connector.clone(),
            initializer.clone(),
            sink.clone(),
            updates_tx.clone(),
            settings.clone(),
        ));
        let status = Arc::new(StatusCheck::new(
            store.clone(),
            connector.clone(),
            sink.clone(),
            updates_tx.clone(),
            settings.clone(),
        ));
        let telemetry = Arc::new(SystemCheck::new(
            store.clone(),
            commander.clone(),
            sink.clone(),
            updates_tx.clone(),
            settings.clone(),
        ));
        let discovery = Arc::new(Discovery::new(
            store.clone(),
            commander.clone(),
            connector,
            sink.clone(),
            updates_tx,
        ));

        let scheduler = Arc::new(Scheduler {
            store: store.clone(),
            sink: sink.clone(),
            settings,
            status,
            reconciler: reconciler.clone(),
            telemetry,
            initializer,
            discovery,
        });

        let (stop_tx, stop_rx) = watch::channel(false);

        Ok(Controller {
            store,
            sink,
            writer,
            reconciler,
            scheduler,
            updates_rx: Mutex::new(Some(updates_rx)),
            stop_tx,
            stop_rx,
        })
    }

    /// Start the periodic loops. Call once.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        self.scheduler.spawn(self.stop_rx.clone())
    }

    /// Signal every loop to finish after its current tick. In-flight
    /// effector calls complete; none are cancelled mid-I/O.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    // ── Node access ──────────────────────────────────────────────────────────

    pub async fn list_nodes(&self) -> Vec<Node> {
        self.store.list().await
    }

    pub async fn get_node(&self, id: &NodeId) -> Result<Node, ControlError> {
        self.store
            .get(id)
            .await
            .map_err(|_| ControlError::NotFound(id.to_string()))
    }

    pub async fn actions(&self, id: &NodeId) -> Result<Vec<ServerAction>, ControlError> {
        self.store
            .actions(id)
            .await
            .map_err(|_| ControlError::NotFound(id.to_string()))
    }

    // ── Desired state and effectors ──────────────────────────────────────────

    /// Record the operator's intent. The reconciler converges on its own
    /// tick; use [`explicit_effector`](Self::explicit_effector) to act now.
    pub async fn set_desired_state(
        &self,
        id: &NodeId,
        state: PowerState,
    ) -> Result<(), ControlError> {
        let node = self.get_node(id).await?;
        validate_desired(&node, state)?;
        match self.store.set_desired_state(id, state).await {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound(_)) => Err(ControlError::NotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn explicit_effector(
        &self,
        id: &NodeId,
        op: ExplicitOp,
    ) -> Result<(), ControlError> {
        match op {
            ExplicitOp::Wake => {
                self.set_desired_state(id, PowerState::On).await?;
                self.reconciler.reconcile_node(id, "api").await;
                Ok(())
            }
            ExplicitOp::Suspend => {
                self.set_desired_state(id, PowerState::Suspended).await?;
                self.reconciler.reconcile_node(id, "api").await;
                Ok(())
            }
            ExplicitOp::Shutdown => self.reconciler.force_shutdown(id, "api").await,
            ExplicitOp::Stop => self.reconciler.force_stop(id, "api").await,
        }
    }

    // ── Updates and metrics ──────────────────────────────────────────────────

    /// Take the hot update stream. Single consumer; the HTTP layer fans
    /// out. Returns `None` on a second take.
    pub async fn updates(&self) -> Option<mpsc::Receiver<NodeUpdate>> {
        self.updates_rx.lock().await.take()
    }

    pub async fn latest_metrics(&self, id: &NodeId) -> HashMap<String, f64> {
        self.sink.latest_values(id.as_str()).await
    }

    pub async fn historical_metrics(
        &self,
        id: &NodeId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<HashMap<String, Vec<(DateTime<Utc>, f64)>>, ControlError> {
        Ok(self.writer.query_range(id.as_str(), start, end).await?)
    }

    pub fn tracked_metric_names(&self) -> &'static [&'static str] {
        self.sink.tracked_names()
    }
}

/// Only terminal operator states are accepted, and `stopped` needs a
/// hypervisor behind it.
fn validate_desired(node: &Node, state: PowerState) -> Result<(), ControlError> {
    match state {
        PowerState::On | PowerState::Off | PowerState::Suspended => Ok(()),
        PowerState::Stopped => {
            if node.vm_managed {
                Ok(())
            } else {
                Err(ControlError::InvalidDesiredState {
                    node: node.id.to_string(),
                    state: state.to_string(),
                    reason: "stopped requires a hypervisor-managed VM".to_string(),
                })
            }
        }
        other => Err(ControlError::InvalidDesiredState {
            node: node.id.to_string(),
            state: other.to_string(),
            reason: "not an operator-settable state".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_states_validate() {
        let physical = Node::physical("srv1", "10.0.0.1");
        assert!(validate_desired(&physical, PowerState::On).is_ok());
        assert!(validate_desired(&physical, PowerState::Off).is_ok());
        assert!(validate_desired(&physical, PowerState::Suspended).is_ok());
        assert!(validate_desired(&physical, PowerState::Stopped).is_err());
        assert!(validate_desired(&physical, PowerState::Waking).is_err());
        assert!(validate_desired(&physical, PowerState::Unknown).is_err());

        let mut vm = Node::physical("host1-vm-101", "10.0.0.2");
        vm.vm_managed = true;
        assert!(validate_desired(&vm, PowerState::Stopped).is_ok());
    }
}
