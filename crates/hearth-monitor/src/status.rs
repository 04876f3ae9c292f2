//! Per-node status worker: gather evidence, run the state machine, record
//! the transition.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hearth_config::Settings;
use hearth_domain::{Node, NodeId, PowerState, VmPowerStatus};
use hearth_effector::HypervisorConnector;
use hearth_metrics::{names, MetricsSink};
use hearth_store::NodeStore;
use tracing::{debug, warn};

use crate::state::{next_state, StatusProbe};
use crate::update::UpdateSender;

const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(2);
const SERVICE_PORT_TIMEOUT: Duration = Duration::from_secs(1);

pub struct StatusCheck {
    store: Arc<dyn NodeStore>,
    connector: Arc<dyn HypervisorConnector>,
    sink: MetricsSink,
    updates: UpdateSender,
    settings: Settings,
}

impl StatusCheck {
    pub fn new(
        store: Arc<dyn NodeStore>,
        connector: Arc<dyn HypervisorConnector>,
        sink: MetricsSink,
        updates: UpdateSender,
        settings: Settings,
    ) -> Self {
        StatusCheck {
            store,
            connector,
            sink,
            updates,
            settings,
        }
    }

    pub async fn check(&self, id: &NodeId) {
        let node = match self.store.get(id).await {
            Ok(node) => node,
            Err(e) => {
                warn!(node_id = %id, error = %e, "status check skipped");
                return;
            }
        };

        let probe = self.gather(&node).await;
        let now = Utc::now();
        let new_state = next_state(&node, &probe, &self.settings, now);

        // transient resolutions carry a duration metric
        let dwell_secs = (now - node.last_state_change)
            .to_std()
            .unwrap_or_default()
            .as_secs_f64();
        if node.observed == PowerState::Waking && new_state == PowerState::On {
            self.sink
                .push(id.as_str(), names::WAKE_DURATION_SECONDS, dwell_secs)
                .await;
        }
        if node.observed == PowerState::Suspending && new_state == PowerState::Suspended {
            self.sink
                .push(id.as_str(), names::SUSPEND_DURATION_SECONDS, dwell_secs)
                .await;
        }

        match self.store.update_observed_state(id, new_state).await {
            Ok(Some(previous)) => {
                debug!(node_id = %id, %previous, current = %new_state, "observed state changed");
                self.sink
                    .push(id.as_str(), names::POWER_STATE_CHANGE, 1.0)
                    .await;
                self.sink
                    .push(id.as_str(), names::power_state_gauge(new_state), 1.0)
                    .await;
                self.updates
                    .notify(self.store.as_ref(), &self.sink, id)
                    .await;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(node_id = %id, error = %e, "state update failed");
                self.sink
                    .push(id.as_str(), names::STATE_UPDATE_ERROR, 1.0)
                    .await;
            }
        }
    }

    async fn gather(&self, node: &Node) -> StatusProbe {
        let mut probe = StatusProbe::default();

        if node.vm_managed {
            probe.hypervisor_status = self.vm_status(node).await;
        }

        probe.reachable = hearth_probe::reachable(&node.hostname, REACHABILITY_TIMEOUT).await;
        if !probe.reachable {
            for service in &node.services {
                if hearth_probe::port_open(&node.hostname, service.port, SERVICE_PORT_TIMEOUT).await
                {
                    probe.any_service_up = true;
                    break;
                }
            }
        }
        probe
    }

    /// The hypervisor's view of a VM-managed node; API trouble reads as
    /// "no answer" and the state machine falls back to probing.
    async fn vm_status(&self, node: &Node) -> Option<VmPowerStatus> {
        let parent_id = node.parent.as_ref()?;
        let parent = self.store.get(parent_id).await.ok()?;
        let token = parent.api_token.as_ref()?;
        let hyp_node = node.hyp_node.clone().or(parent.hyp_node.clone())?;
        let vmid = node.vmid?;

        match self.connector.connect(&parent.hostname, token) {
            Ok(client) => match client.vm_status(&hyp_node, vmid).await {
                Ok(status) => Some(status),
                Err(e) => {
                    debug!(node_id = %node.id, error = %e, "vm status query failed");
                    None
                }
            },
            Err(e) => {
                debug!(node_id = %node.id, error = %e, "hypervisor connect failed");
                None
            }
        }
    }
}
