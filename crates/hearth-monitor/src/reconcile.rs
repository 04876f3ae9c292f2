//! Drives effectors to converge observed power state onto desired state.
//!
//! The transient state is written to the store *before* any effector I/O
//! starts, so concurrent UI reads and overlapping ticks observe the
//! transition. Effector failure reverts to the prior belief and lands in
//! the action log; the next tick retries, the loop period provides spacing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hearth_command::Commander;
use hearth_config::Settings;
use hearth_domain::{
    ActionKind, Node, NodeId, NodeKind, PowerState, ServerAction, SystemFamily,
};
use hearth_effector::{HypervisorApi, HypervisorConnector, SshTarget, WakeSender};
use hearth_metrics::{names, MetricsSink};
use hearth_store::NodeStore;
use tracing::{debug, info, warn};

use crate::error::ControlError;
use crate::init::{should_attempt_initialization, Initializer};
use crate::update::UpdateSender;

/// Whether the reconcile loop should spend a worker on this node.
pub fn needs_reconcile(node: &Node, settings: &Settings, now: DateTime<Utc>) -> bool {
    node.observed != node.desired || should_attempt_initialization(node, settings, now)
}

pub struct Reconciler {
    store: Arc<dyn NodeStore>,
    commander: Arc<Commander>,
    wol: Arc<dyn WakeSender>,
    connector: Arc<dyn HypervisorConnector>,
    initializer: Arc<Initializer>,
    sink: MetricsSink,
    updates: UpdateSender,
    settings: Settings,
}

impl Reconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn NodeStore>,
        commander: Arc<Commander>,
        wol: Arc<dyn WakeSender>,
        connector: Arc<dyn HypervisorConnector>,
        initializer: Arc<Initializer>,
        sink: MetricsSink,
        updates: UpdateSender,
        settings: Settings,
    ) -> Self {
        Reconciler {
            store,
            commander,
            wol,
            connector,
            initializer,
            sink,
            updates,
            settings,
        }
    }

    /// One reconcile pass over a single node.
    pub async fn reconcile_node(&self, id: &NodeId, initiated_by: &str) {
        let node = match self.store.get(id).await {
            Ok(node) => node,
            Err(e) => {
                warn!(node_id = %id, error = %e, "reconcile skipped");
                return;
            }
        };

        let now = Utc::now();

        // Initialization gate: an on, uninitialized node gets the protocol
        // before any effector. Down nodes may be powered without completed
        // initialization (waking is the only way to ever initialize them).
        if should_attempt_initialization(&node, &self.settings, now)
            && node.observed == PowerState::On
        {
            self.initializer.run(id).await;
            return;
        }

        if node.observed == node.desired {
            return;
        }
        // Transients are owned by the state machine's dwell; issuing a
        // second effector inside the window would double-fire.
        if node.observed.is_transient() {
            return;
        }
        if node.observed == PowerState::InitFailed {
            return;
        }

        match (node.desired, node.observed) {
            (PowerState::On, observed) if observed.is_down() => {
                self.wake(&node, initiated_by).await;
            }
            (PowerState::Suspended, PowerState::On) => {
                self.suspend(&node, initiated_by).await;
            }
            (PowerState::Stopped, PowerState::On) => {
                if node.vm_managed {
                    self.shutdown_vm(&node, initiated_by).await;
                } else {
                    debug!(node_id = %id, "stopped is only reachable for hypervisor-managed nodes");
                }
            }
            (desired, observed) => {
                debug!(node_id = %id, %desired, %observed, "no effector for this combination");
            }
        }
    }

    // ── Power operations ─────────────────────────────────────────────────────

    async fn wake(&self, node: &Node, initiated_by: &str) {
        // Parent-before-child: a child is never woken while its parent is
        // down. Bump the parent's desired state and let convergence carry
        // the child on a later tick.
        if let Some(parent_id) = &node.parent {
            match self.store.get(parent_id).await {
                Ok(parent) if parent.observed != PowerState::On => {
                    if parent.observed.is_down() && parent.desired != PowerState::On {
                        info!(
                            node_id = %node.id,
                            parent_id = %parent_id,
                            "parent is down, waking it first"
                        );
                        let _ = self
                            .store
                            .set_desired_state(parent_id, PowerState::On)
                            .await;
                    }
                    debug!(node_id = %node.id, "deferring wake until parent is on");
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(node_id = %node.id, error = %e, "parent lookup failed, deferring wake");
                    return;
                }
            }
        }

        let prior = node.observed;
        if !self.mark_transient(&node.id, PowerState::Waking).await {
            return;
        }
        self.sink
            .push(node.id.as_str(), names::WAKE_ATTEMPT, 1.0)
            .await;

        let result: Result<(), String> = match node.kind() {
            NodeKind::Physical => match node.mac {
                Some(mac) => self
                    .wol
                    .send_magic_packet(mac)
                    .await
                    .map_err(|e| e.to_string()),
                None => Err("no hardware address configured".to_string()),
            },
            NodeKind::HypervisorVm => match self.hypervisor_for(node).await {
                Ok((client, hyp_node, vmid)) => {
                    // a suspended VM resumes; everything else cold-starts
                    let call = if prior == PowerState::Suspended {
                        client.vm_resume(&hyp_node, vmid).await
                    } else {
                        client.vm_start(&hyp_node, vmid).await
                    };
                    call.map_err(|e| e.to_string())
                }
                Err(msg) => Err(msg),
            },
        };

        self.finish(
            &node.id,
            ActionKind::Wake,
            prior,
            result,
            initiated_by,
            Some(names::WAKE_SUCCESS),
            Some(names::WAKE_FAILURE),
        )
        .await;
    }

    async fn suspend(&self, node: &Node, initiated_by: &str) {
        let prior = node.observed;
        if !self.mark_transient(&node.id, PowerState::Suspending).await {
            return;
        }
        self.sink
            .push(node.id.as_str(), names::SUSPEND_ATTEMPT, 1.0)
            .await;

        let result: Result<(), String> = match node.kind() {
            NodeKind::Physical => {
                let family = node.caps.family.unwrap_or(SystemFamily::Unknown);
                self.commander
                    .suspend(&SshTarget::for_node(node), family)
                    .await
                    .map_err(|e| e.to_string())
            }
            NodeKind::HypervisorVm => match self.hypervisor_for(node).await {
                Ok((client, hyp_node, vmid)) => client
                    .vm_suspend(&hyp_node, vmid)
                    .await
                    .map_err(|e| e.to_string()),
                Err(msg) => Err(msg),
            },
        };

        self.finish(
            &node.id,
            ActionKind::Suspend,
            prior,
            result,
            initiated_by,
            Some(names::SUSPEND_SUCCESS),
            Some(names::SUSPEND_FAILURE),
        )
        .await;
    }

    /// Graceful ACPI shutdown of a VM, driving toward `stopped`.
    async fn shutdown_vm(&self, node: &Node, initiated_by: &str) {
        let prior = node.observed;
        if !self.mark_transient(&node.id, PowerState::Stopping).await {
            return;
        }

        let result: Result<(), String> = match self.hypervisor_for(node).await {
            Ok((client, hyp_node, vmid)) => client
                .vm_shutdown(&hyp_node, vmid)
                .await
                .map_err(|e| e.to_string()),
            Err(msg) => Err(msg),
        };

        self.finish(
            &node.id,
            ActionKind::Shutdown,
            prior,
            result,
            initiated_by,
            None,
            None,
        )
        .await;
    }

    // ── Explicit operations (operator-invoked) ───────────────────────────────

    /// Shut a node down now: graceful API shutdown for VMs, SSH poweroff
    /// for physical hosts. Also aligns the desired state so the reconciler
    /// does not wake it back up.
    pub async fn force_shutdown(&self, id: &NodeId, initiated_by: &str) -> Result<(), ControlError> {
        let node = self
            .store
            .get(id)
            .await
            .map_err(|_| ControlError::NotFound(id.to_string()))?;
        if node.observed.is_transient() {
            return Ok(());
        }

        let desired = if node.vm_managed {
            PowerState::Stopped
        } else {
            PowerState::Off
        };
        self.store.set_desired_state(id, desired).await?;

        let prior = node.observed;
        if !self.mark_transient(id, PowerState::Stopping).await {
            return Ok(());
        }

        let result: Result<(), String> = match node.kind() {
            NodeKind::HypervisorVm => match self.hypervisor_for(&node).await {
                Ok((client, hyp_node, vmid)) => client
                    .vm_shutdown(&hyp_node, vmid)
                    .await
                    .map_err(|e| e.to_string()),
                Err(msg) => Err(msg),
            },
            NodeKind::Physical => {
                let family = node.caps.family.unwrap_or(SystemFamily::Unknown);
                self.commander
                    .shutdown(&SshTarget::for_node(&node), family)
                    .await
                    .map_err(|e| e.to_string())
            }
        };

        self.finish(id, ActionKind::Shutdown, prior, result, initiated_by, None, None)
            .await;
        Ok(())
    }

    /// Hard stop, hypervisor-managed VMs only.
    pub async fn force_stop(&self, id: &NodeId, initiated_by: &str) -> Result<(), ControlError> {
        let node = self
            .store
            .get(id)
            .await
            .map_err(|_| ControlError::NotFound(id.to_string()))?;
        if !node.vm_managed {
            return Err(ControlError::InvalidDesiredState {
                node: id.to_string(),
                state: "stopped".to_string(),
                reason: "hard stop requires a hypervisor-managed VM".to_string(),
            });
        }
        if node.observed.is_transient() {
            return Ok(());
        }

        self.store.set_desired_state(id, PowerState::Stopped).await?;

        let prior = node.observed;
        if !self.mark_transient(id, PowerState::Stopping).await {
            return Ok(());
        }

        let result: Result<(), String> = match self.hypervisor_for(&node).await {
            Ok((client, hyp_node, vmid)) => client
                .vm_stop(&hyp_node, vmid)
                .await
                .map_err(|e| e.to_string()),
            Err(msg) => Err(msg),
        };

        self.finish(id, ActionKind::Stop, prior, result, initiated_by, None, None)
            .await;
        Ok(())
    }

    // ── Plumbing ─────────────────────────────────────────────────────────────

    /// Flip to the transient state and make it visible before effector I/O.
    async fn mark_transient(&self, id: &NodeId, state: PowerState) -> bool {
        if self.store.update_observed_state(id, state).await.is_err() {
            return false;
        }
        self.updates
            .notify(self.store.as_ref(), &self.sink, id)
            .await;
        true
    }

    /// Record the outcome: action log, metrics, and on failure a revert
    /// from the transient to the prior belief.
    #[allow(clippy::too_many_arguments)]
    async fn finish(
        &self,
        id: &NodeId,
        kind: ActionKind,
        prior: PowerState,
        result: Result<(), String>,
        initiated_by: &str,
        ok_metric: Option<&'static str>,
        fail_metric: Option<&'static str>,
    ) {
        match result {
            Ok(()) => {
                info!(node_id = %id, action = %kind, "effector dispatched");
                let _ = self
                    .store
                    .append_action(id, ServerAction::success(kind, initiated_by))
                    .await;
                if let Some(metric) = ok_metric {
                    self.sink.push(id.as_str(), metric, 1.0).await;
                }
            }
            Err(message) => {
                warn!(node_id = %id, action = %kind, error = %message, "effector failed");
                let _ = self
                    .store
                    .append_action(id, ServerAction::failure(kind, initiated_by, message))
                    .await;
                if let Some(metric) = fail_metric {
                    self.sink.push(id.as_str(), metric, 1.0).await;
                }
                let back = if prior.is_transient() {
                    PowerState::Unknown
                } else {
                    prior
                };
                let _ = self.store.update_observed_state(id, back).await;
            }
        }
        self.updates
            .notify(self.store.as_ref(), &self.sink, id)
            .await;
    }

    /// Resolve the API client, cluster node name and vmid for a VM-managed
    /// node through its parent record.
    async fn hypervisor_for(
        &self,
        node: &Node,
    ) -> Result<(Arc<dyn HypervisorApi>, String, u32), String> {
        let parent_id = node
            .parent
            .as_ref()
            .ok_or_else(|| "vm-managed node has no parent".to_string())?;
        let parent = self
            .store
            .get(parent_id)
            .await
            .map_err(|e| e.to_string())?;
        let token = parent
            .api_token
            .as_ref()
            .ok_or_else(|| format!("parent '{}' has no API token", parent_id))?;
        let client = self
            .connector
            .connect(&parent.hostname, token)
            .map_err(|e| e.to_string())?;
        let hyp_node = node
            .hyp_node
            .clone()
            .or_else(|| parent.hyp_node.clone())
            .ok_or_else(|| "hypervisor node name unresolved".to_string())?;
        let vmid = node
            .vmid
            .ok_or_else(|| "vm-managed node has no vmid".to_string())?;
        Ok((client, hyp_node, vmid))
    }
}
