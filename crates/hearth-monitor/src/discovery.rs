//! Enumerates VMs beneath initialized hypervisor parents and materializes
//! them as nodes. Idempotent across ticks: child ids are deterministic and
//! an unchanged inventory produces no new records.

use std::net::IpAddr;
use std::sync::Arc;

use hearth_command::Commander;
use hearth_domain::{Node, NodeId, PowerState, SystemFamily, VmInfo};
use hearth_effector::{HypervisorApi, HypervisorConnector, SshTarget};
use hearth_metrics::{names, MetricsSink};
use hearth_store::{NodeStore, StoreError};
use tracing::{debug, info, warn};

use crate::update::UpdateSender;

pub struct Discovery {
    store: Arc<dyn NodeStore>,
    commander: Arc<Commander>,
    connector: Arc<dyn HypervisorConnector>,
    sink: MetricsSink,
    updates: UpdateSender,
}

impl Discovery {
    pub fn new(
        store: Arc<dyn NodeStore>,
        commander: Arc<Commander>,
        connector: Arc<dyn HypervisorConnector>,
        sink: MetricsSink,
        updates: UpdateSender,
    ) -> Self {
        Discovery {
            store,
            commander,
            connector,
            sink,
            updates,
        }
    }

    /// One pass over every initialized hypervisor parent.
    pub async fn tick(&self) {
        for node in self.store.list().await {
            if node.is_hypervisor() && node.initialized {
                self.discover_parent(&node.id).await;
            }
        }
    }

    pub async fn discover_parent(&self, id: &NodeId) {
        let mut parent = match self.store.get(id).await {
            Ok(node) => node,
            Err(e) => {
                warn!(node_id = %id, error = %e, "discovery skipped");
                return;
            }
        };

        // Token first: without it there is no API access at all.
        if parent.api_token.is_none() {
            match self
                .commander
                .create_hypervisor_token(
                    &SshTarget::for_node(&parent),
                    SystemFamily::Hypervisor,
                    &parent.ssh.user,
                )
                .await
            {
                Ok(token) => {
                    info!(node_id = %id, token_id = %token.token_id, "hypervisor API token created");
                    parent.api_token = Some(token);
                    let _ = self.store.update(parent.clone()).await;
                }
                Err(e) => {
                    warn!(node_id = %id, error = %e, "token creation failed, discovery deferred");
                    return;
                }
            }
        }
        let Some(token) = parent.api_token.clone() else {
            return;
        };

        let client = match self.connector.connect(&parent.hostname, &token) {
            Ok(client) => client,
            Err(e) => {
                warn!(node_id = %id, error = %e, "hypervisor connect failed");
                return;
            }
        };

        // Resolve the parent's own cluster node name once.
        if parent.hyp_node.is_none() {
            match client.list_nodes().await {
                Ok(cluster_nodes) => {
                    parent.hyp_node =
                        crate::init::resolve_own_node_name(&parent.hostname, &cluster_nodes);
                    if parent.hyp_node.is_some() {
                        let _ = self.store.update(parent.clone()).await;
                    }
                }
                Err(e) => {
                    warn!(node_id = %id, error = %e, "cluster node listing failed");
                    return;
                }
            }
        }
        let Some(hyp_node) = parent.hyp_node.clone() else {
            warn!(node_id = %id, "hypervisor node name unresolved, discovery deferred");
            return;
        };

        let vms = match client.list_vms(&hyp_node).await {
            Ok(vms) => vms,
            Err(e) => {
                warn!(node_id = %id, error = %e, "vm listing failed");
                return;
            }
        };

        let mut inventory = Vec::new();
        for vm in vms.iter().filter(|vm| !vm.template) {
            inventory.push(VmInfo {
                vmid: vm.vmid,
                name: vm.name.clone(),
                status: vm.status,
                template: false,
            });
            self.materialize_child(&parent, client.as_ref(), &hyp_node, vm)
                .await;
        }

        parent.vms = inventory;
        let _ = self.store.update(parent).await;
        self.updates.notify(self.store.as_ref(), &self.sink, id).await;
    }

    async fn materialize_child(
        &self,
        parent: &Node,
        client: &dyn HypervisorApi,
        hyp_node: &str,
        vm: &hearth_effector::HypVm,
    ) {
        let child_id = NodeId::for_vm(&parent.id, vm.vmid);

        match self.store.get(&child_id).await {
            Err(StoreError::NotFound(_)) => {
                let mut child = Node::vm_child(parent, hyp_node, vm.vmid, &vm.name);
                if let Some(ip) = self.primary_guest_ip(client, hyp_node, vm.vmid).await {
                    child.hostname = ip.to_string();
                }
                child.observed = vm.status.as_power_state();
                // A freshly learned VM should not be reconciled anywhere:
                // its current state is what the operator has.
                child.desired = match child.observed {
                    PowerState::On | PowerState::Stopped | PowerState::Suspended => child.observed,
                    _ => PowerState::Off,
                };

                info!(node_id = %child_id, name = %vm.name, "discovered new vm");
                if let Err(e) = self.store.add(child).await {
                    debug!(node_id = %child_id, error = %e, "vm add raced, skipping");
                    return;
                }
                self.updates
                    .notify(self.store.as_ref(), &self.sink, &child_id)
                    .await;
            }
            Ok(mut child) => {
                let mut changed = false;
                if child.name != vm.name {
                    debug!(node_id = %child_id, from = %child.name, to = %vm.name, "vm renamed");
                    child.name = vm.name.clone();
                    changed = true;
                }
                if let Some(ip) = self.primary_guest_ip(client, hyp_node, vm.vmid).await {
                    let hostname = ip.to_string();
                    if child.hostname != hostname {
                        child.hostname = hostname;
                        changed = true;
                    }
                }
                if changed {
                    let _ = self.store.update(child.clone()).await;
                }

                // The API's answer updates observed state unless a
                // transient dwell is in flight (the state machine owns it).
                if !child.observed.is_transient() {
                    if let Ok(Some(_)) = self
                        .store
                        .update_observed_state(&child_id, vm.status.as_power_state())
                        .await
                    {
                        self.sink
                            .push(child_id.as_str(), names::POWER_STATE_CHANGE, 1.0)
                            .await;
                        self.sink
                            .push(
                                child_id.as_str(),
                                names::power_state_gauge(vm.status.as_power_state()),
                                1.0,
                            )
                            .await;
                        changed = true;
                    }
                }
                if changed {
                    self.updates
                        .notify(self.store.as_ref(), &self.sink, &child_id)
                        .await;
                }
            }
            Err(e) => {
                warn!(node_id = %child_id, error = %e, "child lookup failed");
            }
        }
    }

    async fn primary_guest_ip(
        &self,
        client: &dyn HypervisorApi,
        hyp_node: &str,
        vmid: u32,
    ) -> Option<IpAddr> {
        match client.vm_guest_ips(hyp_node, vmid).await {
            Ok(ips) => ips.into_iter().find(|ip| ip.is_ipv4()),
            // commonly "no guest agent", not worth more than a debug line
            Err(e) => {
                debug!(vmid, error = %e, "guest ip query failed");
                None
            }
        }
    }
}
