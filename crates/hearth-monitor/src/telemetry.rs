//! The system-check worker: SSH telemetry reads, service scans and the
//! wattage estimate for nodes that are on and initialized.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use hearth_command::Commander;
use hearth_config::Settings;
use hearth_domain::{Node, NodeId, PowerState, ServiceStatus, SystemFamily};
use hearth_effector::SshTarget;
use hearth_metrics::{names, MetricsSink};
use hearth_store::NodeStore;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::update::UpdateSender;

/// Rough draw curve per family: idle baseline plus a load-proportional
/// spread, used when no wall-power meter reports real watts.
pub fn estimate_watts(family: SystemFamily, cpu_percent: f64) -> f64 {
    let (idle, max) = match family {
        SystemFamily::Hypervisor => (45.0, 180.0),
        SystemFamily::Windows => (15.0, 120.0),
        _ => (10.0, 65.0),
    };
    idle + (max - idle) * (cpu_percent.clamp(0.0, 100.0) / 100.0)
}

pub struct SystemCheck {
    store: Arc<dyn NodeStore>,
    commander: Arc<Commander>,
    sink: MetricsSink,
    updates: UpdateSender,
    settings: Settings,
    /// Per-node floor between checks so overlapping ticks don't double up.
    last_checked: Mutex<HashMap<NodeId, Instant>>,
}

impl SystemCheck {
    pub fn new(
        store: Arc<dyn NodeStore>,
        commander: Arc<Commander>,
        sink: MetricsSink,
        updates: UpdateSender,
        settings: Settings,
    ) -> Self {
        SystemCheck {
            store,
            commander,
            sink,
            updates,
            settings,
            last_checked: Mutex::new(HashMap::new()),
        }
    }

    /// Nodes worth spending an SSH session on.
    pub fn eligible(node: &Node) -> bool {
        node.observed == PowerState::On
            && node.initialized
            && matches!(
                node.caps.family,
                Some(SystemFamily::Linux)
                    | Some(SystemFamily::Hypervisor)
                    | Some(SystemFamily::Windows)
            )
    }

    pub async fn check(&self, id: &NodeId) {
        // min-interval enforcement
        {
            let mut guard = self.last_checked.lock().await;
            if let Some(last) = guard.get(id) {
                if last.elapsed() < self.settings.telemetry_period / 2 {
                    debug!(node_id = %id, "telemetry rate-limited");
                    return;
                }
            }
            guard.insert(id.clone(), Instant::now());
        }

        let mut node = match self.store.get(id).await {
            Ok(node) => node,
            Err(e) => {
                warn!(node_id = %id, error = %e, "telemetry skipped");
                return;
            }
        };
        if !Self::eligible(&node) {
            return;
        }

        self.sink
            .push(id.as_str(), names::SYSTEM_CHECK_ATTEMPT, 1.0)
            .await;
        let started = Instant::now();

        let target = SshTarget::for_node(&node);
        let family = node.caps.family.unwrap_or(SystemFamily::Unknown);
        let mut ok_reads = 0u32;
        let mut failed_reads = 0u32;

        match self.commander.cpu_percent(&target, family).await {
            Ok(cpu) => {
                node.snapshot.cpu_percent = Some(cpu);
                self.sink.push(id.as_str(), names::CPU, cpu).await;
                ok_reads += 1;
            }
            Err(e) => {
                warn!(node_id = %id, error = %e, "cpu read failed");
                failed_reads += 1;
            }
        }

        match self.commander.memory(&target, family).await {
            Ok(memory) => {
                self.sink
                    .push(id.as_str(), names::MEMORY, memory.used_percent)
                    .await;
                node.snapshot.memory = Some(memory);
                ok_reads += 1;
            }
            Err(e) => {
                warn!(node_id = %id, error = %e, "memory read failed");
                failed_reads += 1;
            }
        }

        if matches!(family, SystemFamily::Linux | SystemFamily::Hypervisor) {
            match self.commander.load_average(&target, family).await {
                Ok(load) => {
                    node.snapshot.load = Some(load);
                    ok_reads += 1;
                }
                Err(e) => {
                    warn!(node_id = %id, error = %e, "load read failed");
                    failed_reads += 1;
                }
            }

            match self.commander.network_rate(&target, family).await {
                Ok(network) => {
                    self.sink
                        .push(id.as_str(), names::NETWORK, network.rx_bps + network.tx_bps)
                        .await;
                    node.snapshot.network = Some(network);
                    ok_reads += 1;
                }
                Err(e) => {
                    warn!(node_id = %id, error = %e, "network read failed");
                    failed_reads += 1;
                }
            }
        }

        match self.commander.disk(&target, family).await {
            Ok(disk) => {
                node.snapshot.disk = Some(disk);
                ok_reads += 1;
            }
            Err(e) => {
                warn!(node_id = %id, error = %e, "disk read failed");
                failed_reads += 1;
            }
        }

        // wall power when a meter reported it, estimated draw otherwise
        let watts = match (node.snapshot.watts, node.snapshot.cpu_percent) {
            (Some(measured), _) => Some(measured),
            (None, Some(cpu)) => {
                let estimated = estimate_watts(family, cpu);
                node.snapshot.estimated_watts = Some(estimated);
                Some(estimated)
            }
            _ => None,
        };
        if let Some(watts) = watts {
            self.sink.push(id.as_str(), names::WATTAGE, watts).await;
        }

        // service scan plus discovery sweep for new listeners
        let mut services = hearth_probe::scan_services(&node.hostname, &node.services).await;
        let discovered =
            hearth_probe::discover_services(&node.hostname, &node.id, &services).await;
        services.extend(discovered);
        if !services.is_empty() {
            let up = services
                .iter()
                .filter(|s| s.status == ServiceStatus::Up)
                .count();
            let availability = up as f64 / services.len() as f64 * 100.0;
            self.sink
                .push(id.as_str(), names::SERVICE_AVAILABILITY_PERCENT, availability)
                .await;
        }
        node.services = services;

        node.snapshot.taken_at = Some(Utc::now());
        let _ = self.store.update(node).await;

        self.sink
            .push(
                id.as_str(),
                names::SYSTEM_CHECK_DURATION_SECONDS,
                started.elapsed().as_secs_f64(),
            )
            .await;
        let verdict = if ok_reads == 0 && failed_reads > 0 {
            names::SYSTEM_CHECK_FAILURE
        } else {
            names::SYSTEM_CHECK_SUCCESS
        };
        self.sink.push(id.as_str(), verdict, 1.0).await;

        self.updates
            .notify(self.store.as_ref(), &self.sink, id)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_scales_with_load() {
        let idle = estimate_watts(SystemFamily::Linux, 0.0);
        let busy = estimate_watts(SystemFamily::Linux, 100.0);
        assert_eq!(idle, 10.0);
        assert_eq!(busy, 65.0);
        assert!(estimate_watts(SystemFamily::Linux, 50.0) > idle);

        // hypervisors draw more across the curve
        assert!(estimate_watts(SystemFamily::Hypervisor, 0.0) > idle);
    }

    #[test]
    fn estimate_clamps_out_of_range_cpu() {
        assert_eq!(estimate_watts(SystemFamily::Linux, 150.0), 65.0);
        assert_eq!(estimate_watts(SystemFamily::Linux, -5.0), 10.0);
    }

    #[test]
    fn eligibility_requires_on_initialized_and_ssh_family() {
        let mut node = Node::physical("srv1", "10.0.0.1");
        assert!(!SystemCheck::eligible(&node));

        node.observed = PowerState::On;
        node.initialized = true;
        node.caps.family = Some(SystemFamily::Linux);
        assert!(SystemCheck::eligible(&node));

        // VM children carry the hypervisor_vm family and are skipped
        node.caps.family = Some(SystemFamily::HypervisorVm);
        assert!(!SystemCheck::eligible(&node));
    }
}
