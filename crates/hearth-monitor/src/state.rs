//! Per-node derivation of observed power state from black-box evidence.
//!
//! The rules run in order; the first match wins. Observation alone cannot
//! tell `off` from `suspended`, so a prior `suspended` belief is preserved
//! when nothing responds; with no such belief the fallback is `off`.

use chrono::{DateTime, Utc};
use hearth_config::Settings;
use hearth_domain::{Node, PowerState, VmPowerStatus};

/// Evidence gathered for one status tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusProbe {
    /// Any high-probability TCP port accepted a connection.
    pub reachable: bool,
    /// Any configured service port accepted a connection.
    pub any_service_up: bool,
    /// The hypervisor's view, for VM-managed nodes when the API answered.
    pub hypervisor_status: Option<VmPowerStatus>,
}

impl StatusProbe {
    fn up_evidence(&self) -> bool {
        self.reachable
            || self.any_service_up
            || self.hypervisor_status == Some(VmPowerStatus::Running)
    }
}

/// Compute the next observed state.
pub fn next_state(
    node: &Node,
    probe: &StatusProbe,
    settings: &Settings,
    now: DateTime<Utc>,
) -> PowerState {
    // 1. init-failed dwell: hold the verdict until the cool-down elapses.
    if node.observed == PowerState::InitFailed {
        let within_dwell = node
            .last_init_attempt
            .map(|at| {
                (now - at).to_std().unwrap_or_default() < settings.reinit_interval
            })
            .unwrap_or(true);
        if within_dwell {
            return PowerState::InitFailed;
        }
    }

    // 2. transient dwell
    let dwell = (now - node.last_state_change).to_std().unwrap_or_default();
    match node.observed {
        PowerState::Waking => {
            if probe.up_evidence() {
                return PowerState::On;
            }
            if dwell > settings.wake_timeout {
                // The hypervisor is authoritative once the dwell resolves.
                return probe
                    .hypervisor_status
                    .map(|s| s.as_power_state())
                    .unwrap_or(PowerState::Off);
            }
            return PowerState::Waking;
        }
        PowerState::Suspending => {
            if !probe.up_evidence() {
                return PowerState::Suspended;
            }
            if dwell > settings.suspend_timeout {
                return PowerState::On;
            }
            return PowerState::Suspending;
        }
        PowerState::Stopping => {
            if !probe.up_evidence() {
                return PowerState::Stopped;
            }
            if dwell > settings.stop_timeout {
                return PowerState::On;
            }
            return PowerState::Stopping;
        }
        _ => {}
    }

    // 3. hypervisor-managed VM: the API's answer wins when it answered.
    if node.vm_managed {
        if let Some(status) = probe.hypervisor_status {
            return status.as_power_state();
        }
    }

    // 4. plain probing
    if probe.up_evidence() {
        PowerState::On
    } else if node.observed == PowerState::Suspended {
        PowerState::Suspended
    } else {
        PowerState::Off
    }
}
