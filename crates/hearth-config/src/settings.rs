use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Controller tunables. Every recognized option and its effect; unknown
/// keys are rejected at load time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Settings {
    /// Status loop tick.
    #[serde(with = "humantime_serde")]
    pub status_period: Duration,
    /// Reconciler loop tick.
    #[serde(with = "humantime_serde")]
    pub reconcile_period: Duration,
    /// System check loop tick.
    #[serde(with = "humantime_serde")]
    pub telemetry_period: Duration,
    /// Init-check loop tick.
    #[serde(with = "humantime_serde")]
    pub init_period: Duration,
    /// Hypervisor VM discovery tick.
    #[serde(with = "humantime_serde")]
    pub discovery_period: Duration,

    /// Hard cap on consecutive init attempts before `init_failed`.
    pub max_init_retries: u32,
    /// Cool-down before re-initializing failed or stale nodes.
    #[serde(with = "humantime_serde")]
    pub reinit_interval: Duration,

    /// Transient dwell for `waking`.
    #[serde(with = "humantime_serde")]
    pub wake_timeout: Duration,
    /// Transient dwell for `suspending`.
    #[serde(with = "humantime_serde")]
    pub suspend_timeout: Duration,
    /// Transient dwell for `stopping`.
    #[serde(with = "humantime_serde")]
    pub stop_timeout: Duration,

    /// Verify the hypervisor API's TLS certificate.
    pub verify_hypervisor_certs: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            status_period: Duration::from_secs(30),
            reconcile_period: Duration::from_secs(10),
            telemetry_period: Duration::from_secs(300),
            init_period: Duration::from_secs(3600),
            discovery_period: Duration::from_secs(300),
            max_init_retries: 3,
            reinit_interval: Duration::from_secs(3600),
            wake_timeout: Duration::from_secs(300),
            suspend_timeout: Duration::from_secs(120),
            stop_timeout: Duration::from_secs(120),
            verify_hypervisor_certs: true,
        }
    }
}
