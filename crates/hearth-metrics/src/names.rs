//! The metric vocabulary shared with the UI. Names are stable; renaming one
//! breaks stored history.

use hearth_domain::PowerState;

/// Node id used for fleet-wide overview series.
pub const SYSTEM_NODE_ID: &str = "_system";

// Resource
pub const CPU: &str = "cpu";
pub const MEMORY: &str = "memory";
pub const NETWORK: &str = "network";
pub const WATTAGE: &str = "wattage";

// Power
pub const POWER_STATE_CHANGE: &str = "power_state_change";

/// Per-state gauge name; pushed as 1.0 for the current state.
pub fn power_state_gauge(state: PowerState) -> &'static str {
    match state {
        PowerState::On => "power_state_on",
        PowerState::Off => "power_state_off",
        PowerState::Stopped => "power_state_stopped",
        PowerState::Suspended => "power_state_suspended",
        PowerState::InitFailed => "power_state_init_failed",
        PowerState::Waking => "power_state_waking",
        PowerState::Suspending => "power_state_suspending",
        PowerState::Stopping => "power_state_stopping",
        PowerState::Unknown => "power_state_unknown",
    }
}

// Operations
pub const WAKE_ATTEMPT: &str = "wake_attempt";
pub const WAKE_SUCCESS: &str = "wake_success";
pub const WAKE_FAILURE: &str = "wake_failure";
pub const WAKE_DURATION_SECONDS: &str = "wake_duration_seconds";
pub const SUSPEND_ATTEMPT: &str = "suspend_attempt";
pub const SUSPEND_SUCCESS: &str = "suspend_success";
pub const SUSPEND_FAILURE: &str = "suspend_failure";
pub const SUSPEND_DURATION_SECONDS: &str = "suspend_duration_seconds";

// Initialization
pub const INIT_ATTEMPT: &str = "init_attempt";
pub const INIT_SUCCESS: &str = "init_success";
pub const INIT_FAILURE: &str = "init_failure";
pub const INIT_DURATION_SECONDS: &str = "init_duration_seconds";
pub const INIT_RETRY_COUNT: &str = "init_retry_count";
pub const INIT_STATE_RESET: &str = "init_state_reset";
pub const INIT_MAX_RETRIES_EXCEEDED: &str = "init_max_retries_exceeded";

// System checks
pub const SYSTEM_CHECK_ATTEMPT: &str = "system_check_attempt";
pub const SYSTEM_CHECK_SUCCESS: &str = "system_check_success";
pub const SYSTEM_CHECK_FAILURE: &str = "system_check_failure";
pub const SYSTEM_CHECK_DURATION_SECONDS: &str = "system_check_duration_seconds";
pub const SERVICE_AVAILABILITY_PERCENT: &str = "service_availability_percent";
pub const STATE_UPDATE_ERROR: &str = "state_update_error";

// Overview (node_id = SYSTEM_NODE_ID)
pub const MONITORING_CYCLE: &str = "monitoring_cycle";
pub const MONITORING_SERVER_COUNT: &str = "monitoring_server_count";
pub const SYSTEM_CHECK_CYCLE: &str = "system_check_cycle";
pub const TOTAL_SERVERS: &str = "total_servers";
pub const ONLINE_SERVERS: &str = "online_servers";
pub const CHECKED_SERVERS: &str = "checked_servers";

/// Names surfaced to the UI for per-node metric discovery.
pub const TRACKED: &[&str] = &[
    CPU,
    MEMORY,
    NETWORK,
    WATTAGE,
    POWER_STATE_CHANGE,
    WAKE_ATTEMPT,
    WAKE_SUCCESS,
    WAKE_FAILURE,
    WAKE_DURATION_SECONDS,
    SUSPEND_ATTEMPT,
    SUSPEND_SUCCESS,
    SUSPEND_FAILURE,
    SUSPEND_DURATION_SECONDS,
    INIT_ATTEMPT,
    INIT_SUCCESS,
    INIT_FAILURE,
    INIT_DURATION_SECONDS,
    SYSTEM_CHECK_DURATION_SECONDS,
    SERVICE_AVAILABILITY_PERCENT,
];
