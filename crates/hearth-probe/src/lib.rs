mod catalog;
mod tcp;

pub use catalog::{catalog_entry, WELL_KNOWN_PORTS};
pub use tcp::{
    discover_services, port_open, reachable, scan_services, DISCOVERY_TIMEOUT,
    REACHABILITY_PORTS, SERVICE_SCAN_TIMEOUT,
};
