use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use hearth_domain::{NodeId, Service, ServiceStatus, Source};
use tokio::net::TcpStream;
use tracing::trace;

use crate::catalog::WELL_KNOWN_PORTS;

/// Ports tried by the blanket reachability probe, highest hit-rate first.
pub const REACHABILITY_PORTS: &[u16] = &[22, 80, 443, 3389, 5900];

/// Per-port timeout for scanning declared services.
pub const SERVICE_SCAN_TIMEOUT: Duration = Duration::from_secs(3);

/// Per-port timeout for the discovery sweep.
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Single TCP connect attempt. Transport errors read as closed.
pub async fn port_open(host: &str, port: u16, timeout: Duration) -> bool {
    let addr = format!("{}:{}", host, port);
    match tokio::time::timeout(timeout, TcpStream::connect(&addr)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            trace!(addr = %addr, error = %e, "port probe refused");
            false
        }
        Err(_) => {
            trace!(addr = %addr, "port probe timed out");
            false
        }
    }
}

/// Blanket reachability: true when any high-probability port accepts a TCP
/// connection within `timeout` (applied per port). Never fails.
pub async fn reachable(host: &str, timeout: Duration) -> bool {
    for port in REACHABILITY_PORTS {
        if port_open(host, *port, timeout).await {
            return true;
        }
    }
    false
}

/// Probe every declared service and return a copy with `status` and
/// `last_check` refreshed.
pub async fn scan_services(host: &str, known: &[Service]) -> Vec<Service> {
    let mut out = Vec::with_capacity(known.len());
    for service in known {
        let up = port_open(host, service.port, SERVICE_SCAN_TIMEOUT).await;
        let mut service = service.clone();
        service.status = if up { ServiceStatus::Up } else { ServiceStatus::Down };
        service.last_check = Some(Utc::now());
        out.push(service);
    }
    out
}

/// Sweep the well-known port catalog and return Service entries for any
/// newly discovered listener, skipping ports already in `known`. Intended
/// only for nodes currently believed on.
pub async fn discover_services(host: &str, node_id: &NodeId, known: &[Service]) -> Vec<Service> {
    let known_ports: HashSet<u16> = known.iter().map(|s| s.port).collect();

    let mut found = Vec::new();
    for (port, name, service_type) in WELL_KNOWN_PORTS {
        if known_ports.contains(port) {
            continue;
        }
        if port_open(host, *port, DISCOVERY_TIMEOUT).await {
            found.push(Service {
                id: Service::discovered_id(node_id, *port),
                node_id: node_id.clone(),
                display_name: (*name).to_string(),
                port: *port,
                service_type: *service_type,
                status: ServiceStatus::Up,
                last_check: Some(Utc::now()),
                source: Source::Discovered,
            });
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_domain::ServiceType;
    use tokio::net::TcpListener;

    async fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[tokio::test]
    async fn open_port_detected() {
        let (_listener, port) = listener().await;
        assert!(port_open("127.0.0.1", port, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn closed_port_reads_down() {
        // Bind then drop to get a port that is very likely closed.
        let (listener, port) = listener().await;
        drop(listener);
        assert!(!port_open("127.0.0.1", port, Duration::from_millis(500)).await);
    }

    #[tokio::test]
    async fn unresolvable_host_reads_down() {
        assert!(!port_open("host.invalid.", 80, Duration::from_millis(500)).await);
    }

    #[tokio::test]
    async fn service_scan_marks_status_and_check_time() {
        let (_listener, port) = listener().await;
        let node_id = NodeId::new("srv1");
        let known = vec![Service {
            id: Service::discovered_id(&node_id, port),
            node_id: node_id.clone(),
            display_name: "test".into(),
            port,
            service_type: ServiceType::Custom,
            status: ServiceStatus::Down,
            last_check: None,
            source: Source::Config,
        }];

        let scanned = scan_services("127.0.0.1", &known).await;
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].status, ServiceStatus::Up);
        assert!(scanned[0].last_check.is_some());
    }

    #[tokio::test]
    async fn discovery_skips_known_ports() {
        // An unreachable host: everything reads down, so the only
        // observable behavior is the skip set and an empty result.
        let node_id = NodeId::new("srv1");
        let known = vec![Service {
            id: Service::discovered_id(&node_id, 22),
            node_id: node_id.clone(),
            display_name: "ssh".into(),
            port: 22,
            service_type: ServiceType::Ssh,
            status: ServiceStatus::Down,
            last_check: None,
            source: Source::Config,
        }];
        let found = discover_services("host.invalid.", &node_id, &known).await;
        assert!(found.is_empty());
    }
}
