use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use hearth_domain::{ApiToken, VmPowerStatus};
use serde::Deserialize;
use tracing::debug;

use crate::error::HypervisorError;

/// A node of the hypervisor cluster itself (not a managed [`hearth_domain::Node`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HypClusterNode {
    pub node: String,
    pub online: bool,
}

/// One VM as enumerated on a cluster node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HypVm {
    pub vmid: u32,
    pub name: String,
    pub status: VmPowerStatus,
    pub template: bool,
}

/// Token-authenticated hypervisor management API.
#[async_trait]
pub trait HypervisorApi: Send + Sync + 'static {
    async fn list_nodes(&self) -> Result<Vec<HypClusterNode>, HypervisorError>;

    async fn list_vms(&self, node: &str) -> Result<Vec<HypVm>, HypervisorError>;

    async fn vm_status(&self, node: &str, vmid: u32) -> Result<VmPowerStatus, HypervisorError>;

    /// Guest IPs via the agent; hosts without an agent report an API error,
    /// which callers generally treat as "no address learned".
    async fn vm_guest_ips(&self, node: &str, vmid: u32) -> Result<Vec<IpAddr>, HypervisorError>;

    async fn vm_start(&self, node: &str, vmid: u32) -> Result<(), HypervisorError>;
    /// Graceful ACPI shutdown.
    async fn vm_shutdown(&self, node: &str, vmid: u32) -> Result<(), HypervisorError>;
    /// Hard stop.
    async fn vm_stop(&self, node: &str, vmid: u32) -> Result<(), HypervisorError>;
    async fn vm_suspend(&self, node: &str, vmid: u32) -> Result<(), HypervisorError>;
    async fn vm_resume(&self, node: &str, vmid: u32) -> Result<(), HypervisorError>;
}

/// Builds an API client for one hypervisor host. A seam so the monitor can
/// take a fake cluster in tests.
pub trait HypervisorConnector: Send + Sync + 'static {
    fn connect(
        &self,
        hostname: &str,
        token: &ApiToken,
    ) -> Result<std::sync::Arc<dyn HypervisorApi>, HypervisorError>;
}

/// Connects to Proxmox VE on the standard management port.
pub struct ProxmoxConnector {
    pub verify_certs: bool,
}

impl HypervisorConnector for ProxmoxConnector {
    fn connect(
        &self,
        hostname: &str,
        token: &ApiToken,
    ) -> Result<std::sync::Arc<dyn HypervisorApi>, HypervisorError> {
        let client = ProxmoxClient::new(
            format!("https://{}:8006", hostname),
            token.clone(),
            self.verify_certs,
        )?;
        Ok(std::sync::Arc::new(client))
    }
}

// ── Proxmox VE client ────────────────────────────────────────────────────────

/// All Proxmox responses arrive wrapped in `{"data": ...}`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct RawClusterNode {
    node: String,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawVm {
    vmid: u32,
    name: Option<String>,
    status: Option<String>,
    /// 1 for templates; absent on regular VMs.
    template: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct RawVmStatus {
    status: String,
}

#[derive(Debug, Deserialize)]
struct RawAgentInterfaces {
    result: Vec<RawAgentInterface>,
}

#[derive(Debug, Deserialize)]
struct RawAgentInterface {
    #[serde(rename = "ip-addresses", default)]
    ip_addresses: Vec<RawAgentIp>,
}

#[derive(Debug, Deserialize)]
struct RawAgentIp {
    #[serde(rename = "ip-address")]
    ip_address: String,
}

/// Proxmox VE REST client over `/api2/json`, authenticated with a static
/// API token header.
pub struct ProxmoxClient {
    base_url: String,
    token: ApiToken,
    http: reqwest::Client,
}

impl ProxmoxClient {
    /// `base_url` like `https://10.0.0.2:8006`. Certificate verification is
    /// governed by config; homelab hypervisors commonly run self-signed.
    pub fn new(
        base_url: impl Into<String>,
        token: ApiToken,
        verify_certs: bool,
    ) -> Result<Self, HypervisorError> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!verify_certs)
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(ProxmoxClient {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api2/json{}", self.base_url, path)
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, HypervisorError> {
        let response = self
            .http
            .get(self.url(path))
            .header("Authorization", self.token.header_value())
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn post(&self, path: &str) -> Result<(), HypervisorError> {
        let response = self
            .http
            .post(self.url(path))
            .header("Authorization", self.token.header_value())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(HypervisorError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, HypervisorError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(HypervisorError::Api {
                status: status.as_u16(),
                message,
            });
        }
        let envelope: Envelope<T> = response.json().await?;
        Ok(envelope.data)
    }
}

#[async_trait]
impl HypervisorApi for ProxmoxClient {
    async fn list_nodes(&self) -> Result<Vec<HypClusterNode>, HypervisorError> {
        let raw: Vec<RawClusterNode> = self.get("/nodes").await?;
        Ok(raw
            .into_iter()
            .map(|n| HypClusterNode {
                online: n.status.as_deref() == Some("online"),
                node: n.node,
            })
            .collect())
    }

    async fn list_vms(&self, node: &str) -> Result<Vec<HypVm>, HypervisorError> {
        let raw: Vec<RawVm> = self.get(&format!("/nodes/{}/qemu", node)).await?;
        Ok(raw
            .into_iter()
            .map(|vm| HypVm {
                vmid: vm.vmid,
                name: vm.name.unwrap_or_else(|| format!("vm-{}", vm.vmid)),
                status: vm
                    .status
                    .as_deref()
                    .map(VmPowerStatus::parse)
                    .unwrap_or(VmPowerStatus::Unknown),
                template: vm.template == Some(1),
            })
            .collect())
    }

    async fn vm_status(&self, node: &str, vmid: u32) -> Result<VmPowerStatus, HypervisorError> {
        let raw: RawVmStatus = self
            .get(&format!("/nodes/{}/qemu/{}/status/current", node, vmid))
            .await?;
        Ok(VmPowerStatus::parse(&raw.status))
    }

    async fn vm_guest_ips(&self, node: &str, vmid: u32) -> Result<Vec<IpAddr>, HypervisorError> {
        let raw: RawAgentInterfaces = self
            .get(&format!(
                "/nodes/{}/qemu/{}/agent/network-get-interfaces",
                node, vmid
            ))
            .await?;

        let mut ips = Vec::new();
        for iface in raw.result {
            for ip in iface.ip_addresses {
                if let Ok(parsed) = ip.ip_address.parse::<IpAddr>() {
                    if !parsed.is_loopback() {
                        ips.push(parsed);
                    }
                }
            }
        }
        Ok(ips)
    }

    async fn vm_start(&self, node: &str, vmid: u32) -> Result<(), HypervisorError> {
        debug!(node, vmid, "hypervisor: start");
        self.post(&format!("/nodes/{}/qemu/{}/status/start", node, vmid))
            .await
    }

    async fn vm_shutdown(&self, node: &str, vmid: u32) -> Result<(), HypervisorError> {
        debug!(node, vmid, "hypervisor: shutdown");
        self.post(&format!("/nodes/{}/qemu/{}/status/shutdown", node, vmid))
            .await
    }

    async fn vm_stop(&self, node: &str, vmid: u32) -> Result<(), HypervisorError> {
        debug!(node, vmid, "hypervisor: stop");
        self.post(&format!("/nodes/{}/qemu/{}/status/stop", node, vmid))
            .await
    }

    async fn vm_suspend(&self, node: &str, vmid: u32) -> Result<(), HypervisorError> {
        debug!(node, vmid, "hypervisor: suspend");
        self.post(&format!("/nodes/{}/qemu/{}/status/suspend", node, vmid))
            .await
    }

    async fn vm_resume(&self, node: &str, vmid: u32) -> Result<(), HypervisorError> {
        debug!(node, vmid, "hypervisor: resume");
        self.post(&format!("/nodes/{}/qemu/{}/status/resume", node, vmid))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn token() -> ApiToken {
        ApiToken {
            user: "hearth".into(),
            realm: "pam".into(),
            token_id: "monitor".into(),
            secret: "s3cret".into(),
        }
    }

    async fn client(server: &MockServer) -> ProxmoxClient {
        ProxmoxClient::new(server.uri(), token(), true).unwrap()
    }

    #[tokio::test]
    async fn lists_cluster_nodes_with_token_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api2/json/nodes"))
            .and(header(
                "Authorization",
                "PVEAPIToken=hearth@pam!monitor=s3cret",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "node": "pve1", "status": "online" },
                    { "node": "pve2", "status": "offline" }
                ]
            })))
            .mount(&server)
            .await;

        let nodes = client(&server).await.list_nodes().await.unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].node, "pve1");
        assert!(nodes[0].online);
        assert!(!nodes[1].online);
    }

    #[tokio::test]
    async fn lists_vms_with_template_flag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api2/json/nodes/pve1/qemu"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "vmid": 101, "name": "web", "status": "running" },
                    { "vmid": 900, "name": "tmpl", "status": "stopped", "template": 1 }
                ]
            })))
            .mount(&server)
            .await;

        let vms = client(&server).await.list_vms("pve1").await.unwrap();
        assert_eq!(vms.len(), 2);
        assert_eq!(vms[0].vmid, 101);
        assert_eq!(vms[0].status, VmPowerStatus::Running);
        assert!(!vms[0].template);
        assert!(vms[1].template);
    }

    #[tokio::test]
    async fn reads_vm_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api2/json/nodes/pve1/qemu/101/status/current"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "status": "paused", "vmid": 101 }
            })))
            .mount(&server)
            .await;

        let status = client(&server).await.vm_status("pve1", 101).await.unwrap();
        assert_eq!(status, VmPowerStatus::Paused);
    }

    #[tokio::test]
    async fn start_posts_to_status_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api2/json/nodes/pve1/qemu/101/status/start"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": "UPID:pve1:0000"
            })))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).await.vm_start("pve1", 101).await.unwrap();
    }

    #[tokio::test]
    async fn guest_ips_skip_loopback() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(
                "/api2/json/nodes/pve1/qemu/101/agent/network-get-interfaces",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "result": [
                    { "name": "lo", "ip-addresses": [
                        { "ip-address": "127.0.0.1", "ip-address-type": "ipv4" }
                    ]},
                    { "name": "eth0", "ip-addresses": [
                        { "ip-address": "10.0.0.42", "ip-address-type": "ipv4" },
                        { "ip-address": "fe80::1", "ip-address-type": "ipv6" }
                    ]}
                ]}
            })))
            .mount(&server)
            .await;

        let ips = client(&server).await.vm_guest_ips("pve1", 101).await.unwrap();
        assert_eq!(ips.len(), 2);
        assert_eq!(ips[0].to_string(), "10.0.0.42");
    }

    #[tokio::test]
    async fn api_error_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api2/json/nodes"))
            .respond_with(ResponseTemplate::new(401).set_body_string("authentication failure"))
            .mount(&server)
            .await;

        let err = client(&server).await.list_nodes().await.unwrap_err();
        match err {
            HypervisorError::Api { status, .. } => assert_eq!(status, 401),
            other => panic!("expected Api error, got {:?}", other),
        }
    }
}
