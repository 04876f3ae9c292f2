use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

// ── Identifiers ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(s: impl Into<String>) -> Self {
        NodeId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deterministic id for a VM discovered under a hypervisor parent.
    pub fn for_vm(parent: &NodeId, vmid: u32) -> Self {
        NodeId(format!("{}-vm-{}", parent.0, vmid))
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Hardware address ─────────────────────────────────────────────────────────

/// A 48-bit hardware address, parsed from `aa:bb:cc:dd:ee:ff` or
/// `aa-bb-cc-dd-ee-ff`, rendered lowercase colon-separated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    pub fn new(octets: [u8; 6]) -> Self {
        MacAddr(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for MacAddr {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split([':', '-']).collect();
        if parts.len() != 6 {
            return Err(DomainError::InvalidMacAddr(s.to_string()));
        }
        let mut octets = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            octets[i] = u8::from_str_radix(part, 16)
                .map_err(|_| DomainError::InvalidMacAddr(s.to_string()))?;
        }
        Ok(MacAddr(octets))
    }
}

impl std::fmt::Display for MacAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let o = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl Serialize for MacAddr {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ── Power states ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    On,
    Off,
    /// Fully shut down (distinct from a RAM-preserving pause).
    Stopped,
    Suspended,
    Unknown,
    InitFailed,
    Waking,
    Suspending,
    Stopping,
}

impl PowerState {
    /// Transient states are owned by the reconciler and must resolve within
    /// a bounded timeout.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PowerState::Waking | PowerState::Suspending | PowerState::Stopping
        )
    }

    /// States from which a wake makes sense.
    pub fn is_down(&self) -> bool {
        matches!(
            self,
            PowerState::Off | PowerState::Stopped | PowerState::Suspended | PowerState::Unknown
        )
    }
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PowerState::On => "on",
            PowerState::Off => "off",
            PowerState::Stopped => "stopped",
            PowerState::Suspended => "suspended",
            PowerState::Unknown => "unknown",
            PowerState::InitFailed => "init_failed",
            PowerState::Waking => "waking",
            PowerState::Suspending => "suspending",
            PowerState::Stopping => "stopping",
        };
        write!(f, "{}", s)
    }
}

/// VM status as reported by the hypervisor API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmPowerStatus {
    Running,
    Stopped,
    Suspended,
    Paused,
    Unknown,
}

impl VmPowerStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "running" => VmPowerStatus::Running,
            "stopped" => VmPowerStatus::Stopped,
            "suspended" => VmPowerStatus::Suspended,
            "paused" => VmPowerStatus::Paused,
            _ => VmPowerStatus::Unknown,
        }
    }

    /// Map the hypervisor's view onto the node power-state enum.
    pub fn as_power_state(&self) -> PowerState {
        match self {
            VmPowerStatus::Running => PowerState::On,
            VmPowerStatus::Stopped => PowerState::Stopped,
            VmPowerStatus::Suspended | VmPowerStatus::Paused => PowerState::Suspended,
            VmPowerStatus::Unknown => PowerState::Unknown,
        }
    }
}

// ── System families and provenance ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemFamily {
    Linux,
    Windows,
    Hypervisor,
    HypervisorVm,
    Unknown,
}

impl std::fmt::Display for SystemFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SystemFamily::Linux => "linux",
            SystemFamily::Windows => "windows",
            SystemFamily::Hypervisor => "hypervisor",
            SystemFamily::HypervisorVm => "hypervisor_vm",
            SystemFamily::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Where a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Config,
    Api,
    Discovered,
}

// ── Services ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    Ssh,
    Rdp,
    Vnc,
    Smb,
    Http,
    Https,
    Telnet,
    Nfs,
    Ftp,
    Database,
    Dns,
    Mail,
    Ldap,
    Proxmox,
    Custom,
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServiceType::Ssh => "ssh",
            ServiceType::Rdp => "rdp",
            ServiceType::Vnc => "vnc",
            ServiceType::Smb => "smb",
            ServiceType::Http => "http",
            ServiceType::Https => "https",
            ServiceType::Telnet => "telnet",
            ServiceType::Nfs => "nfs",
            ServiceType::Ftp => "ftp",
            ServiceType::Database => "database",
            ServiceType::Dns => "dns",
            ServiceType::Mail => "mail",
            ServiceType::Ldap => "ldap",
            ServiceType::Proxmox => "proxmox",
            ServiceType::Custom => "custom",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Stable id; discovered services use `<node_id>-port-<port>`.
    pub id: String,
    pub node_id: NodeId,
    pub display_name: String,
    pub port: u16,
    pub service_type: ServiceType,
    pub status: ServiceStatus,
    pub last_check: Option<DateTime<Utc>>,
    pub source: Source,
}

impl Service {
    /// The stable id assigned to services found by a discovery scan.
    pub fn discovered_id(node_id: &NodeId, port: u16) -> String {
        format!("{}-port-{}", node_id, port)
    }
}

// ── Action log ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Wake,
    Suspend,
    Shutdown,
    Stop,
    Initialize,
    Reconcile,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionKind::Wake => "wake",
            ActionKind::Suspend => "suspend",
            ActionKind::Shutdown => "shutdown",
            ActionKind::Stop => "stop",
            ActionKind::Initialize => "initialize",
            ActionKind::Reconcile => "reconcile",
        };
        write!(f, "{}", s)
    }
}

/// One effector invocation, appended to the node's bounded action log.
/// Entries are never mutated after the append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerAction {
    pub at: DateTime<Utc>,
    pub kind: ActionKind,
    pub success: bool,
    pub error_message: Option<String>,
    pub initiated_by: String,
}

impl ServerAction {
    pub fn success(kind: ActionKind, initiated_by: impl Into<String>) -> Self {
        ServerAction {
            at: Utc::now(),
            kind,
            success: true,
            error_message: None,
            initiated_by: initiated_by.into(),
        }
    }

    pub fn failure(
        kind: ActionKind,
        initiated_by: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        ServerAction {
            at: Utc::now(),
            kind,
            success: false,
            error_message: Some(error.into()),
            initiated_by: initiated_by.into(),
        }
    }
}

// ── Capabilities ─────────────────────────────────────────────────────────────

/// Identity and capability record filled by the initializer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub family: Option<SystemFamily>,
    pub supports_suspend: bool,
    pub supports_hibernate: bool,
    pub supports_wol: bool,
    /// Interfaces on which `wol g` is currently armed.
    pub wol_armed_interfaces: Vec<String>,
    pub system_id: Option<String>,
    pub os_version: Option<String>,
}

// ── Runtime snapshot ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadAvg {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub used_percent: f64,
}

/// Cumulative counters plus per-interval rates, sampled twice one second
/// apart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkRates {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_bps: f64,
    pub tx_bps: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskStats {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub used_percent: f64,
    pub mount: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceInfo {
    pub name: String,
    pub ip: Option<String>,
    pub mac: Option<MacAddr>,
    pub ipv6: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub cpu_percent: Option<f64>,
    pub load: Option<LoadAvg>,
    pub memory: Option<MemoryStats>,
    pub network: Option<NetworkRates>,
    pub disk: Option<DiskStats>,
    /// Wall-power reading when a meter is available.
    pub watts: Option<f64>,
    /// Estimated draw derived from cpu load when no meter is present.
    pub estimated_watts: Option<f64>,
    pub interfaces: Vec<InterfaceInfo>,
    pub taken_at: Option<DateTime<Utc>>,
}

// ── Hypervisor inventory ─────────────────────────────────────────────────────

/// Denormalized VM inventory entry kept on a hypervisor parent for UI
/// consumption; refreshed by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmInfo {
    pub vmid: u32,
    pub name: String,
    pub status: VmPowerStatus,
    pub template: bool,
}

/// Token credentials for the hypervisor API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiToken {
    pub user: String,
    pub realm: String,
    pub token_id: String,
    pub secret: String,
}

impl ApiToken {
    /// Proxmox-style token header value: `user@realm!tokenid=secret`.
    pub fn header_value(&self) -> String {
        format!(
            "PVEAPIToken={}@{}!{}={}",
            self.user, self.realm, self.token_id, self.secret
        )
    }
}

// ── SSH credentials ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshCredentials {
    pub user: String,
    pub port: u16,
    pub key_path: String,
}

impl Default for SshCredentials {
    fn default() -> Self {
        SshCredentials {
            user: "root".to_string(),
            port: 22,
            key_path: String::new(),
        }
    }
}

// ── Node ─────────────────────────────────────────────────────────────────────

/// How a node's power state is effected. Physical hosts take wake packets
/// and SSH commands; hypervisor-managed VMs take API calls through their
/// parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Physical,
    HypervisorVm,
}

/// The central managed entity: a physical host, a hypervisor host, or a VM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub hostname: String,
    pub mac: Option<MacAddr>,

    /// Parent hypervisor when this node is a child; the parent graph is a
    /// forest.
    pub parent: Option<NodeId>,
    /// True when power operations go through the hypervisor API rather than
    /// WoL/SSH.
    pub vm_managed: bool,
    /// The hypervisor cluster node this VM lives on.
    pub hyp_node: Option<String>,
    pub vmid: Option<u32>,

    pub observed: PowerState,
    pub desired: PowerState,
    pub last_state_change: DateTime<Utc>,

    pub initialized: bool,
    pub init_attempts: u32,
    pub last_init_attempt: Option<DateTime<Utc>>,
    pub last_successful_init: Option<DateTime<Utc>>,

    pub caps: Capabilities,
    pub snapshot: SystemSnapshot,
    pub services: Vec<Service>,
    /// VM inventory, populated on hypervisor parents only.
    pub vms: Vec<VmInfo>,

    pub ssh: SshCredentials,
    pub api_token: Option<ApiToken>,

    pub source: Source,

    #[serde(with = "humantime_serde")]
    pub total_on_time: Duration,
    #[serde(with = "humantime_serde")]
    pub total_off_time: Duration,
    #[serde(with = "humantime_serde")]
    pub total_suspended_time: Duration,
}

impl Node {
    /// A physical host as declared in configuration.
    pub fn physical(id: impl Into<String>, hostname: impl Into<String>) -> Self {
        Node {
            id: NodeId::new(id),
            name: String::new(),
            hostname: hostname.into(),
            mac: None,
            parent: None,
            vm_managed: false,
            hyp_node: None,
            vmid: None,
            observed: PowerState::Unknown,
            desired: PowerState::Off,
            last_state_change: Utc::now(),
            initialized: false,
            init_attempts: 0,
            last_init_attempt: None,
            last_successful_init: None,
            caps: Capabilities::default(),
            snapshot: SystemSnapshot::default(),
            services: Vec::new(),
            vms: Vec::new(),
            ssh: SshCredentials::default(),
            api_token: None,
            source: Source::Config,
            total_on_time: Duration::ZERO,
            total_off_time: Duration::ZERO,
            total_suspended_time: Duration::ZERO,
        }
    }

    /// A VM child materialized by discovery beneath a hypervisor parent.
    /// VM-managed nodes need no SSH round-trip and are initialized by
    /// definition.
    pub fn vm_child(parent: &Node, hyp_node: &str, vmid: u32, name: impl Into<String>) -> Self {
        let id = NodeId::for_vm(&parent.id, vmid);
        let mut node = Node::physical(id.as_str(), format!("vm-{}", vmid));
        node.name = name.into();
        node.parent = Some(parent.id.clone());
        node.vm_managed = true;
        node.hyp_node = Some(hyp_node.to_string());
        node.vmid = Some(vmid);
        node.source = Source::Discovered;
        node.initialized = true;
        node.caps.family = Some(SystemFamily::HypervisorVm);
        node
    }

    pub fn kind(&self) -> NodeKind {
        if self.vm_managed {
            NodeKind::HypervisorVm
        } else {
            NodeKind::Physical
        }
    }

    pub fn is_hypervisor(&self) -> bool {
        self.caps.family == Some(SystemFamily::Hypervisor)
    }

    /// Display name falls back to the id when the config gave no name.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            self.id.as_str()
        } else {
            &self.name
        }
    }
}

// ── Metric samples ───────────────────────────────────────────────────────────

/// One point handed to the external time-series writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub node_id: String,
    pub metric_name: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}
