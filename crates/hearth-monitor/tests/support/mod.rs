//! Shared fakes for the scenario tests: a scripted SSH runner, a recording
//! wake sender and an in-memory hypervisor cluster.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hearth_domain::{ApiToken, MacAddr, VmPowerStatus};
use hearth_effector::{
    CommandOutput, CommandRunner, HypClusterNode, HypVm, HypervisorApi, HypervisorConnector,
    HypervisorError, SshError, SshTarget, WakeSender, WolError,
};

// ── Scripted SSH runner ──────────────────────────────────────────────────────

pub struct FakeRunner {
    reachable: AtomicBool,
    responses: Mutex<Vec<(String, CommandOutput)>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        FakeRunner {
            reachable: AtomicBool::new(true),
            responses: Mutex::new(Vec::new()),
        }
    }

    /// Canned responses for a plain Linux host, enough for a full init.
    pub fn linux() -> Self {
        let runner = Self::new();
        runner.script("uname -s", 0, "Linux\n", "");
        runner.script("command -v pveversion", 1, "", "");
        runner.script("command -v ethtool", 1, "", "");
        runner.script("machine-id", 0, "6f3a2d1c9b8e4f50a1b2c3d4e5f60718\n", "");
        runner.script("os-release", 0, "PRETTY_NAME=\"Debian GNU/Linux 12 (bookworm)\"\n", "");
        runner.script("ip -o link", 0, "", "");
        runner.script("ip -o addr", 0, "", "");
        runner.script(
            "df -B1",
            0,
            " 1B-blocks  Used Avail Use% Mounted on\n1000 500 500  50% /\n",
            "",
        );
        runner.script("/sys/power/state", 0, "freeze mem disk\n", "");
        runner.script("true", 0, "", "");
        runner
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn script(&self, needle: &str, exit_code: u32, stdout: &str, stderr: &str) {
        self.responses.lock().unwrap().push((
            needle.to_string(),
            CommandOutput {
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
                exit_code,
            },
        ));
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, target: &SshTarget, command: &str) -> Result<CommandOutput, SshError> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(SshError::Timeout {
                host: target.host.clone(),
                port: target.port,
            });
        }
        let responses = self.responses.lock().unwrap();
        for (needle, output) in responses.iter() {
            if command.contains(needle.as_str()) {
                return Ok(output.clone());
            }
        }
        Ok(CommandOutput {
            stdout: String::new(),
            stderr: format!("sh: {}: command not found", command),
            exit_code: 127,
        })
    }
}

// ── Recording wake sender ────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeWol {
    pub sent: Mutex<Vec<MacAddr>>,
    fail: AtomicBool,
}

impl FakeWol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl WakeSender for FakeWol {
    async fn send_magic_packet(&self, mac: MacAddr) -> Result<(), WolError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(WolError::AllDestinationsFailed("network down".into()));
        }
        self.sent.lock().unwrap().push(mac);
        Ok(())
    }
}

// ── In-memory hypervisor cluster ─────────────────────────────────────────────

pub struct FakeVm {
    pub name: String,
    pub status: VmPowerStatus,
    pub template: bool,
}

pub struct FakeCluster {
    pub node_name: String,
    pub vms: Mutex<HashMap<u32, FakeVm>>,
    pub guest_ips: Mutex<HashMap<u32, Vec<IpAddr>>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeCluster {
    pub fn new(node_name: &str) -> Arc<Self> {
        Arc::new(FakeCluster {
            node_name: node_name.to_string(),
            vms: Mutex::new(HashMap::new()),
            guest_ips: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn put_vm(&self, vmid: u32, name: &str, status: VmPowerStatus, template: bool) {
        self.vms.lock().unwrap().insert(
            vmid,
            FakeVm {
                name: name.to_string(),
                status,
                template,
            },
        );
    }

    pub fn set_guest_ips(&self, vmid: u32, ips: Vec<IpAddr>) {
        self.guest_ips.lock().unwrap().insert(vmid, ips);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn set_status(&self, vmid: u32, status: VmPowerStatus) -> Result<(), HypervisorError> {
        let mut vms = self.vms.lock().unwrap();
        let vm = vms.get_mut(&vmid).ok_or(HypervisorError::Api {
            status: 500,
            message: format!("no such vm {}", vmid),
        })?;
        vm.status = status;
        Ok(())
    }
}

#[async_trait]
impl HypervisorApi for FakeCluster {
    async fn list_nodes(&self) -> Result<Vec<HypClusterNode>, HypervisorError> {
        Ok(vec![HypClusterNode {
            node: self.node_name.clone(),
            online: true,
        }])
    }

    async fn list_vms(&self, _node: &str) -> Result<Vec<HypVm>, HypervisorError> {
        let vms = self.vms.lock().unwrap();
        let mut out: Vec<HypVm> = vms
            .iter()
            .map(|(vmid, vm)| HypVm {
                vmid: *vmid,
                name: vm.name.clone(),
                status: vm.status,
                template: vm.template,
            })
            .collect();
        out.sort_by_key(|vm| vm.vmid);
        Ok(out)
    }

    async fn vm_status(&self, _node: &str, vmid: u32) -> Result<VmPowerStatus, HypervisorError> {
        let vms = self.vms.lock().unwrap();
        vms.get(&vmid)
            .map(|vm| vm.status)
            .ok_or(HypervisorError::Api {
                status: 500,
                message: format!("no such vm {}", vmid),
            })
    }

    async fn vm_guest_ips(&self, _node: &str, vmid: u32) -> Result<Vec<IpAddr>, HypervisorError> {
        Ok(self
            .guest_ips
            .lock()
            .unwrap()
            .get(&vmid)
            .cloned()
            .unwrap_or_default())
    }

    async fn vm_start(&self, _node: &str, vmid: u32) -> Result<(), HypervisorError> {
        self.record(format!("start:{}", vmid));
        self.set_status(vmid, VmPowerStatus::Running)
    }

    async fn vm_shutdown(&self, _node: &str, vmid: u32) -> Result<(), HypervisorError> {
        self.record(format!("shutdown:{}", vmid));
        self.set_status(vmid, VmPowerStatus::Stopped)
    }

    async fn vm_stop(&self, _node: &str, vmid: u32) -> Result<(), HypervisorError> {
        self.record(format!("stop:{}", vmid));
        self.set_status(vmid, VmPowerStatus::Stopped)
    }

    async fn vm_suspend(&self, _node: &str, vmid: u32) -> Result<(), HypervisorError> {
        self.record(format!("suspend:{}", vmid));
        self.set_status(vmid, VmPowerStatus::Suspended)
    }

    async fn vm_resume(&self, _node: &str, vmid: u32) -> Result<(), HypervisorError> {
        self.record(format!("resume:{}", vmid));
        self.set_status(vmid, VmPowerStatus::Running)
    }
}

pub struct FakeConnector(pub Arc<FakeCluster>);

impl HypervisorConnector for FakeConnector {
    fn connect(
        &self,
        _hostname: &str,
        _token: &ApiToken,
    ) -> Result<Arc<dyn HypervisorApi>, HypervisorError> {
        Ok(self.0.clone())
    }
}

/// A connector for tests with no hypervisor in play.
pub struct NoHypervisor;

impl HypervisorConnector for NoHypervisor {
    fn connect(
        &self,
        _hostname: &str,
        _token: &ApiToken,
    ) -> Result<Arc<dyn HypervisorApi>, HypervisorError> {
        Err(HypervisorError::Api {
            status: 503,
            message: "no hypervisor in this test".into(),
        })
    }
}

pub fn test_token() -> ApiToken {
    ApiToken {
        user: "root".into(),
        realm: "pam".into(),
        token_id: "hearth-test".into(),
        secret: "secret".into(),
    }
}
