use std::sync::Arc;

use hearth_domain::{
    ApiToken, DiskStats, InterfaceInfo, LoadAvg, MemoryStats, NetworkRates, SystemFamily,
};
use hearth_effector::{CommandOutput, CommandRunner, SshTarget};
use tracing::debug;
use uuid::Uuid;

use crate::error::{CommandError, CommandErrorKind};
use crate::parse;

/// Wake-on-LAN capability as read from ethtool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WolSupport {
    pub supported: bool,
    /// Interfaces that support magic-packet wake.
    pub interfaces: Vec<String>,
    /// Interfaces with wake currently armed.
    pub armed_interfaces: Vec<String>,
    /// True when every supporting interface is armed.
    pub armed: bool,
}

/// System-type-aware command catalog. All family-specific command text and
/// output parsing lives here so the initializer and monitor stay
/// family-agnostic.
pub struct Commander {
    runner: Arc<dyn CommandRunner>,
}

impl Commander {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Commander { runner }
    }

    /// Run a command, mapping transport failures into the command taxonomy.
    /// A non-zero exit is returned as output, not an error.
    async fn exec(&self, target: &SshTarget, command: &str) -> Result<CommandOutput, CommandError> {
        self.runner
            .run(target, command)
            .await
            .map_err(|e| CommandError::from_ssh(e, command))
    }

    /// Run a command and require a zero exit.
    async fn exec_ok(
        &self,
        target: &SshTarget,
        command: &str,
    ) -> Result<CommandOutput, CommandError> {
        let output = self.exec(target, command).await?;
        if !output.succeeded() {
            return Err(CommandError::classify_output(command, &output));
        }
        Ok(output)
    }

    fn parse_err(command: &str, output: &CommandOutput, message: String) -> CommandError {
        CommandError::parse(
            command,
            format!("{}{}", output.stdout, output.stderr),
            message,
        )
    }

    fn linux_like(family: SystemFamily) -> Result<(), CommandError> {
        match family {
            SystemFamily::Linux | SystemFamily::Hypervisor => Ok(()),
            other => Err(CommandError::mismatch(format!(
                "operation requires a linux-family system, node is {}",
                other
            ))),
        }
    }

    // ── Connectivity and identity ────────────────────────────────────────────

    /// Cheapest possible round-trip; used by the initializer to classify
    /// unreachable nodes before anything else.
    pub async fn test_connection(&self, target: &SshTarget) -> Result<(), CommandError> {
        self.exec_ok(target, "true").await.map(|_| ())
    }

    pub async fn detect_family(&self, target: &SshTarget) -> Result<SystemFamily, CommandError> {
        let uname = self.exec(target, "uname -s").await?;
        if uname.succeeded() && uname.stdout.contains("Linux") {
            let pve = self.exec(target, "command -v pveversion").await?;
            if pve.succeeded() && !pve.stdout.trim().is_empty() {
                return Ok(SystemFamily::Hypervisor);
            }
            return Ok(SystemFamily::Linux);
        }

        let ver = self.exec(target, "ver").await?;
        if ver.stdout.contains("Windows") {
            return Ok(SystemFamily::Windows);
        }
        debug!(host = %target.host, "family detection fell through to unknown");
        Ok(SystemFamily::Unknown)
    }

    pub async fn system_id(
        &self,
        target: &SshTarget,
        family: SystemFamily,
    ) -> Result<String, CommandError> {
        match family {
            SystemFamily::Linux | SystemFamily::Hypervisor => {
                let cmd = "cat /etc/machine-id";
                let output = self.exec_ok(target, cmd).await?;
                let id = output.stdout.trim().to_string();
                if id.is_empty() {
                    return Err(Self::parse_err(cmd, &output, "empty machine id".into()));
                }
                Ok(id)
            }
            SystemFamily::Windows => {
                let cmd = "wmic csproduct get uuid /value";
                let output = self.exec_ok(target, cmd).await?;
                parse::wmic_value(&output.stdout, "UUID")
                    .map_err(|m| Self::parse_err(cmd, &output, m))
            }
            other => Err(CommandError::unsupported(
                "",
                format!("no system id source for {}", other),
            )),
        }
    }

    pub async fn os_version(
        &self,
        target: &SshTarget,
        family: SystemFamily,
    ) -> Result<String, CommandError> {
        match family {
            SystemFamily::Linux | SystemFamily::Hypervisor => {
                let cmd = "cat /etc/os-release";
                let output = self.exec_ok(target, cmd).await?;
                parse::pretty_name_from_os_release(&output.stdout)
                    .map_err(|m| Self::parse_err(cmd, &output, m))
            }
            SystemFamily::Windows => {
                let output = self.exec_ok(target, "ver").await?;
                Ok(output.stdout.trim().to_string())
            }
            other => Err(CommandError::unsupported(
                "",
                format!("no os version source for {}", other),
            )),
        }
    }

    // ── Telemetry reads ──────────────────────────────────────────────────────

    pub async fn cpu_percent(
        &self,
        target: &SshTarget,
        family: SystemFamily,
    ) -> Result<f64, CommandError> {
        match family {
            SystemFamily::Linux | SystemFamily::Hypervisor => {
                let cmd = "grep 'cpu ' /proc/stat; sleep 1; grep 'cpu ' /proc/stat";
                let output = self.exec_ok(target, cmd).await?;
                parse::cpu_percent_from_proc_stat(&output.stdout)
                    .map_err(|m| Self::parse_err(cmd, &output, m))
            }
            SystemFamily::Windows => {
                let cmd = "wmic cpu get loadpercentage /value";
                let output = self.exec_ok(target, cmd).await?;
                parse::cpu_percent_from_wmic(&output.stdout)
                    .map_err(|m| Self::parse_err(cmd, &output, m))
            }
            other => Err(CommandError::unsupported(
                "",
                format!("no cpu reading for {}", other),
            )),
        }
    }

    pub async fn load_average(
        &self,
        target: &SshTarget,
        family: SystemFamily,
    ) -> Result<LoadAvg, CommandError> {
        Self::linux_like(family)?;
        let cmd = "cat /proc/loadavg";
        let output = self.exec_ok(target, cmd).await?;
        parse::load_from_loadavg(&output.stdout).map_err(|m| Self::parse_err(cmd, &output, m))
    }

    pub async fn memory(
        &self,
        target: &SshTarget,
        family: SystemFamily,
    ) -> Result<MemoryStats, CommandError> {
        match family {
            SystemFamily::Linux | SystemFamily::Hypervisor => {
                let cmd = "free -b";
                let output = self.exec_ok(target, cmd).await?;
                parse::memory_from_free(&output.stdout)
                    .map_err(|m| Self::parse_err(cmd, &output, m))
            }
            SystemFamily::Windows => {
                let cmd = "wmic OS get FreePhysicalMemory,TotalVisibleMemorySize /value";
                let output = self.exec_ok(target, cmd).await?;
                parse::memory_from_wmic(&output.stdout)
                    .map_err(|m| Self::parse_err(cmd, &output, m))
            }
            other => Err(CommandError::unsupported(
                "",
                format!("no memory reading for {}", other),
            )),
        }
    }

    /// Byte counters sampled twice one second apart; rates computed from
    /// the delta.
    pub async fn network_rate(
        &self,
        target: &SshTarget,
        family: SystemFamily,
    ) -> Result<NetworkRates, CommandError> {
        Self::linux_like(family)?;
        let cmd = "cat /proc/net/dev; sleep 1; echo ===; cat /proc/net/dev";
        let output = self.exec_ok(target, cmd).await?;
        parse::rates_from_net_dev(&output.stdout, 1.0)
            .map_err(|m| Self::parse_err(cmd, &output, m))
    }

    pub async fn interfaces(
        &self,
        target: &SshTarget,
        family: SystemFamily,
    ) -> Result<Vec<InterfaceInfo>, CommandError> {
        Self::linux_like(family)?;
        let link_cmd = "ip -o link show";
        let links = self.exec_ok(target, link_cmd).await?;
        let macs = parse::macs_from_ip_link(&links.stdout);

        let addr_cmd = "ip -o addr show";
        let addrs = self.exec_ok(target, addr_cmd).await?;
        Ok(parse::interfaces_from_ip_addr(&addrs.stdout, &macs))
    }

    pub async fn disk(
        &self,
        target: &SshTarget,
        family: SystemFamily,
    ) -> Result<DiskStats, CommandError> {
        match family {
            SystemFamily::Linux | SystemFamily::Hypervisor => {
                let cmd = "df -B1 --output=size,used,avail,pcent,target /";
                let output = self.exec_ok(target, cmd).await?;
                parse::disk_from_df(&output.stdout).map_err(|m| Self::parse_err(cmd, &output, m))
            }
            SystemFamily::Windows => {
                let cmd = "wmic logicaldisk where \"DeviceID='C:'\" get Size,FreeSpace /value";
                let output = self.exec_ok(target, cmd).await?;
                parse::disk_from_wmic(&output.stdout, "C:")
                    .map_err(|m| Self::parse_err(cmd, &output, m))
            }
            other => Err(CommandError::unsupported(
                "",
                format!("no disk reading for {}", other),
            )),
        }
    }

    // ── Wake-on-LAN management ───────────────────────────────────────────────

    pub async fn wol_support(
        &self,
        target: &SshTarget,
        family: SystemFamily,
    ) -> Result<WolSupport, CommandError> {
        Self::linux_like(family)?;

        let probe = self.exec(target, "command -v ethtool").await?;
        if !probe.succeeded() || probe.stdout.trim().is_empty() {
            return Err(CommandError::unsupported(
                "command -v ethtool",
                "ethtool not available",
            ));
        }

        let cmd = "for n in /sys/class/net/*; do i=$(basename \"$n\"); \
                   [ \"$i\" = lo ] && continue; echo \"IFACE $i\"; \
                   ethtool \"$i\" 2>/dev/null | grep 'Wake-on'; done; true";
        let output = self.exec_ok(target, cmd).await?;
        let report = parse::wol_from_ethtool(&output.stdout);

        let armed = !report.supported.is_empty()
            && report
                .supported
                .iter()
                .all(|i| report.armed.contains(i));
        Ok(WolSupport {
            supported: !report.supported.is_empty(),
            interfaces: report.supported,
            armed_interfaces: report.armed,
            armed,
        })
    }

    /// Arm `wol g` on each given interface. At least one success is
    /// required; the count of armed interfaces is returned.
    pub async fn arm_wol(
        &self,
        target: &SshTarget,
        family: SystemFamily,
        interfaces: &[String],
    ) -> Result<u32, CommandError> {
        Self::linux_like(family)?;
        if interfaces.is_empty() {
            return Err(CommandError::unsupported("", "no interfaces support wake"));
        }

        let mut armed = 0u32;
        let mut last_err: Option<CommandError> = None;
        for iface in interfaces {
            let cmd = format!("sudo -n ethtool -s {} wol g", iface);
            match self.exec_ok(target, &cmd).await {
                Ok(_) => armed += 1,
                Err(e) => {
                    debug!(iface = %iface, error = %e, "arming wake failed");
                    last_err = Some(e);
                }
            }
        }

        if armed == 0 {
            // interfaces is non-empty here, so at least one attempt failed
            return Err(last_err.unwrap_or_else(|| {
                CommandError::new(CommandErrorKind::Generic, "arming wake failed", "", "")
            }));
        }
        Ok(armed)
    }

    // ── Power verbs ──────────────────────────────────────────────────────────

    pub async fn suspend_support(
        &self,
        target: &SshTarget,
        family: SystemFamily,
    ) -> Result<bool, CommandError> {
        Self::linux_like(family)?;
        let output = self.exec_ok(target, "cat /sys/power/state").await?;
        Ok(output.stdout.contains("mem"))
    }

    pub async fn suspend(
        &self,
        target: &SshTarget,
        family: SystemFamily,
    ) -> Result<(), CommandError> {
        Self::linux_like(family)?;
        self.exec_ok(target, "sudo -n systemctl suspend").await.map(|_| ())
    }

    pub async fn hibernate_support(
        &self,
        target: &SshTarget,
        family: SystemFamily,
    ) -> Result<bool, CommandError> {
        Self::linux_like(family)?;
        let output = self.exec_ok(target, "cat /sys/power/state").await?;
        Ok(output.stdout.contains("disk"))
    }

    pub async fn hibernate(
        &self,
        target: &SshTarget,
        family: SystemFamily,
    ) -> Result<(), CommandError> {
        Self::linux_like(family)?;
        self.exec_ok(target, "sudo -n systemctl hibernate").await.map(|_| ())
    }

    pub async fn shutdown(
        &self,
        target: &SshTarget,
        family: SystemFamily,
    ) -> Result<(), CommandError> {
        let cmd = match family {
            SystemFamily::Linux | SystemFamily::Hypervisor => "sudo -n systemctl poweroff",
            SystemFamily::Windows => "shutdown /s /t 0",
            other => {
                return Err(CommandError::unsupported(
                    "",
                    format!("no shutdown verb for {}", other),
                ))
            }
        };
        self.exec_ok(target, cmd).await.map(|_| ())
    }

    pub async fn restart(
        &self,
        target: &SshTarget,
        family: SystemFamily,
    ) -> Result<(), CommandError> {
        let cmd = match family {
            SystemFamily::Linux | SystemFamily::Hypervisor => "sudo -n systemctl reboot",
            SystemFamily::Windows => "shutdown /r /t 0",
            other => {
                return Err(CommandError::unsupported(
                    "",
                    format!("no restart verb for {}", other),
                ))
            }
        };
        self.exec_ok(target, cmd).await.map(|_| ())
    }

    // ── Hypervisor bootstrap ─────────────────────────────────────────────────

    /// Create an API token over SSH on the hypervisor host itself. The
    /// secret is only printed once, so the caller must persist it.
    pub async fn create_hypervisor_token(
        &self,
        target: &SshTarget,
        family: SystemFamily,
        user: &str,
    ) -> Result<ApiToken, CommandError> {
        if family != SystemFamily::Hypervisor {
            return Err(CommandError::mismatch(format!(
                "token creation requires a hypervisor, node is {}",
                family
            )));
        }

        let (user, realm) = user.split_once('@').unwrap_or((user, "pam"));
        let token_id = format!("hearth-{}", &Uuid::new_v4().simple().to_string()[..8]);
        let cmd = format!(
            "pveum user token add {}@{} {} --privsep 0 --output-format json",
            user, realm, token_id
        );

        let output = self.exec_ok(target, &cmd).await?;
        let secret = parse::token_secret_from_pveum(&output.stdout)
            .map_err(|m| Self::parse_err(&cmd, &output, m))?;

        Ok(ApiToken {
            user: user.to_string(),
            realm: realm.to_string(),
            token_id,
            secret,
        })
    }
}
