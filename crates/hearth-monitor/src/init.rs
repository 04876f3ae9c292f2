//! One-shot protocol that fills a node's identity and capability record.
//!
//! A node counts as initialized once the minimum set succeeded: SSH
//! reachability, family detection and a system id. Everything else is
//! best-effort; failures are demoted to warnings and leave gaps in the
//! capability record.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use hearth_command::{CommandError, Commander};
use hearth_config::Settings;
use hearth_domain::{ActionKind, Node, NodeId, PowerState, ServerAction, SystemFamily};
use hearth_effector::{HypervisorConnector, SshTarget};
use hearth_metrics::{names, MetricsSink};
use hearth_store::NodeStore;
use tracing::{info, warn};

/// Whether the init machinery should attempt this node now.
///
/// VM-managed children are initialized by definition. A node past the retry
/// cap waits out the cool-down; an initialized node goes stale after the
/// same interval and gets a fresh cycle.
pub fn should_attempt_initialization(node: &Node, settings: &Settings, now: DateTime<Utc>) -> bool {
    if node.vm_managed {
        return false;
    }

    let elapsed_since = |at: DateTime<Utc>| (now - at).to_std().unwrap_or_default();

    if !node.initialized {
        if node.init_attempts >= settings.max_init_retries {
            return node
                .last_init_attempt
                .map(|at| elapsed_since(at) >= settings.reinit_interval)
                .unwrap_or(true);
        }
        return true;
    }

    node.last_successful_init
        .map(|at| elapsed_since(at) >= settings.reinit_interval)
        .unwrap_or(true)
}

pub struct Initializer {
    store: Arc<dyn NodeStore>,
    commander: Arc<Commander>,
    connector: Arc<dyn HypervisorConnector>,
    sink: MetricsSink,
    settings: Settings,
}

impl Initializer {
    pub fn new(
        store: Arc<dyn NodeStore>,
        commander: Arc<Commander>,
        connector: Arc<dyn HypervisorConnector>,
        sink: MetricsSink,
        settings: Settings,
    ) -> Self {
        Initializer {
            store,
            commander,
            connector,
            sink,
            settings,
        }
    }

    /// Run one attempt against the node, with retry bookkeeping, metrics
    /// and an action-log entry. Returns whether the attempt succeeded.
    pub async fn run(&self, id: &NodeId) -> bool {
        let mut node = match self.store.get(id).await {
            Ok(node) => node,
            Err(e) => {
                warn!(node_id = %id, error = %e, "init skipped");
                return false;
            }
        };
        if node.vm_managed {
            return false;
        }

        let now = Utc::now();
        if node.init_attempts >= self.settings.max_init_retries {
            let cooled_down = node
                .last_init_attempt
                .map(|at| (now - at).to_std().unwrap_or_default() >= self.settings.reinit_interval)
                .unwrap_or(true);
            if !cooled_down {
                return false;
            }
            node.init_attempts = 0;
            self.sink.push(id.as_str(), names::INIT_STATE_RESET, 1.0).await;
        }

        node.init_attempts += 1;
        node.last_init_attempt = Some(now);
        self.sink.push(id.as_str(), names::INIT_ATTEMPT, 1.0).await;
        self.sink
            .push(id.as_str(), names::INIT_RETRY_COUNT, node.init_attempts as f64)
            .await;
        if self.store.update(node.clone()).await.is_err() {
            return false;
        }

        let started = Instant::now();
        match self.fill(&mut node).await {
            Ok(()) => {
                node.initialized = true;
                node.last_successful_init = Some(Utc::now());
                node.init_attempts = 0;
                let _ = self.store.update(node.clone()).await;

                self.sink.push(id.as_str(), names::INIT_SUCCESS, 1.0).await;
                self.sink
                    .push(
                        id.as_str(),
                        names::INIT_DURATION_SECONDS,
                        started.elapsed().as_secs_f64(),
                    )
                    .await;
                let _ = self
                    .store
                    .append_action(id, ServerAction::success(ActionKind::Initialize, "initializer"))
                    .await;

                // release a prior init_failed verdict; the status loop
                // re-derives the real state
                if node.observed == PowerState::InitFailed {
                    let _ = self
                        .store
                        .update_observed_state(id, PowerState::Unknown)
                        .await;
                }

                info!(node_id = %id, family = ?node.caps.family, "node initialized");
                true
            }
            Err(e) => {
                warn!(node_id = %id, error = %e, attempt = node.init_attempts, "init attempt failed");
                // keep whatever capabilities were learned before the failure
                let _ = self.store.update(node.clone()).await;

                self.sink.push(id.as_str(), names::INIT_FAILURE, 1.0).await;
                let _ = self
                    .store
                    .append_action(
                        id,
                        ServerAction::failure(ActionKind::Initialize, "initializer", e.to_string()),
                    )
                    .await;

                if node.init_attempts >= self.settings.max_init_retries {
                    self.sink
                        .push(id.as_str(), names::INIT_MAX_RETRIES_EXCEEDED, 1.0)
                        .await;
                    let _ = self
                        .store
                        .update_observed_state(id, PowerState::InitFailed)
                        .await;
                }
                false
            }
        }
    }

    /// The protocol itself. Mutates the node record in place so partial
    /// progress survives a late failure.
    async fn fill(&self, node: &mut Node) -> Result<(), CommandError> {
        let target = SshTarget::for_node(node);

        // 1. connectivity gate: classify unreachable hosts cheaply
        self.commander.test_connection(&target).await?;

        // 2. family
        let family = self.commander.detect_family(&target).await?;
        node.caps.family = Some(family);

        // 3. hypervisor bootstrap: API token + own cluster node name
        if family == SystemFamily::Hypervisor {
            self.bootstrap_hypervisor(node, &target).await;
        }

        // 4. minimum identity
        let system_id = self.commander.system_id(&target, family).await?;
        node.caps.system_id = Some(system_id);

        // best-effort capability and steady-state reads
        match self.commander.os_version(&target, family).await {
            Ok(version) => node.caps.os_version = Some(version),
            Err(e) => warn!(node_id = %node.id, error = %e, "os version read failed"),
        }
        match self.commander.interfaces(&target, family).await {
            Ok(interfaces) => node.snapshot.interfaces = interfaces,
            Err(e) => warn!(node_id = %node.id, error = %e, "interface read failed"),
        }
        match self.commander.disk(&target, family).await {
            Ok(disk) => node.snapshot.disk = Some(disk),
            Err(e) => warn!(node_id = %node.id, error = %e, "disk read failed"),
        }
        match self.commander.suspend_support(&target, family).await {
            Ok(supported) => node.caps.supports_suspend = supported,
            Err(e) => warn!(node_id = %node.id, error = %e, "suspend support read failed"),
        }
        match self.commander.hibernate_support(&target, family).await {
            Ok(supported) => node.caps.supports_hibernate = supported,
            Err(e) => warn!(node_id = %node.id, error = %e, "hibernate support read failed"),
        }

        // 5. wake-on-LAN: read support, arm where needed
        match self.commander.wol_support(&target, family).await {
            Ok(support) => {
                node.caps.supports_wol = support.supported;
                node.caps.wol_armed_interfaces = support.armed_interfaces.clone();
                if support.supported && !support.armed {
                    match self
                        .commander
                        .arm_wol(&target, family, &support.interfaces)
                        .await
                    {
                        Ok(armed) => {
                            info!(node_id = %node.id, armed, "wake-on-LAN armed");
                            node.caps.wol_armed_interfaces = support.interfaces;
                        }
                        Err(e) => {
                            warn!(node_id = %node.id, error = %e, "arming wake-on-LAN failed")
                        }
                    }
                }
            }
            Err(e) => warn!(node_id = %node.id, error = %e, "wake support read failed"),
        }

        Ok(())
    }

    /// Token creation and node-name resolution for hypervisor parents.
    /// Both are best-effort here; discovery re-attempts on its own tick.
    async fn bootstrap_hypervisor(&self, node: &mut Node, target: &SshTarget) {
        if node.api_token.is_none() {
            match self
                .commander
                .create_hypervisor_token(target, SystemFamily::Hypervisor, &node.ssh.user)
                .await
            {
                Ok(token) => {
                    info!(node_id = %node.id, token_id = %token.token_id, "hypervisor API token created");
                    node.api_token = Some(token);
                }
                Err(e) => warn!(node_id = %node.id, error = %e, "hypervisor token creation failed"),
            }
        }

        if node.hyp_node.is_none() {
            if let Some(token) = &node.api_token {
                match self.connector.connect(&node.hostname, token) {
                    Ok(client) => match client.list_nodes().await {
                        Ok(cluster_nodes) => {
                            node.hyp_node = resolve_own_node_name(&node.hostname, &cluster_nodes);
                        }
                        Err(e) => {
                            warn!(node_id = %node.id, error = %e, "cluster node listing failed")
                        }
                    },
                    Err(e) => warn!(node_id = %node.id, error = %e, "hypervisor connect failed"),
                }
            }
        }
    }
}

/// Pick this hypervisor's own name out of the cluster node list. A single
/// entry is unambiguous; otherwise prefer a name matching the hostname's
/// first label, then any online node.
pub(crate) fn resolve_own_node_name(
    hostname: &str,
    cluster_nodes: &[hearth_effector::HypClusterNode],
) -> Option<String> {
    if cluster_nodes.len() == 1 {
        return Some(cluster_nodes[0].node.clone());
    }
    let label = hostname.split('.').next().unwrap_or(hostname);
    cluster_nodes
        .iter()
        .find(|n| n.node == label)
        .or_else(|| cluster_nodes.iter().find(|n| n.online))
        .map(|n| n.node.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_effector::HypClusterNode;
    use std::time::Duration;

    fn settings() -> Settings {
        Settings::default()
    }

    #[test]
    fn fresh_node_should_attempt() {
        let node = Node::physical("srv1", "10.0.0.1");
        assert!(should_attempt_initialization(&node, &settings(), Utc::now()));
    }

    #[test]
    fn vm_managed_never_attempts() {
        let mut parent = Node::physical("host1", "10.0.0.2");
        parent.caps.family = Some(SystemFamily::Hypervisor);
        let child = Node::vm_child(&parent, "pve1", 101, "web");
        assert!(!should_attempt_initialization(&child, &settings(), Utc::now()));
    }

    #[test]
    fn exhausted_retries_wait_for_cooldown() {
        let mut node = Node::physical("srv1", "10.0.0.1");
        node.init_attempts = 3;
        node.last_init_attempt = Some(Utc::now());
        assert!(!should_attempt_initialization(&node, &settings(), Utc::now()));

        node.last_init_attempt = Some(Utc::now() - chrono::Duration::hours(2));
        assert!(should_attempt_initialization(&node, &settings(), Utc::now()));
    }

    #[test]
    fn initialized_node_goes_stale_after_interval() {
        let mut node = Node::physical("srv1", "10.0.0.1");
        node.initialized = true;
        node.last_successful_init = Some(Utc::now());
        assert!(!should_attempt_initialization(&node, &settings(), Utc::now()));

        node.last_successful_init = Some(Utc::now() - chrono::Duration::hours(2));
        assert!(should_attempt_initialization(&node, &settings(), Utc::now()));
    }

    #[test]
    fn stale_threshold_respects_custom_interval() {
        let mut custom = settings();
        custom.reinit_interval = Duration::from_secs(60);
        let mut node = Node::physical("srv1", "10.0.0.1");
        node.initialized = true;
        node.last_successful_init = Some(Utc::now() - chrono::Duration::seconds(90));
        assert!(should_attempt_initialization(&node, &custom, Utc::now()));
    }

    #[test]
    fn own_node_name_resolution() {
        let single = vec![HypClusterNode { node: "pve1".into(), online: true }];
        assert_eq!(resolve_own_node_name("10.0.0.2", &single).as_deref(), Some("pve1"));

        let cluster = vec![
            HypClusterNode { node: "pve1".into(), online: true },
            HypClusterNode { node: "pve2".into(), online: true },
        ];
        assert_eq!(
            resolve_own_node_name("pve2.lan", &cluster).as_deref(),
            Some("pve2")
        );
        // no label match: any online node
        assert_eq!(
            resolve_own_node_name("10.0.0.2", &cluster).as_deref(),
            Some("pve1")
        );
    }
}
