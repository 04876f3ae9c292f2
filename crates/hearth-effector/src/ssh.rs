use std::time::Duration;

use async_ssh2_tokio::client::{AuthMethod, Client, ServerCheckMethod};
use async_trait::async_trait;
use hearth_domain::{Node, SshCredentials};
use tracing::debug;

use crate::error::SshError;

/// Everything needed to open a session to one host.
#[derive(Debug, Clone)]
pub struct SshTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub key_path: String,
}

impl SshTarget {
    pub fn for_node(node: &Node) -> Self {
        let SshCredentials { user, port, key_path } = node.ssh.clone();
        SshTarget {
            host: node.hostname.clone(),
            port,
            user,
            key_path,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: u32,
}

impl CommandOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// The SSH transport seam. Implementations must support concurrent calls;
/// each call opens its own session.
#[async_trait]
pub trait CommandRunner: Send + Sync + 'static {
    async fn run(&self, target: &SshTarget, command: &str) -> Result<CommandOutput, SshError>;
}

/// Production runner over a real SSH client. Host keys are not pinned:
/// nodes on a homelab network re-image often enough that strict checking
/// locks the controller out.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl SshExecutor {
    pub fn new() -> Self {
        SshExecutor {
            connect_timeout: Duration::from_secs(15),
            command_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeouts(connect_timeout: Duration, command_timeout: Duration) -> Self {
        SshExecutor { connect_timeout, command_timeout }
    }

    fn classify_connect_error(target: &SshTarget, e: async_ssh2_tokio::Error) -> SshError {
        let message = e.to_string();
        let lowered = message.to_lowercase();
        if lowered.contains("auth") {
            SshError::Auth {
                host: target.host.clone(),
                user: target.user.clone(),
            }
        } else if lowered.contains("refused") {
            SshError::Refused {
                host: target.host.clone(),
                port: target.port,
            }
        } else if lowered.contains("resolve") || lowered.contains("lookup") || lowered.contains("dns")
        {
            SshError::Dns { host: target.host.clone() }
        } else {
            SshError::Transport {
                host: target.host.clone(),
                message,
            }
        }
    }
}

impl Default for SshExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for SshExecutor {
    async fn run(&self, target: &SshTarget, command: &str) -> Result<CommandOutput, SshError> {
        let auth = AuthMethod::with_key_file(target.key_path.as_str(), None);

        let connect = Client::connect(
            (target.host.as_str(), target.port),
            &target.user,
            auth,
            ServerCheckMethod::NoCheck,
        );
        let client = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| SshError::Timeout {
                host: target.host.clone(),
                port: target.port,
            })?
            .map_err(|e| Self::classify_connect_error(target, e))?;

        debug!(host = %target.host, user = %target.user, %command, "running remote command");

        let result = tokio::time::timeout(self.command_timeout, client.execute(command))
            .await
            .map_err(|_| SshError::Timeout {
                host: target.host.clone(),
                port: target.port,
            })?
            .map_err(|e| SshError::Transport {
                host: target.host.clone(),
                message: e.to_string(),
            })?;

        Ok(CommandOutput {
            stdout: result.stdout,
            stderr: result.stderr,
            exit_code: result.exit_status,
        })
    }
}
