pub mod error;
pub mod hypervisor;
pub mod ssh;
pub mod wol;

pub use error::{HypervisorError, SshError, WolError};
pub use hypervisor::{
    HypClusterNode, HypVm, HypervisorApi, HypervisorConnector, ProxmoxClient, ProxmoxConnector,
};
pub use ssh::{CommandOutput, CommandRunner, SshExecutor, SshTarget};
pub use wol::{magic_packet, WakeSender, WolSender};
