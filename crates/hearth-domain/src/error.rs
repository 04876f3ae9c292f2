use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid node id: {0}")]
    InvalidNodeId(String),

    #[error("invalid hardware address: {0}")]
    InvalidMacAddr(String),

    #[error("node '{node}' is not managed through a hypervisor")]
    NotVmManaged { node: String },

    #[error("'{state}' is not a valid desired state")]
    InvalidDesiredState { state: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
