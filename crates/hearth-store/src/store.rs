use async_trait::async_trait;
use hearth_domain::{Node, NodeId, PowerState, ServerAction};

use crate::error::StoreError;

/// Maximum retained action-log entries per node; oldest drop first.
pub const ACTION_LOG_CAP: usize = 50;

/// The node registry. The only shared mutable structure in the process;
/// reads hand out defensive copies and mutations never perform I/O.
#[async_trait]
pub trait NodeStore: Send + Sync + 'static {
    async fn get(&self, id: &NodeId) -> Result<Node, StoreError>;

    /// Snapshot of every node. Order unspecified.
    async fn list(&self) -> Vec<Node>;

    async fn add(&self, node: Node) -> Result<(), StoreError>;

    /// Replace the record by id.
    async fn update(&self, node: Node) -> Result<(), StoreError>;

    async fn set_desired_state(&self, id: &NodeId, state: PowerState) -> Result<(), StoreError>;

    /// Atomic observed-state transition. When the state actually changes,
    /// `last_state_change` is stamped, the prior state's cumulative timer
    /// accrues, and the prior state is returned.
    async fn update_observed_state(
        &self,
        id: &NodeId,
        state: PowerState,
    ) -> Result<Option<PowerState>, StoreError>;

    /// Append to the node's bounded action log.
    async fn append_action(&self, id: &NodeId, action: ServerAction) -> Result<(), StoreError>;

    async fn actions(&self, id: &NodeId) -> Result<Vec<ServerAction>, StoreError>;
}
