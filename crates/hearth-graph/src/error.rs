use hearth_domain::NodeId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("node id is empty")]
    EmptyNodeId,

    #[error("duplicate node id '{0}'")]
    DuplicateNodeId(NodeId),

    #[error("node '{node}' references unknown parent '{parent}'")]
    UnknownParent { node: NodeId, parent: NodeId },

    #[error("node '{node}' is its own parent")]
    SelfParent { node: NodeId },

    #[error("cycle detected in parent graph")]
    CycleDetected,

    #[error("multiple errors")]
    Multiple(Vec<GraphError>),
}
