use std::collections::{HashMap, HashSet};

use hearth_domain::{Node, NodeId};
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;

use crate::error::GraphError;

/// Result returned by [`validate`] on success.
#[derive(Debug, Serialize)]
pub struct ResolvedTopology {
    /// Node ids in wake order: every parent before any of its children.
    pub wake_order: Vec<NodeId>,
    /// Children keyed by parent id.
    pub children: HashMap<NodeId, Vec<NodeId>>,
}

impl ResolvedTopology {
    pub fn children_of(&self, parent: &NodeId) -> &[NodeId] {
        self.children.get(parent).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Validate the parent graph of a loaded node set.
///
/// Checks:
/// 1. Non-empty, unique node ids
/// 2. Parent references resolve
/// 3. The parent graph is a forest (no self-parents, no cycles)
pub fn validate(nodes: &[Node]) -> Result<ResolvedTopology, GraphError> {
    let mut errors: Vec<GraphError> = Vec::new();

    let mut seen: HashSet<&NodeId> = HashSet::new();
    for node in nodes {
        if node.id.as_str().is_empty() {
            errors.push(GraphError::EmptyNodeId);
            continue;
        }
        if !seen.insert(&node.id) {
            errors.push(GraphError::DuplicateNodeId(node.id.clone()));
        }
    }

    let by_id: HashMap<&NodeId, &Node> = nodes.iter().map(|n| (&n.id, n)).collect();

    for node in nodes {
        if let Some(parent) = &node.parent {
            if parent == &node.id {
                errors.push(GraphError::SelfParent { node: node.id.clone() });
            } else if !by_id.contains_key(parent) {
                errors.push(GraphError::UnknownParent {
                    node: node.id.clone(),
                    parent: parent.clone(),
                });
            }
        }
    }

    if !errors.is_empty() {
        if errors.len() == 1 {
            return Err(errors.remove(0));
        }
        return Err(GraphError::Multiple(errors));
    }

    // Edges run parent → child, so the topological order wakes parents first.
    let mut graph: DiGraph<&NodeId, ()> = DiGraph::new();
    let node_map: HashMap<&NodeId, NodeIndex> = nodes
        .iter()
        .map(|n| (&n.id, graph.add_node(&n.id)))
        .collect();

    let mut children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for node in nodes {
        if let Some(parent) = &node.parent {
            graph.add_edge(node_map[parent], node_map[&node.id], ());
            children
                .entry(parent.clone())
                .or_default()
                .push(node.id.clone());
        }
    }

    if is_cyclic_directed(&graph) {
        return Err(GraphError::CycleDetected);
    }

    let topo = petgraph::algo::toposort(&graph, None).map_err(|_| GraphError::CycleDetected)?;
    let wake_order = topo.iter().map(|idx| (*graph[*idx]).clone()).collect();

    Ok(ResolvedTopology { wake_order, children })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_domain::Node;

    fn node(id: &str, parent: Option<&str>) -> Node {
        let mut n = Node::physical(id, format!("{}.lan", id));
        n.parent = parent.map(NodeId::new);
        n
    }

    #[test]
    fn valid_forest_passes() {
        let nodes = vec![
            node("host1", None),
            node("host1-vm-101", Some("host1")),
            node("srv1", None),
        ];
        let topo = validate(&nodes).unwrap();
        assert_eq!(topo.children_of(&NodeId::new("host1")).len(), 1);
        assert!(topo.children_of(&NodeId::new("srv1")).is_empty());
    }

    #[test]
    fn wake_order_puts_parents_first() {
        let nodes = vec![
            node("child", Some("parent")),
            node("parent", None),
        ];
        let topo = validate(&nodes).unwrap();
        let pos_parent = topo.wake_order.iter().position(|n| n.as_str() == "parent").unwrap();
        let pos_child = topo.wake_order.iter().position(|n| n.as_str() == "child").unwrap();
        assert!(pos_parent < pos_child, "parent must come before child");
    }

    #[test]
    fn unknown_parent_detected() {
        let nodes = vec![node("vm", Some("ghost"))];
        let result = validate(&nodes);
        assert!(
            matches!(result, Err(GraphError::UnknownParent { .. })),
            "expected UnknownParent, got {:?}",
            result.err()
        );
    }

    #[test]
    fn duplicate_id_detected() {
        let nodes = vec![node("a", None), node("a", None)];
        assert!(matches!(validate(&nodes), Err(GraphError::DuplicateNodeId(_))));
    }

    #[test]
    fn self_parent_detected() {
        let nodes = vec![node("a", Some("a"))];
        assert!(matches!(validate(&nodes), Err(GraphError::SelfParent { .. })));
    }

    #[test]
    fn cycle_detected() {
        let nodes = vec![node("a", Some("b")), node("b", Some("a"))];
        assert!(matches!(validate(&nodes), Err(GraphError::CycleDetected)));
    }

    #[test]
    fn empty_id_detected() {
        let nodes = vec![node("", None)];
        assert!(matches!(validate(&nodes), Err(GraphError::EmptyNodeId)));
    }
}
