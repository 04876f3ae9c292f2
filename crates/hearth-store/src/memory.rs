use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use hearth_domain::{Node, NodeId, PowerState, ServerAction};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::store::{NodeStore, ACTION_LOG_CAP};

#[derive(Debug, Default)]
struct Inner {
    nodes: HashMap<NodeId, Node>,
    actions: HashMap<NodeId, VecDeque<ServerAction>>,
}

/// In-memory implementation of [`NodeStore`].
///
/// All state is released with the process; persistence of metric history
/// belongs to the time-series writer.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NodeStore for InMemoryStore {
    async fn get(&self, id: &NodeId) -> Result<Node, StoreError> {
        let guard = self.inner.read().await;
        guard
            .nodes
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list(&self) -> Vec<Node> {
        let guard = self.inner.read().await;
        guard.nodes.values().cloned().collect()
    }

    async fn add(&self, node: Node) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if guard.nodes.contains_key(&node.id) {
            return Err(StoreError::AlreadyExists(node.id.to_string()));
        }
        guard.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    async fn update(&self, node: Node) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if !guard.nodes.contains_key(&node.id) {
            return Err(StoreError::NotFound(node.id.to_string()));
        }
        guard.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    async fn set_desired_state(&self, id: &NodeId, state: PowerState) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let node = guard
            .nodes
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        node.desired = state;
        Ok(())
    }

    async fn update_observed_state(
        &self,
        id: &NodeId,
        state: PowerState,
    ) -> Result<Option<PowerState>, StoreError> {
        let mut guard = self.inner.write().await;
        let node = guard
            .nodes
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let previous = node.observed;
        if previous == state {
            return Ok(None);
        }

        let now = Utc::now();
        let dwell = (now - node.last_state_change)
            .to_std()
            .unwrap_or_default();
        match previous {
            PowerState::On => node.total_on_time += dwell,
            PowerState::Suspended => node.total_suspended_time += dwell,
            PowerState::Off | PowerState::Stopped => node.total_off_time += dwell,
            _ => {}
        }

        node.observed = state;
        node.last_state_change = now;
        Ok(Some(previous))
    }

    async fn append_action(&self, id: &NodeId, action: ServerAction) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if !guard.nodes.contains_key(id) {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let log = guard.actions.entry(id.clone()).or_default();
        if log.len() >= ACTION_LOG_CAP {
            log.pop_front();
        }
        log.push_back(action);
        Ok(())
    }

    async fn actions(&self, id: &NodeId) -> Result<Vec<ServerAction>, StoreError> {
        let guard = self.inner.read().await;
        if !guard.nodes.contains_key(id) {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(guard
            .actions
            .get(id)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_domain::ActionKind;
    use std::time::Duration;

    fn dummy_node(id: &str) -> Node {
        Node::physical(id, format!("{}.lan", id))
    }

    #[tokio::test]
    async fn add_and_get() {
        let store = InMemoryStore::new();
        store.add(dummy_node("srv1")).await.unwrap();

        let got = store.get(&NodeId::new("srv1")).await.unwrap();
        assert_eq!(got.id.as_str(), "srv1");
    }

    #[tokio::test]
    async fn add_twice_conflicts() {
        let store = InMemoryStore::new();
        store.add(dummy_node("srv1")).await.unwrap();
        assert!(matches!(
            store.add(dummy_node("srv1")).await,
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.get(&NodeId::new("ghost")).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn update_replaces_by_id() {
        let store = InMemoryStore::new();
        store.add(dummy_node("srv1")).await.unwrap();

        let mut node = store.get(&NodeId::new("srv1")).await.unwrap();
        node.name = "renamed".into();
        store.update(node).await.unwrap();

        assert_eq!(store.get(&NodeId::new("srv1")).await.unwrap().name, "renamed");
    }

    #[tokio::test]
    async fn reads_are_defensive_copies() {
        let store = InMemoryStore::new();
        store.add(dummy_node("srv1")).await.unwrap();

        let mut copy = store.get(&NodeId::new("srv1")).await.unwrap();
        copy.name = "mutated locally".into();

        assert!(store.get(&NodeId::new("srv1")).await.unwrap().name.is_empty());
    }

    #[tokio::test]
    async fn observed_transition_stamps_change_and_returns_prior() {
        let store = InMemoryStore::new();
        store.add(dummy_node("srv1")).await.unwrap();
        let id = NodeId::new("srv1");

        let before = store.get(&id).await.unwrap().last_state_change;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let prior = store.update_observed_state(&id, PowerState::On).await.unwrap();
        assert_eq!(prior, Some(PowerState::Unknown));

        let node = store.get(&id).await.unwrap();
        assert_eq!(node.observed, PowerState::On);
        assert!(node.last_state_change > before);
    }

    #[tokio::test]
    async fn same_state_transition_is_a_noop() {
        let store = InMemoryStore::new();
        store.add(dummy_node("srv1")).await.unwrap();
        let id = NodeId::new("srv1");

        store.update_observed_state(&id, PowerState::On).await.unwrap();
        let stamped = store.get(&id).await.unwrap().last_state_change;

        let prior = store.update_observed_state(&id, PowerState::On).await.unwrap();
        assert_eq!(prior, None);
        assert_eq!(store.get(&id).await.unwrap().last_state_change, stamped);
    }

    #[tokio::test]
    async fn on_time_accrues_when_leaving_on() {
        let store = InMemoryStore::new();
        store.add(dummy_node("srv1")).await.unwrap();
        let id = NodeId::new("srv1");

        store.update_observed_state(&id, PowerState::On).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.update_observed_state(&id, PowerState::Off).await.unwrap();

        let node = store.get(&id).await.unwrap();
        assert!(node.total_on_time >= Duration::from_millis(10));
        assert_eq!(node.total_suspended_time, Duration::ZERO);
    }

    #[tokio::test]
    async fn action_log_is_bounded_and_drops_oldest() {
        let store = InMemoryStore::new();
        store.add(dummy_node("srv1")).await.unwrap();
        let id = NodeId::new("srv1");

        for i in 0..(ACTION_LOG_CAP + 5) {
            store
                .append_action(
                    &id,
                    ServerAction::failure(ActionKind::Wake, "test", format!("err {}", i)),
                )
                .await
                .unwrap();
        }

        let actions = store.actions(&id).await.unwrap();
        assert_eq!(actions.len(), ACTION_LOG_CAP);
        // Entry 0..4 dropped; the first retained one is err 5.
        assert_eq!(actions[0].error_message.as_deref(), Some("err 5"));
        // Appends stay totally ordered per node.
        assert_eq!(
            actions.last().unwrap().error_message.as_deref(),
            Some(&*format!("err {}", ACTION_LOG_CAP + 4))
        );
    }

    #[tokio::test]
    async fn actions_for_unknown_node_is_not_found() {
        let store = InMemoryStore::new();
        assert!(store.actions(&NodeId::new("ghost")).await.is_err());
    }
}
