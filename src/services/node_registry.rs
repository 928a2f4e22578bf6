//! Registry of worker nodes and their declared capabilities.

use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{HandlerRef, Node, NodeMetrics};

#[derive(Default)]
struct RegistryState {
    nodes: HashMap<String, Node>,
    /// Registration order, used for capability lookups.
    order: Vec<String>,
}

/// Holds known worker nodes.
///
/// Capability lookup is a linear scan in registration order. Node sets are
/// small and change rarely, so an inverted capability index would cost more
/// bookkeeping than it saves.
#[derive(Default)]
pub struct NodeRegistry {
    state: RwLock<RegistryState>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node. Ids are unique; registering the same id twice fails.
    #[instrument(skip(self, node), fields(node_id = %node.id), err)]
    pub async fn register_node(&self, node: Node) -> DomainResult<Node> {
        node.validate()?;

        let mut state = self.state.write().await;
        if state.nodes.contains_key(&node.id) {
            return Err(DomainError::Validation(format!(
                "node {} is already registered",
                node.id
            )));
        }

        info!(
            capabilities = ?node.capabilities,
            max_concurrent_tasks = node.max_concurrent_tasks,
            "Node registered"
        );
        state.order.push(node.id.clone());
        state.nodes.insert(node.id.clone(), node.clone());
        Ok(node)
    }

    pub async fn get_node(&self, id: &str) -> Option<Node> {
        self.state.read().await.nodes.get(id).cloned()
    }

    /// Nodes in registration order.
    pub async fn list_nodes(&self) -> Vec<Node> {
        let state = self.state.read().await;
        state
            .order
            .iter()
            .filter_map(|id| state.nodes.get(id).cloned())
            .collect()
    }

    /// First registered node declaring `capability`.
    pub async fn find_node_for_capability(&self, capability: &str) -> Option<Node> {
        let state = self.state.read().await;
        let found = state
            .order
            .iter()
            .filter_map(|id| state.nodes.get(id))
            .find(|node| node.has_capability(capability))
            .cloned();
        debug!(capability, found = ?found.as_ref().map(|n| &n.id), "Capability lookup");
        found
    }

    /// Primary handler of the node, falling back to its fallback handler.
    pub async fn resolve_handler_for_node(&self, id: &str) -> DomainResult<HandlerRef> {
        let state = self.state.read().await;
        let node = state
            .nodes
            .get(id)
            .ok_or_else(|| DomainError::NodeNotFound(id.to_string()))?;
        node.resolve_handler().cloned()
    }

    /// Claim one unit of a node's capacity.
    pub async fn reserve_slot(&self, id: &str) -> DomainResult<Node> {
        let mut state = self.state.write().await;
        let node = state
            .nodes
            .get_mut(id)
            .ok_or_else(|| DomainError::NodeNotFound(id.to_string()))?;

        if !node.has_free_slot() {
            return Err(DomainError::NodeAtCapacity {
                node_id: node.id.clone(),
                max_concurrent_tasks: node.max_concurrent_tasks,
            });
        }
        node.current_load += 1;
        Ok(node.clone())
    }

    /// Return one unit of capacity. Saturates at zero.
    pub async fn release_slot(&self, id: &str) -> DomainResult<Node> {
        let mut state = self.state.write().await;
        let node = state
            .nodes
            .get_mut(id)
            .ok_or_else(|| DomainError::NodeNotFound(id.to_string()))?;
        node.current_load = node.current_load.saturating_sub(1);
        Ok(node.clone())
    }

    /// Per-node figures for metric samples.
    pub async fn node_metrics(&self) -> Vec<NodeMetrics> {
        self.list_nodes().await.iter().map(NodeMetrics::from).collect()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.nodes.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
