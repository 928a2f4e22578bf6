//! Worker node domain model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::domain::errors::{DomainError, DomainResult};

/// Name of something able to carry out work on behalf of a node,
/// typically an executor type or an external endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandlerRef(pub String);

impl HandlerRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HandlerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A worker with declared capabilities and concurrency capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub capabilities: BTreeSet<String>,
    pub max_concurrent_tasks: u32,
    pub current_load: u32,
    pub primary_handler: Option<HandlerRef>,
    pub fallback_handler: Option<HandlerRef>,
}

impl Node {
    pub fn new<I, S>(id: impl Into<String>, capabilities: I, max_concurrent_tasks: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            max_concurrent_tasks,
            current_load: 0,
            primary_handler: None,
            fallback_handler: None,
        }
    }

    pub fn with_primary_handler(mut self, handler: impl Into<String>) -> Self {
        self.primary_handler = Some(HandlerRef::new(handler));
        self
    }

    pub fn with_fallback_handler(mut self, handler: impl Into<String>) -> Self {
        self.fallback_handler = Some(HandlerRef::new(handler));
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.id.trim().is_empty() {
            return Err(DomainError::Validation("node id cannot be empty".into()));
        }
        if self.max_concurrent_tasks == 0 {
            return Err(DomainError::Validation(format!(
                "node {} must accept at least one concurrent task",
                self.id
            )));
        }
        if self.current_load > self.max_concurrent_tasks {
            return Err(DomainError::Validation(format!(
                "node {} load {} exceeds capacity {}",
                self.id, self.current_load, self.max_concurrent_tasks
            )));
        }
        Ok(())
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn has_free_slot(&self) -> bool {
        self.current_load < self.max_concurrent_tasks
    }

    /// Primary handler if declared, otherwise the fallback.
    pub fn resolve_handler(&self) -> DomainResult<&HandlerRef> {
        self.primary_handler
            .as_ref()
            .or(self.fallback_handler.as_ref())
            .ok_or_else(|| DomainError::NoHandlerAvailable(self.id.clone()))
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn utilization(&self) -> f64 {
        f64::from(self.current_load) / f64::from(self.max_concurrent_tasks.max(1))
    }
}

/// Per-node figures attached to each metric sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMetrics {
    pub node_id: String,
    pub current_load: u32,
    pub max_concurrent_tasks: u32,
    pub utilization: f64,
}

impl From<&Node> for NodeMetrics {
    fn from(node: &Node) -> Self {
        Self {
            node_id: node.id.clone(),
            current_load: node.current_load,
            max_concurrent_tasks: node.max_concurrent_tasks,
            utilization: node.utilization(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_handler_prefers_primary() {
        let node = Node::new("n1", ["code"], 2)
            .with_primary_handler("primary")
            .with_fallback_handler("fallback");
        assert_eq!(node.resolve_handler().unwrap().as_str(), "primary");

        let node = Node::new("n2", ["code"], 2).with_fallback_handler("fallback");
        assert_eq!(node.resolve_handler().unwrap().as_str(), "fallback");

        let node = Node::new("n3", ["code"], 2);
        assert!(matches!(
            node.resolve_handler(),
            Err(DomainError::NoHandlerAvailable(id)) if id == "n3"
        ));
    }

    #[test]
    fn test_validate_capacity() {
        assert!(Node::new("n1", ["a"], 0).validate().is_err());
        assert!(Node::new("", ["a"], 1).validate().is_err());
        assert!(Node::new("n1", Vec::<String>::new(), 1).validate().is_ok());
    }

    #[test]
    fn test_utilization() {
        let mut node = Node::new("n1", ["a"], 4);
        node.current_load = 1;
        assert!((node.utilization() - 0.25).abs() < f64::EPSILON);
        assert!(node.has_free_slot());
    }
}
