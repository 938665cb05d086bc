// Node Registry - the fixed set of nodes every other component references

use std::collections::HashMap;
use thiserror::Error;

use crate::registry::node::{Node, NodeConfig, NodeId};

/// Errors that can occur during registry operations
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),
}

/// Holds the fixed set of nodes, created once at startup.
///
/// Set membership is immutable for the process lifetime; only the
/// per-node connectivity flag changes after construction.
#[derive(Debug)]
pub struct NodeRegistry {
    nodes: Vec<Node>,
    index: HashMap<NodeId, usize>,
}

impl NodeRegistry {
    /// Build the registry from static configuration
    pub fn new(configs: Vec<NodeConfig>) -> Self {
        let mut nodes = Vec::with_capacity(configs.len());
        let mut index = HashMap::with_capacity(configs.len());

        for config in configs {
            let node = Node::from_config(config);
            index.insert(node.id(), nodes.len());
            nodes.push(node);
        }

        Self { nodes, index }
    }

    /// Look up a node by id
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.index.get(&id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.index.contains_key(&id)
    }

    /// All nodes in insertion order
    pub fn list(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Toggle a node's connectivity flag; returns the previous state
    pub fn set_connected(&self, id: NodeId, connected: bool) -> Result<bool, RegistryError> {
        self.get(id)
            .map(|node| node.set_connected(connected))
            .ok_or(RegistryError::UnknownNode(id))
    }

    /// Whether a node is currently connected; unknown nodes count as disconnected
    pub fn is_connected(&self, id: NodeId) -> bool {
        self.get(id).map(|node| node.is_connected()).unwrap_or(false)
    }
}
