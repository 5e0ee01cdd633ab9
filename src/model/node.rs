//! Node record of the backing property graph.
//!
//! Entity versions and provenance events are both stored as nodes; see
//! [`super::Entity::from_node`] for the decoding side.

use serde::{Deserialize, Serialize};
use super::{PropertyMap, Value};

/// Opaque node identifier, assigned by the store in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub labels: Vec<String>,
    pub properties: PropertyMap,
}

impl Node {
    pub fn new(id: NodeId, labels: &[&str], properties: PropertyMap) -> Self {
        Self {
            id,
            labels: labels.iter().map(|l| l.to_string()).collect(),
            properties,
        }
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}
