//! Relationship (store-level edge) in the backing property graph.
//!
//! This is the raw store record. The engine's typed view of it, with
//! direction and dependence, is [`super::Edge`].

use serde::{Deserialize, Serialize};
use super::{NodeId, PropertyMap};

/// Opaque relationship identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelId(pub u64);

impl std::fmt::Display for RelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side of a node to look at when listing its relationships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

/// A stored relationship. Always directed `src -> dst` at this level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: RelId,
    pub src: NodeId,
    pub dst: NodeId,
    pub rel_type: String,
    pub properties: PropertyMap,
}

impl Relationship {
    pub fn new(
        id: RelId,
        src: NodeId,
        dst: NodeId,
        rel_type: impl Into<String>,
        properties: PropertyMap,
    ) -> Self {
        Self { id, src, dst, rel_type: rel_type.into(), properties }
    }

    /// Whether `node` is on the `dir` side of this relationship.
    pub fn touches(&self, node: NodeId, dir: Direction) -> bool {
        match dir {
            Direction::Outgoing => self.src == node,
            Direction::Incoming => self.dst == node,
            Direction::Both => self.src == node || self.dst == node,
        }
    }
}
