//! Typed edges between entity versions.
//!
//! Edges are not versioned: they exist or they do not. Each edge carries a
//! [`Dependence`] that decides whether a new version of one endpoint must be
//! announced to the other.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::keys;
use super::{PropertyMap, PropertyMapExt, Relationship, Value};
use crate::{Error, Result};

/// Edge types the engine creates itself.
pub mod types {
    /// Resource → managed entity. Carries cascade semantics.
    pub const MANAGES: &str = "manages";
    /// Resource → member entity. Membership only.
    pub const INCLUDES: &str = "includes";
    /// Relationship entity → its start component.
    pub const START: &str = "start";
    /// Relationship entity → its end component.
    pub const END: &str = "end";

    /// Structural edges are owned by the engine and cannot be unlinked.
    pub fn is_structural(edge_type: &str) -> bool {
        matches!(edge_type, MANAGES | INCLUDES | START | END)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeDirection {
    Directed,
    Bidirected,
}

impl EdgeDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeDirection::Directed => "directed",
            EdgeDirection::Bidirected => "bidirected",
        }
    }
}

impl std::str::FromStr for EdgeDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "directed" => Ok(EdgeDirection::Directed),
            "bidirected" => Ok(EdgeDirection::Bidirected),
            other => Err(Error::TypeError { expected: "edge direction".into(), got: format!("\"{other}\"") }),
        }
    }
}

/// Which endpoint of an edge an entity sits at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    Start,
    End,
}

impl Endpoint {
    pub fn opposite(self) -> Endpoint {
        match self {
            Endpoint::Start => Endpoint::End,
            Endpoint::End => Endpoint::Start,
        }
    }
}

/// Cascade classification of an edge.
///
/// For a directed edge:
///
/// | dependence | changed start | changed end |
/// |------------|---------------|-------------|
/// | `None`     | -             | -           |
/// | `Forward`  | notify end    | -           |
/// | `Inverse`  | -             | notify start|
/// | `Mutual`   | notify end    | notify start|
///
/// A bidirected edge is read in both orientations, so any dependence other
/// than `None` notifies the opposite endpoint whichever end changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dependence {
    None,
    Forward,
    Inverse,
    Mutual,
}

impl Dependence {
    pub fn as_str(self) -> &'static str {
        match self {
            Dependence::None => "none",
            Dependence::Forward => "forward",
            Dependence::Inverse => "inverse",
            Dependence::Mutual => "mutual",
        }
    }

    /// Whether a change at `changed` must be announced to the opposite endpoint.
    pub fn propagates_from(self, changed: Endpoint) -> bool {
        matches!(
            (self, changed),
            (Dependence::Forward, Endpoint::Start)
                | (Dependence::Inverse, Endpoint::End)
                | (Dependence::Mutual, _)
        )
    }
}

impl std::str::FromStr for Dependence {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Dependence::None),
            "forward" => Ok(Dependence::Forward),
            "inverse" => Ok(Dependence::Inverse),
            "mutual" => Ok(Dependence::Mutual),
            other => Err(Error::TypeError { expected: "dependence".into(), got: format!("\"{other}\"") }),
        }
    }
}

/// A typed, directional connection between two entity versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub uuid: Uuid,
    pub start: Uuid,
    pub end: Uuid,
    pub edge_type: String,
    pub direction: EdgeDirection,
    pub dependence: Dependence,
}

impl Edge {
    /// A directed edge with no dependence.
    pub fn new(start: Uuid, end: Uuid, edge_type: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            start,
            end,
            edge_type: edge_type.into(),
            direction: EdgeDirection::Directed,
            dependence: Dependence::None,
        }
    }

    pub fn with_direction(mut self, direction: EdgeDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_dependence(mut self, dependence: Dependence) -> Self {
        self.dependence = dependence;
        self
    }

    pub fn is_structural(&self) -> bool {
        types::is_structural(&self.edge_type)
    }

    pub fn endpoint_of(&self, entity: Uuid) -> Option<Endpoint> {
        if entity == self.start { Some(Endpoint::Start) }
        else if entity == self.end { Some(Endpoint::End) }
        else { None }
    }

    /// The uuid at the other end from `entity`, if `entity` is an endpoint.
    pub fn other_end(&self, entity: Uuid) -> Option<Uuid> {
        match self.endpoint_of(entity)? {
            Endpoint::Start => Some(self.end),
            Endpoint::End => Some(self.start),
        }
    }

    /// The entity to notify when `changed` gets a new version, if any.
    ///
    /// Self-loops never notify: an entity is not its own dependent.
    pub fn cascade_target(&self, changed: Uuid) -> Option<Uuid> {
        if self.start == self.end {
            return None;
        }
        let at = self.endpoint_of(changed)?;
        let fires = self.dependence.propagates_from(at)
            || (self.direction == EdgeDirection::Bidirected
                && self.dependence.propagates_from(at.opposite()));
        if fires { self.other_end(changed) } else { None }
    }

    /// Whether a change can travel back over this edge to where it came from.
    pub fn is_symmetric(&self) -> bool {
        self.dependence != Dependence::None
            && (self.direction == EdgeDirection::Bidirected || self.dependence == Dependence::Mutual)
    }

    /// Properties of the store relationship backing this edge.
    pub fn to_properties(&self) -> PropertyMap {
        let mut props = PropertyMap::new();
        props.insert(keys::UUID.into(), Value::from(self.uuid));
        props.insert(keys::START.into(), Value::from(self.start));
        props.insert(keys::END.into(), Value::from(self.end));
        props.insert(keys::DIRECTION.into(), Value::from(self.direction.as_str()));
        props.insert(keys::DEPENDENCE.into(), Value::from(self.dependence.as_str()));
        props
    }

    pub fn from_relationship(rel: &Relationship) -> Result<Edge> {
        let props = &rel.properties;
        Ok(Edge {
            uuid: props.require_uuid(keys::UUID)?,
            start: props.require_uuid(keys::START)?,
            end: props.require_uuid(keys::END)?,
            edge_type: rel.rel_type.clone(),
            direction: props.require_str(keys::DIRECTION)?.parse()?,
            dependence: props.require_str(keys::DEPENDENCE)?.parse()?,
        })
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({})-[:{} {}/{}]->({})",
            self.start,
            self.edge_type,
            self.direction.as_str(),
            self.dependence.as_str(),
            self.end
        )
    }
}
