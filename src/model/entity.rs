//! Versioned entities: resources, components and relationships.
//!
//! Every entity version is an immutable store node. A version is *valid*
//! while its validity window is open; producing a new version closes the
//! window of the previous one. Versions of the same entity form a lineage
//! identified by (kind, scope, id).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::keys;
use super::{Node, PropertyMap, PropertyMapExt, Value};
use crate::{Error, Result};

/// The closed set of entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Resource,
    Component,
    Relationship,
}

impl EntityKind {
    /// Store label carried by every version of this kind.
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Resource => "prov:Resource",
            EntityKind::Component => "prov:Component",
            EntityKind::Relationship => "prov:Relationship",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Resource => "resource",
            EntityKind::Component => "component",
            EntityKind::Relationship => "relationship",
        }
    }

    /// Components and relationships live inside a resource scope.
    pub fn is_scoped(self) -> bool {
        !matches!(self, EntityKind::Resource)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "resource" => Ok(EntityKind::Resource),
            "component" => Ok(EntityKind::Component),
            "relationship" => Ok(EntityKind::Relationship),
            other => Err(Error::TypeError {
                expected: "entity kind".into(),
                got: format!("\"{other}\""),
            }),
        }
    }
}

/// Kind-specific shape of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Variant {
    Resource,
    Component,
    /// An edge-like entity between two components. Endpoints name component
    /// versions; the engine re-points them at the current versions when a
    /// relationship version is added.
    Relationship { start: Uuid, end: Uuid },
}

impl Variant {
    pub fn kind(&self) -> EntityKind {
        match self {
            Variant::Resource => EntityKind::Resource,
            Variant::Component => EntityKind::Component,
            Variant::Relationship { .. } => EntityKind::Relationship,
        }
    }
}

/// The interval during which a version is current. `until == None` means open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validity {
    pub since: DateTime<Utc>,
    pub until: Option<DateTime<Utc>>,
}

impl Validity {
    pub fn open(since: DateTime<Utc>) -> Self {
        Self { since, until: None }
    }

    pub fn is_open(&self) -> bool {
        self.until.is_none()
    }
}

/// Identity shared by every version of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Lineage {
    pub kind: EntityKind,
    pub resource: Option<String>,
    pub id: String,
}

impl Lineage {
    pub fn new(kind: EntityKind, id: impl Into<String>, resource: Option<&str>) -> Self {
        Self { kind, resource: resource.map(str::to_owned), id: id.into() }
    }

    /// Scope name used in messages and the active key; resources share the
    /// global scope `""`.
    pub fn scope(&self) -> &str {
        self.resource.as_deref().unwrap_or("")
    }

    /// Value of [`keys::ACTIVE_KEY`] for the valid version of this lineage.
    ///
    /// The scope is length-prefixed, so ids and scopes may contain any
    /// character without two lineages sharing a key.
    pub fn active_key(&self) -> String {
        let scope = self.scope();
        format!("{}:{}:{}:{}", self.kind, scope.len(), scope, self.id)
    }

    pub fn conflict(&self) -> Error {
        Error::Conflict {
            kind: self.kind,
            scope: self.scope().to_owned(),
            id: self.id.clone(),
        }
    }
}

impl fmt::Display for Lineage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resource {
            Some(r) => write!(f, "{} '{}' in '{}'", self.kind, self.id, r),
            None => write!(f, "{} '{}'", self.kind, self.id),
        }
    }
}

/// One version of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub uuid: Uuid,
    pub id: String,
    pub version: u64,
    /// Scope-relative id of the owning resource. `None` for resources.
    pub resource: Option<String>,
    pub variant: Variant,
    pub validity: Validity,
    pub attributes: PropertyMap,
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        self.variant.kind()
    }

    pub fn is_valid(&self) -> bool {
        self.validity.is_open()
    }

    pub fn lineage(&self) -> Lineage {
        Lineage::new(self.kind(), self.id.clone(), self.resource.as_deref())
    }

    /// The next version of this entity carrying `attributes`.
    ///
    /// The successor gets a fresh uuid, `version + 1` and an open validity
    /// window; it is not stored until passed to `versioning::set`.
    pub fn successor(&self, attributes: PropertyMap) -> Entity {
        Entity {
            uuid: Uuid::new_v4(),
            id: self.id.clone(),
            version: self.version + 1,
            resource: self.resource.clone(),
            variant: self.variant.clone(),
            validity: Validity::open(Utc::now()),
            attributes,
        }
    }

    /// Labels the version is stored under.
    pub fn labels(&self) -> [&'static str; 2] {
        [keys::ENTITY_LABEL, self.kind().label()]
    }

    /// Store representation of this version.
    pub fn to_properties(&self) -> PropertyMap {
        let mut props = PropertyMap::new();
        props.insert(keys::UUID.into(), Value::from(self.uuid));
        props.insert(keys::ID.into(), Value::from(self.id.as_str()));
        props.insert(keys::KIND.into(), Value::from(self.kind().as_str()));
        props.insert(keys::VERSION.into(), Value::Int(self.version as i64));
        props.insert(keys::RESOURCE.into(), Value::from(self.resource.clone()));
        props.insert(keys::VALID_SINCE.into(), Value::from(self.validity.since));
        props.insert(keys::VALID_UNTIL.into(), Value::from(self.validity.until));
        props.insert(keys::ATTRIBUTES.into(), Value::Map(self.attributes.clone()));
        if let Variant::Relationship { start, end } = &self.variant {
            props.insert(keys::START.into(), Value::from(*start));
            props.insert(keys::END.into(), Value::from(*end));
        }
        if self.is_valid() {
            props.insert(keys::ACTIVE_KEY.into(), Value::from(self.lineage().active_key()));
        }
        props
    }

    /// Decode a version from its store node.
    pub fn from_node(node: &Node) -> Result<Entity> {
        let props = &node.properties;
        let kind: EntityKind = props.require_str(keys::KIND)?.parse()?;
        let variant = match kind {
            EntityKind::Resource => Variant::Resource,
            EntityKind::Component => Variant::Component,
            EntityKind::Relationship => Variant::Relationship {
                start: props.require_uuid(keys::START)?,
                end: props.require_uuid(keys::END)?,
            },
        };
        let version = props.require_int(keys::VERSION)?;
        let attributes = match props.get(keys::ATTRIBUTES) {
            Some(Value::Map(m)) => m.clone(),
            None | Some(Value::Null) => PropertyMap::new(),
            Some(other) => {
                return Err(Error::TypeError {
                    expected: format!("MAP at '{}'", keys::ATTRIBUTES),
                    got: other.type_name().into(),
                })
            }
        };

        Ok(Entity {
            uuid: props.require_uuid(keys::UUID)?,
            id: props.require_str(keys::ID)?.to_owned(),
            version: u64::try_from(version).map_err(|_| Error::TypeError {
                expected: "non-negative version".into(),
                got: version.to_string(),
            })?,
            resource: props.optional_str(keys::RESOURCE)?.map(str::to_owned),
            variant,
            validity: Validity {
                since: props.require_datetime(keys::VALID_SINCE)?,
                until: props.optional_datetime(keys::VALID_UNTIL)?,
            },
            attributes,
        })
    }
}

/// Request for the first version of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEntity {
    pub id: String,
    pub resource: Option<String>,
    pub variant: Variant,
    pub attributes: PropertyMap,
}

impl NewEntity {
    pub fn resource(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resource: None,
            variant: Variant::Resource,
            attributes: PropertyMap::new(),
        }
    }

    pub fn component(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resource: Some(resource.into()),
            variant: Variant::Component,
            attributes: PropertyMap::new(),
        }
    }

    pub fn relationship(
        resource: impl Into<String>,
        id: impl Into<String>,
        start: Uuid,
        end: Uuid,
    ) -> Self {
        Self {
            id: id.into(),
            resource: Some(resource.into()),
            variant: Variant::Relationship { start, end },
            attributes: PropertyMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_attributes(mut self, attributes: PropertyMap) -> Self {
        self.attributes = attributes;
        self
    }

    /// Version 1 of the requested entity, valid from `now`.
    pub fn into_entity(self, now: DateTime<Utc>) -> Entity {
        Entity {
            uuid: Uuid::new_v4(),
            id: self.id,
            version: 1,
            resource: self.resource,
            variant: self.variant,
            validity: Validity::open(now),
            attributes: self.attributes,
        }
    }
}
