//! # Graph Model
//!
//! Two layers of plain data:
//!
//! - Store DTOs (`Node`, `Relationship`, `Value`, `PropertyMap`) exchanged
//!   with a `StorageBackend`.
//! - The versioned entity model (`Entity`, `Edge`) the engine maps onto them.
//!
//! Design rule: this module is pure data. No I/O, no state, no async.

pub mod node;
pub mod relationship;
pub mod value;
pub mod property_map;
pub mod entity;
pub mod edge;

pub use node::{Node, NodeId};
pub use relationship::{Relationship, RelId, Direction};
pub use value::Value;
pub use property_map::{PropertyMap, PropertyMapExt};
pub use entity::{Entity, EntityKind, Variant, Validity, Lineage, NewEntity};
pub use edge::{Edge, EdgeDirection, Dependence, Endpoint};

/// Property keys and labels the engine writes into the store.
///
/// All engine-owned keys live under the `prov:` prefix so they never collide
/// with user attributes, which are nested under [`keys::ATTRIBUTES`].
pub mod keys {
    pub const ENTITY_LABEL: &str = "prov:Entity";
    pub const EVENT_LABEL: &str = "prov:Event";

    pub const UUID: &str = "prov:uuid";
    pub const ID: &str = "prov:id";
    pub const KIND: &str = "prov:kind";
    pub const VERSION: &str = "prov:version";
    pub const RESOURCE: &str = "prov:resource";
    pub const VALID_SINCE: &str = "prov:valid_since";
    pub const VALID_UNTIL: &str = "prov:valid_until";
    /// `<kind>/<scope>/<id>`, present only while the version is valid.
    pub const ACTIVE_KEY: &str = "prov:active_key";
    pub const ATTRIBUTES: &str = "prov:attributes";
    pub const START: &str = "prov:start";
    pub const END: &str = "prov:end";

    pub const DIRECTION: &str = "prov:direction";
    pub const DEPENDENCE: &str = "prov:dependence";

    pub const EVENT: &str = "prov:event";
    pub const ENTITY: &str = "prov:entity";
    pub const PREVIOUS: &str = "prov:previous";
    pub const SUCCESSOR: &str = "prov:successor";
    pub const EDGE: &str = "prov:edge";
    pub const TX: &str = "prov:tx";
    pub const TIME: &str = "prov:time";
}
