//! Provenance records: one audit entry per engine event.
//!
//! Records are returned to callers and, unless disabled in `GraphConfig`,
//! stored as `prov:Event` nodes in the same transaction as the change they
//! describe. A rolled-back change therefore leaves no record behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::model::keys;
use crate::model::{Node, PropertyMap, PropertyMapExt, Value};
use crate::storage::StorageBackend;
use crate::tx::{Transaction, TxId};
use crate::versioning::Context;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvEvent {
    /// A version was added.
    Created,
    /// A version's validity window was closed.
    Invalidated,
    /// A version replaced its predecessor.
    Revised,
    /// A dependency of `entity` transitioned.
    DependencyChanged,
    EdgeAdded,
    EdgeRemoved,
}

impl ProvEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            ProvEvent::Created => "created",
            ProvEvent::Invalidated => "invalidated",
            ProvEvent::Revised => "revised",
            ProvEvent::DependencyChanged => "dependency_changed",
            ProvEvent::EdgeAdded => "edge_added",
            ProvEvent::EdgeRemoved => "edge_removed",
        }
    }
}

impl std::str::FromStr for ProvEvent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "created" => Ok(ProvEvent::Created),
            "invalidated" => Ok(ProvEvent::Invalidated),
            "revised" => Ok(ProvEvent::Revised),
            "dependency_changed" => Ok(ProvEvent::DependencyChanged),
            "edge_added" => Ok(ProvEvent::EdgeAdded),
            "edge_removed" => Ok(ProvEvent::EdgeRemoved),
            other => Err(Error::TypeError { expected: "provenance event".into(), got: format!("\"{other}\"") }),
        }
    }
}

/// An audit entry describing one event.
///
/// `entity` is the subject. For `Revised` and `DependencyChanged`, `previous`
/// names the version that was replaced and `successor` the one replacing it
/// (absent when the entity was retired).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub uuid: Uuid,
    pub event: ProvEvent,
    pub entity: Uuid,
    pub previous: Option<Uuid>,
    pub successor: Option<Uuid>,
    pub edge: Option<Uuid>,
    pub tx: TxId,
    pub time: DateTime<Utc>,
}

impl Provenance {
    pub fn new(event: ProvEvent, entity: Uuid, tx: TxId) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            event,
            entity,
            previous: None,
            successor: None,
            edge: None,
            tx,
            time: Utc::now(),
        }
    }

    pub fn with_previous(mut self, previous: Uuid) -> Self {
        self.previous = Some(previous);
        self
    }

    pub fn with_successor(mut self, successor: Option<Uuid>) -> Self {
        self.successor = successor;
        self
    }

    pub fn with_edge(mut self, edge: Uuid) -> Self {
        self.edge = Some(edge);
        self
    }

    fn to_properties(&self) -> PropertyMap {
        let mut props = PropertyMap::new();
        props.insert(keys::UUID.into(), Value::from(self.uuid));
        props.insert(keys::EVENT.into(), Value::from(self.event.as_str()));
        props.insert(keys::ENTITY.into(), Value::from(self.entity));
        props.insert(keys::PREVIOUS.into(), Value::from(self.previous));
        props.insert(keys::SUCCESSOR.into(), Value::from(self.successor));
        props.insert(keys::EDGE.into(), Value::from(self.edge));
        props.insert(keys::TX.into(), Value::Int(self.tx.0 as i64));
        props.insert(keys::TIME.into(), Value::from(self.time));
        props
    }

    fn from_node(node: &Node) -> Result<Self> {
        let props = &node.properties;
        Ok(Self {
            uuid: props.require_uuid(keys::UUID)?,
            event: props.require_str(keys::EVENT)?.parse()?,
            entity: props.require_uuid(keys::ENTITY)?,
            previous: props.optional_uuid(keys::PREVIOUS)?,
            successor: props.optional_uuid(keys::SUCCESSOR)?,
            edge: props.optional_uuid(keys::EDGE)?,
            tx: TxId(props.require_int(keys::TX)? as u64),
            time: props.require_datetime(keys::TIME)?,
        })
    }
}

/// Build a record stamped with `tx`'s id and store it if recording is on.
pub async fn record<B: StorageBackend>(
    cx: &Context<'_, B>,
    tx: &mut B::Tx,
    event: ProvEvent,
    entity: Uuid,
    fill: impl FnOnce(Provenance) -> Provenance + Send,
) -> Result<Provenance> {
    let prov = fill(Provenance::new(event, entity, tx.id()));
    if cx.record_provenance {
        cx.backend
            .create_node(tx, &[keys::EVENT_LABEL], prov.to_properties())
            .await?;
    }
    debug!(event = prov.event.as_str(), entity = %prov.entity, tx = %prov.tx, "provenance");
    Ok(prov)
}

/// Stored records whose subject is `entity`, oldest first.
pub async fn about<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    entity: Uuid,
) -> Result<Vec<Provenance>> {
    let mut nodes = backend
        .nodes_by_property(tx, keys::EVENT_LABEL, keys::ENTITY, &Value::from(entity))
        .await?;
    // Creation order breaks ties between records with the same timestamp.
    nodes.sort_by_key(|n| n.id);
    let mut records = nodes.iter().map(Provenance::from_node).collect::<Result<Vec<_>>>()?;
    records.sort_by_key(|p| p.time);
    Ok(records)
}
