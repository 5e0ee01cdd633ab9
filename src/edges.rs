//! Creating, removing and listing typed edges.
//!
//! An edge connects versions, but it follows its endpoints forward: when an
//! endpoint is replaced, `carry_forward` stores a copy of the edge against
//! the successor. Copies share the edge's uuid, so one logical edge may be
//! stored several times, once per version pair it has connected.

use tracing::debug;
use uuid::Uuid;

use crate::model::edge::{types, Endpoint};
use crate::model::keys;
use crate::model::{Direction, Edge, Entity, NodeId, RelId, Value};
use crate::provenance::{self, ProvEvent};
use crate::storage::StorageBackend;
use crate::versioning::{self, Context};
use crate::{Error, Result};

/// Store `edge` as a relationship between two known nodes.
pub(crate) async fn create_between<B: StorageBackend>(
    backend: &B,
    tx: &mut B::Tx,
    src: NodeId,
    dst: NodeId,
    edge: &Edge,
) -> Result<RelId> {
    let id = backend
        .create_relationship(tx, src, dst, &edge.edge_type, edge.to_properties())
        .await?;
    debug!(edge = %edge, "edge created");
    Ok(id)
}

/// Edges touching a node, in creation order.
pub(crate) async fn incident<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    node: NodeId,
) -> Result<Vec<Edge>> {
    backend
        .get_relationships(tx, node, Direction::Both, None)
        .await?
        .iter()
        .map(Edge::from_relationship)
        .collect()
}

/// Connect two entity versions.
///
/// Both endpoints must exist; they need not be valid, so history can be
/// annotated after the fact. An edge to a closed version is not carried
/// forward when the other endpoint is replaced.
pub async fn link<B: StorageBackend>(
    cx: &Context<'_, B>,
    tx: &mut B::Tx,
    edge: Edge,
) -> Result<Edge> {
    if edge.is_structural() {
        return Err(Error::InvalidEntity(format!(
            "'{}' edges are maintained by the engine",
            edge.edge_type
        )));
    }
    let (start_node, _) = versioning::locate(cx.backend, tx, edge.start).await?;
    let (end_node, _) = versioning::locate(cx.backend, tx, edge.end).await?;
    create_between(cx.backend, tx, start_node, end_node, &edge).await?;

    let edge_uuid = edge.uuid;
    provenance::record(cx, tx, ProvEvent::EdgeAdded, edge.start, |p| p.with_edge(edge_uuid)).await?;
    Ok(edge)
}

/// Remove a user edge, with every copy carried forward from it.
/// Structural edges cannot be removed.
pub async fn unlink<B: StorageBackend>(
    cx: &Context<'_, B>,
    tx: &mut B::Tx,
    uuid: Uuid,
) -> Result<Edge> {
    let rels = cx
        .backend
        .relationships_by_property(tx, keys::ENTITY_LABEL, keys::UUID, &Value::from(uuid))
        .await?;
    let latest = rels
        .iter()
        .max_by_key(|r| r.id)
        .ok_or_else(|| Error::NotFound(format!("edge {uuid}")))?;
    let edge = Edge::from_relationship(latest)?;
    if edge.is_structural() {
        return Err(Error::InvalidEntity(format!(
            "'{}' edges are maintained by the engine",
            edge.edge_type
        )));
    }

    for rel in &rels {
        cx.backend.delete_relationship(tx, rel.id).await?;
    }
    debug!(edge = %edge, copies = rels.len(), "edge removed");
    provenance::record(cx, tx, ProvEvent::EdgeRemoved, edge.start, |p| p.with_edge(uuid)).await?;
    Ok(edge)
}

/// Edges `add` creates for a new version itself: ownership edges into a
/// member and endpoint edges out of a relationship.
fn recreated_by_add(edge: &Edge, at: Endpoint) -> bool {
    matches!(
        (edge.edge_type.as_str(), at),
        (types::MANAGES | types::INCLUDES, Endpoint::End) | (types::START | types::END, Endpoint::Start)
    )
}

/// Copy the edges of `old` onto its successor `new`.
///
/// An edge is copied when its other endpoint is still valid, with `old`
/// replaced by `new` at the same end; uuid, type, direction and dependence
/// are kept. Edges to closed versions stay behind as history. Returns the
/// number of edges copied.
pub(crate) async fn carry_forward<B: StorageBackend>(
    backend: &B,
    tx: &mut B::Tx,
    old: &Entity,
    new: &Entity,
) -> Result<usize> {
    let (old_node, _) = versioning::locate(backend, tx, old.uuid).await?;
    let (new_node, _) = versioning::locate(backend, tx, new.uuid).await?;

    let mut carried = 0;
    for edge in incident(backend, tx, old_node).await? {
        let Some(at) = edge.endpoint_of(old.uuid) else { continue };
        if recreated_by_add(&edge, at) {
            continue;
        }

        if edge.start == edge.end {
            let copy = Edge { start: new.uuid, end: new.uuid, ..edge };
            create_between(backend, tx, new_node, new_node, &copy).await?;
            carried += 1;
            continue;
        }

        let Some(other) = edge.other_end(old.uuid) else { continue };
        let (other_node, other_entity) = versioning::locate(backend, tx, other).await?;
        if !other_entity.is_valid() {
            continue;
        }
        match at {
            Endpoint::Start => {
                let copy = Edge { start: new.uuid, ..edge };
                create_between(backend, tx, new_node, other_node, &copy).await?;
            }
            Endpoint::End => {
                let copy = Edge { end: new.uuid, ..edge };
                create_between(backend, tx, other_node, new_node, &copy).await?;
            }
        }
        carried += 1;
    }
    Ok(carried)
}

/// Every edge touching the entity version `uuid`.
pub async fn of_entity<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    uuid: Uuid,
) -> Result<Vec<Edge>> {
    let (node, _) = versioning::locate(backend, tx, uuid).await?;
    incident(backend, tx, node).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::model::{Dependence, NewEntity, PropertyMap};
    use crate::tx::TxMode;
    use crate::storage::MemoryBackend;

    #[tokio::test]
    async fn test_link_and_unlink() {
        let db = MemoryBackend::new();
        let cx = Context { backend: &db, hooks: &[], record_provenance: true };
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let a = versioning::add(&cx, &mut tx, NewEntity::resource("a").into_entity(Utc::now())).await.unwrap().entity;
        let b = versioning::add(&cx, &mut tx, NewEntity::resource("b").into_entity(Utc::now())).await.unwrap().entity;

        let edge = link(&cx, &mut tx, Edge::new(a.uuid, b.uuid, "feeds").with_dependence(Dependence::Forward))
            .await
            .unwrap();
        assert_eq!(of_entity(&db, &tx, b.uuid).await.unwrap(), vec![edge.clone()]);

        let removed = unlink(&cx, &mut tx, edge.uuid).await.unwrap();
        assert_eq!(removed, edge);
        assert!(of_entity(&db, &tx, a.uuid).await.unwrap().is_empty());
        assert!(matches!(unlink(&cx, &mut tx, edge.uuid).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_structural_edges_are_protected() {
        let db = MemoryBackend::new();
        let cx = Context { backend: &db, hooks: &[], record_provenance: true };
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let r = versioning::add(&cx, &mut tx, NewEntity::resource("r").into_entity(Utc::now())).await.unwrap().entity;
        let c = versioning::add(&cx, &mut tx, NewEntity::component("r", "c").into_entity(Utc::now())).await.unwrap().entity;

        let manages = of_entity(&db, &tx, c.uuid)
            .await
            .unwrap()
            .into_iter()
            .find(|e| e.edge_type == types::MANAGES)
            .unwrap();
        assert!(matches!(unlink(&cx, &mut tx, manages.uuid).await, Err(Error::InvalidEntity(_))));
        assert!(matches!(
            link(&cx, &mut tx, Edge::new(r.uuid, c.uuid, types::INCLUDES)).await,
            Err(Error::InvalidEntity(_))
        ));
    }

    #[tokio::test]
    async fn test_link_requires_existing_endpoints() {
        let db = MemoryBackend::new();
        let cx = Context { backend: &db, hooks: &[], record_provenance: true };
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let a = versioning::add(&cx, &mut tx, NewEntity::resource("a").into_entity(Utc::now())).await.unwrap().entity;
        let result = link(&cx, &mut tx, Edge::new(a.uuid, Uuid::new_v4(), "feeds")).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_edges_follow_replaced_endpoints() {
        let db = MemoryBackend::new();
        let cx = Context { backend: &db, hooks: &[], record_provenance: false };
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let a = versioning::add(&cx, &mut tx, NewEntity::resource("a").into_entity(Utc::now())).await.unwrap().entity;
        let b = versioning::add(&cx, &mut tx, NewEntity::resource("b").into_entity(Utc::now())).await.unwrap().entity;
        let edge = link(&cx, &mut tx, Edge::new(a.uuid, b.uuid, "feeds").with_dependence(Dependence::Forward))
            .await
            .unwrap();

        let b2 = versioning::set(&cx, &mut tx, &b, b.successor(PropertyMap::new())).await.unwrap().new.unwrap();
        let a2 = versioning::set(&cx, &mut tx, &a, a.successor(PropertyMap::new())).await.unwrap().new.unwrap();

        let current = of_entity(&db, &tx, a2.uuid).await.unwrap();
        assert_eq!(current, vec![Edge { start: a2.uuid, end: b2.uuid, ..edge.clone() }]);
        // The first version keeps its edge to b as history, plus the copy made
        // when b was replaced.
        assert_eq!(of_entity(&db, &tx, a.uuid).await.unwrap().len(), 2);

        unlink(&cx, &mut tx, edge.uuid).await.unwrap();
        assert!(of_entity(&db, &tx, a2.uuid).await.unwrap().is_empty());
        assert!(of_entity(&db, &tx, a.uuid).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_edges_to_closed_versions_stay_behind() {
        let db = MemoryBackend::new();
        let cx = Context { backend: &db, hooks: &[], record_provenance: false };
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let a = versioning::add(&cx, &mut tx, NewEntity::resource("a").into_entity(Utc::now())).await.unwrap().entity;
        let b = versioning::add(&cx, &mut tx, NewEntity::resource("b").into_entity(Utc::now())).await.unwrap().entity;
        versioning::retire(&cx, &mut tx, &b).await.unwrap();
        link(&cx, &mut tx, Edge::new(a.uuid, b.uuid, "cites")).await.unwrap();

        let a2 = versioning::set(&cx, &mut tx, &a, a.successor(PropertyMap::new())).await.unwrap().new.unwrap();
        assert!(of_entity(&db, &tx, a2.uuid).await.unwrap().is_empty());
    }
}
