//! Versioning engine: add, invalidate, set and retire entity versions.
//!
//! Entity state is never updated in place. A change is an invalidation of
//! the current version followed by the insertion of its successor, both
//! inside the caller's transaction. The only in-place writes are closing
//! `prov:valid_until` and clearing `prov:active_key`.
//!
//! Uniqueness of (kind, scope, id) among valid versions is checked by a read
//! in the same transaction as the insert. The backend's isolation makes the
//! pair atomic; the `prov:active_key` unique constraint is the backstop.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::edges;
use crate::model::edge::types;
use crate::model::keys;
use crate::model::{Dependence, Edge, Entity, EntityKind, Lineage, NodeId, Value, Variant};
use crate::ownership;
use crate::propagation::{self, ChangeHook, DependencyChange};
use crate::provenance::{self, ProvEvent, Provenance};
use crate::storage::StorageBackend;
use crate::{Error, Result};

// ============================================================================
// Context
// ============================================================================

/// What every engine function needs besides the transaction.
pub struct Context<'a, B: StorageBackend> {
    pub backend: &'a B,
    /// Called, in order, for every dependency change.
    pub hooks: &'a [Arc<dyn ChangeHook<B>>],
    pub record_provenance: bool,
}

impl<B: StorageBackend> Clone for Context<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: StorageBackend> Copy for Context<'_, B> {}

// ============================================================================
// Results
// ============================================================================

/// A stored first version (or successor) and its creation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Created {
    pub entity: Entity,
    pub provenance: Provenance,
}

/// Outcome of `set` or `retire`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// The previous version, with its validity window closed.
    pub old: Entity,
    /// The successor; `None` when the entity was retired.
    pub new: Option<Entity>,
    pub provenance: Vec<Provenance>,
    /// Dependents notified by the single-hop propagation.
    pub notified: Vec<DependencyChange>,
}

// ============================================================================
// Lookups
// ============================================================================

/// Find a version by uuid.
pub async fn locate<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    uuid: Uuid,
) -> Result<(NodeId, Entity)> {
    let nodes = backend
        .nodes_by_property(tx, keys::ENTITY_LABEL, keys::UUID, &Value::from(uuid))
        .await?;
    let node = nodes
        .first()
        .ok_or_else(|| Error::NotFound(format!("entity {uuid}")))?;
    Ok((node.id, Entity::from_node(node)?))
}

/// Every stored version of a lineage, oldest first.
pub async fn versions<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    lineage: &Lineage,
) -> Result<Vec<(NodeId, Entity)>> {
    let nodes = backend
        .nodes_by_property(tx, lineage.kind.label(), keys::ID, &Value::from(lineage.id.as_str()))
        .await?;
    let mut found = Vec::with_capacity(nodes.len());
    for node in &nodes {
        let entity = Entity::from_node(node)?;
        if entity.resource == lineage.resource {
            found.push((node.id, entity));
        }
    }
    found.sort_by_key(|(_, e)| e.version);
    Ok(found)
}

/// The valid version of a lineage, if any.
pub async fn current<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    lineage: &Lineage,
) -> Result<Option<(NodeId, Entity)>> {
    Ok(versions(backend, tx, lineage)
        .await?
        .into_iter()
        .find(|(_, e)| e.is_valid()))
}

/// The version `uuid` if it is valid, otherwise the valid version of its lineage.
pub async fn resolve_current<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    uuid: Uuid,
) -> Result<(NodeId, Entity)> {
    let (node, entity) = locate(backend, tx, uuid).await?;
    if entity.is_valid() {
        return Ok((node, entity));
    }
    let lineage = entity.lineage();
    current(backend, tx, &lineage)
        .await?
        .ok_or_else(|| Error::NotFound(format!("{lineage} has no valid version")))
}

/// The valid version of (kind, id) in `resource`'s scope.
pub async fn get_by_scope_id<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    kind: EntityKind,
    id: &str,
    resource: Option<&str>,
) -> Result<Entity> {
    if kind.is_scoped() != resource.is_some() {
        return Err(Error::InvalidEntity(format!(
            "{kind} lookups {} a resource scope",
            if kind.is_scoped() { "require" } else { "do not take" }
        )));
    }
    let lineage = Lineage::new(kind, id, resource);
    current(backend, tx, &lineage)
        .await?
        .map(|(_, e)| e)
        .ok_or_else(|| Error::NotFound(format!("{lineage}")))
}

/// Every version of (kind, id) in `resource`'s scope, oldest first.
pub async fn history<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    kind: EntityKind,
    id: &str,
    resource: Option<&str>,
) -> Result<Vec<Entity>> {
    let lineage = Lineage::new(kind, id, resource);
    let found: Vec<Entity> = versions(backend, tx, &lineage)
        .await?
        .into_iter()
        .map(|(_, e)| e)
        .collect();
    if found.is_empty() {
        return Err(Error::NotFound(format!("{lineage}")));
    }
    Ok(found)
}

// ============================================================================
// Mutations
// ============================================================================

fn check_shape(entity: &Entity) -> Result<()> {
    if entity.id.is_empty() {
        return Err(Error::InvalidEntity("scope-relative id must not be empty".into()));
    }
    if entity.kind().is_scoped() != entity.resource.is_some() {
        return Err(Error::InvalidEntity(format!(
            "{} {} an owning resource",
            entity.kind(),
            if entity.kind().is_scoped() { "requires" } else { "cannot have" }
        )));
    }
    if entity.version == 0 || !entity.is_valid() {
        return Err(Error::InvalidEntity(format!(
            "{} must be added as an open version >= 1",
            entity.lineage()
        )));
    }
    Ok(())
}

/// Insert a new version with an open validity window.
///
/// Fails with `Conflict` before any write if the lineage already has a valid
/// version, and with `NotFound` if the owning resource (or, for
/// relationships, an endpoint component) has no valid version. Relationship
/// endpoints are re-pointed at the current version of their lineage.
pub async fn add<B: StorageBackend>(
    cx: &Context<'_, B>,
    tx: &mut B::Tx,
    mut entity: Entity,
) -> Result<Created> {
    check_shape(&entity)?;

    let lineage = entity.lineage();
    let prior = versions(cx.backend, tx, &lineage).await?;
    if prior.iter().any(|(_, e)| e.is_valid()) {
        return Err(lineage.conflict());
    }
    // A retired lineage that is added again continues its numbering.
    let next = prior.last().map_or(1, |(_, e)| e.version + 1);
    let requested = entity.version;
    match requested {
        v if v == next => {}
        1 => entity.version = next,
        v => {
            return Err(Error::InvalidEntity(format!(
                "{lineage} continues at version {next}, got {v}"
            )))
        }
    }

    let owner = match entity.resource.as_deref() {
        Some(scope) => {
            let owner_lineage = Lineage::new(EntityKind::Resource, scope, None);
            let owner = current(cx.backend, tx, &owner_lineage)
                .await?
                .ok_or_else(|| Error::NotFound(format!("{owner_lineage}")))?;
            Some(owner)
        }
        None => None,
    };

    let endpoints = match entity.variant {
        Variant::Relationship { start, end } => {
            let (start_node, start) = resolve_current(cx.backend, tx, start).await?;
            let (end_node, end) = resolve_current(cx.backend, tx, end).await?;
            for endpoint in [&start, &end] {
                if endpoint.kind() != EntityKind::Component {
                    return Err(Error::InvalidEntity(format!(
                        "relationship endpoints must be components, got {}",
                        endpoint.lineage()
                    )));
                }
            }
            entity.variant = Variant::Relationship { start: start.uuid, end: end.uuid };
            Some(((start_node, start.uuid), (end_node, end.uuid)))
        }
        _ => None,
    };

    let node = cx
        .backend
        .create_node(tx, &entity.labels(), entity.to_properties())
        .await?;
    debug!(entity = %entity.uuid, %lineage, version = entity.version, "version inserted");

    if let Some((owner_node, owner)) = &owner {
        ownership::attach(cx.backend, tx, (*owner_node, owner), (node, &entity)).await?;
    }

    if let Some(((start_node, start), (end_node, end))) = endpoints {
        let to_start = Edge::new(entity.uuid, start, types::START).with_dependence(Dependence::Inverse);
        let to_end = Edge::new(entity.uuid, end, types::END).with_dependence(Dependence::Inverse);
        edges::create_between(cx.backend, tx, node, start_node, &to_start).await?;
        edges::create_between(cx.backend, tx, node, end_node, &to_end).await?;
    }

    let provenance = provenance::record(cx, tx, ProvEvent::Created, entity.uuid, |p| p).await?;
    Ok(Created { entity, provenance })
}

/// Close the validity window of `entity`. The record is kept.
///
/// Returns the stored version as it is after closing. `NotFound` if the
/// version does not exist or is no longer valid.
pub async fn invalidate<B: StorageBackend>(
    cx: &Context<'_, B>,
    tx: &mut B::Tx,
    entity: &Entity,
) -> Result<(Entity, Provenance)> {
    let (node, mut stored) = locate(cx.backend, tx, entity.uuid).await?;
    if !stored.is_valid() {
        return Err(Error::NotFound(format!(
            "{} version {} ({}) is not currently valid",
            stored.lineage(),
            stored.version,
            stored.uuid
        )));
    }

    let until = Utc::now();
    cx.backend
        .set_node_property(tx, node, keys::VALID_UNTIL, Value::from(until))
        .await?;
    cx.backend.remove_node_property(tx, node, keys::ACTIVE_KEY).await?;
    stored.validity.until = Some(until);
    debug!(entity = %stored.uuid, version = stored.version, "version invalidated");

    let provenance = provenance::record(cx, tx, ProvEvent::Invalidated, stored.uuid, |p| p).await?;
    Ok((stored, provenance))
}

/// Replace `old` by `new`: invalidate, add, carry `old`'s edges over to
/// `new`, then notify dependents.
///
/// `new` must belong to the same lineage as `old` and carry
/// `old.version + 1`; `Entity::successor` builds one. Any failure leaves the
/// transaction to be rolled back by its owner.
pub async fn set<B: StorageBackend>(
    cx: &Context<'_, B>,
    tx: &mut B::Tx,
    old: &Entity,
    new: Entity,
) -> Result<Transition> {
    if new.lineage() != old.lineage() {
        return Err(Error::InvalidEntity(format!(
            "successor of {} must keep its kind, scope and id",
            old.lineage()
        )));
    }
    if new.version != old.version + 1 {
        return Err(Error::InvalidEntity(format!(
            "successor of {} version {} must be version {}, got {}",
            old.lineage(),
            old.version,
            old.version + 1,
            new.version
        )));
    }

    let (closed, invalidated) = invalidate(cx, tx, old).await?;
    // The successor's window opens where the predecessor's closed.
    let mut new = new;
    if let Some(until) = closed.validity.until {
        new.validity.since = until;
    }
    let created = add(cx, tx, new).await?;
    let carried = edges::carry_forward(cx.backend, tx, &closed, &created.entity).await?;
    let revised = provenance::record(cx, tx, ProvEvent::Revised, created.entity.uuid, |p| {
        p.with_previous(closed.uuid)
    })
    .await?;

    let notified = propagation::trigger_change(cx, tx, &closed, Some(&created.entity)).await?;
    info!(
        lineage = %closed.lineage(),
        from = closed.version,
        to = created.entity.version,
        carried,
        notified = notified.len(),
        "entity revised"
    );

    Ok(Transition {
        old: closed,
        new: Some(created.entity),
        provenance: vec![invalidated, created.provenance, revised],
        notified,
    })
}

/// Invalidate `entity` without a successor and notify its dependents.
pub async fn retire<B: StorageBackend>(
    cx: &Context<'_, B>,
    tx: &mut B::Tx,
    entity: &Entity,
) -> Result<Transition> {
    let (closed, invalidated) = invalidate(cx, tx, entity).await?;
    let notified = propagation::trigger_change(cx, tx, &closed, None).await?;
    info!(lineage = %closed.lineage(), version = closed.version, notified = notified.len(), "entity retired");

    Ok(Transition {
        old: closed,
        new: None,
        provenance: vec![invalidated],
        notified,
    })
}
