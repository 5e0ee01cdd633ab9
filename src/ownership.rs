//! Entity-to-resource association.
//!
//! Every component and relationship version is bound to the resource version
//! that was current when it was added, by two edges:
//!
//! - `manages` (bidirected, inverse): carries cascade semantics. Being
//!   bidirected it is read both ways: a new version of the managed entity is
//!   announced to the resource, and a resource transition reaches every
//!   valid member.
//! - `includes` (bidirected, none): membership only. Survives for listing
//!   even where no cascade is wanted.
//!
//! Owner resolution always walks the `manages` edge instead of trusting the
//! stored `prov:resource` scope, then follows the resource lineage to its
//! valid version.

use std::collections::HashSet;

use tracing::debug;
use uuid::Uuid;

use crate::edges;
use crate::model::edge::types;
use crate::model::{Dependence, Direction, Edge, EdgeDirection, Entity, EntityKind, NodeId};
use crate::storage::StorageBackend;
use crate::versioning;
use crate::{Error, Result};

/// Create the `manages` and `includes` edges from `owner` to `member`.
pub async fn attach<B: StorageBackend>(
    backend: &B,
    tx: &mut B::Tx,
    owner: (NodeId, &Entity),
    member: (NodeId, &Entity),
) -> Result<()> {
    let (owner_node, owner) = owner;
    let (member_node, member) = member;

    let manages = Edge::new(owner.uuid, member.uuid, types::MANAGES)
        .with_direction(EdgeDirection::Bidirected)
        .with_dependence(Dependence::Inverse);
    let includes = Edge::new(owner.uuid, member.uuid, types::INCLUDES)
        .with_direction(EdgeDirection::Bidirected)
        .with_dependence(Dependence::None);

    edges::create_between(backend, tx, owner_node, member_node, &manages).await?;
    edges::create_between(backend, tx, owner_node, member_node, &includes).await?;
    debug!(owner = %owner.uuid, member = %member.uuid, "ownership attached");
    Ok(())
}

/// The valid resource version managing entity `uuid`.
///
/// `uuid` itself may be an invalid version, and the resource version at the
/// other end of its `manages` edge may have been superseded since; both are
/// tolerated. Fails with `NotFound` if no `manages` edge reaches the entity
/// or the resource lineage has been retired.
pub async fn resource<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    uuid: Uuid,
) -> Result<Entity> {
    let (node, entity) = versioning::locate(backend, tx, uuid).await?;
    let manages = backend
        .get_relationships(tx, node, Direction::Incoming, Some(types::MANAGES))
        .await?;
    let rel = manages.first().ok_or_else(|| {
        Error::NotFound(format!("no resource manages {} ({uuid})", entity.lineage()))
    })?;

    let owner_node = backend
        .get_node(tx, rel.src)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Node {}", rel.src)))?;
    let owner = Entity::from_node(&owner_node)?;
    if owner.is_valid() {
        return Ok(owner);
    }

    let lineage = owner.lineage();
    versioning::current(backend, tx, &lineage)
        .await?
        .map(|(_, e)| e)
        .ok_or_else(|| Error::NotFound(format!("{lineage} has no valid version")))
}

/// Components and relationships included by any version of `resource`'s
/// lineage, sorted by kind, id and version.
///
/// Without `include_history` only valid versions are returned.
pub async fn members<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    resource: &Entity,
    include_history: bool,
) -> Result<Vec<Entity>> {
    if resource.kind() != EntityKind::Resource {
        return Err(Error::InvalidEntity(format!("{} is not a resource", resource.lineage())));
    }

    let mut seen = HashSet::new();
    let mut found = Vec::new();
    for (node, _) in versioning::versions(backend, tx, &resource.lineage()).await? {
        let includes = backend
            .get_relationships(tx, node, Direction::Outgoing, Some(types::INCLUDES))
            .await?;
        for rel in includes {
            let Some(member_node) = backend.get_node(tx, rel.dst).await? else { continue };
            let member = Entity::from_node(&member_node)?;
            if (include_history || member.is_valid()) && seen.insert(member.uuid) {
                found.push(member);
            }
        }
    }

    found.sort_by(|a, b| {
        (a.kind().as_str(), &a.id, a.version).cmp(&(b.kind().as_str(), &b.id, b.version))
    });
    Ok(found)
}
