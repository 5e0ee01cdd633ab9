//! Multi-hop cascades composed from single-hop propagation.
//!
//! `replace_cascading` re-versions the root entity, then re-versions every
//! notified dependent (attributes unchanged), then their dependents, and so
//! on. Each step is an ordinary `versioning::set` in the same transaction.
//!
//! Lineages are tracked two ways:
//! - a visited set, so a dependent reached along two paths is re-versioned once;
//! - the active path, so a dependent that leads back to one of its own
//!   ancestors is reported as [`Error::CyclicDependency`].
//!
//! A symmetric edge (bidirected, or `mutual`) hands every change straight
//! back to the entity it came from. That echo to the immediate cause is
//! dropped rather than reported as a cycle; this is what lets a member's
//! change re-version its resource without looping over `manages`.

use std::collections::HashSet;

use tracing::{debug, info};
use uuid::Uuid;

use crate::model::{Entity, Lineage, PropertyMap};
use crate::storage::StorageBackend;
use crate::versioning::{self, Context, Transition};
use crate::{Error, Result};

/// Replace `root` with `attributes` and re-version everything that
/// transitively depends on it. Transitions are returned in the order they
/// were applied, root first.
pub async fn replace_cascading<B: StorageBackend>(
    cx: &Context<'_, B>,
    tx: &mut B::Tx,
    root: &Entity,
    attributes: PropertyMap,
) -> Result<Vec<Transition>> {
    let first = versioning::set(cx, tx, root, root.successor(attributes)).await?;

    let root_path = vec![root.lineage()];
    let mut visited: HashSet<Lineage> = HashSet::from([root.lineage()]);
    let mut pending: Vec<(Vec<Lineage>, Uuid, bool)> = first
        .notified
        .iter()
        .rev()
        .map(|c| (root_path.clone(), c.dependent, c.edge.is_symmetric()))
        .collect();
    let mut transitions = vec![first];

    while let Some((path, dependent, symmetric)) = pending.pop() {
        let current = match versioning::resolve_current(cx.backend, tx, dependent).await {
            Ok((_, entity)) => entity,
            // Retired dependents have nothing left to re-version.
            Err(Error::NotFound(_)) => continue,
            Err(e) => return Err(e),
        };

        let lineage = current.lineage();
        // The notifier is last on the path; the lineage before it caused its change.
        let cause = path.len().checked_sub(2).map(|i| &path[i]);
        if symmetric && cause == Some(&lineage) {
            debug!(%lineage, "echo to cause dropped");
            continue;
        }
        if path.contains(&lineage) {
            let chain: Vec<String> = path.iter().map(ToString::to_string).collect();
            return Err(Error::CyclicDependency(format!(
                "{} -> {lineage}",
                chain.join(" -> ")
            )));
        }
        if !visited.insert(lineage.clone()) {
            debug!(%lineage, "already re-versioned");
            continue;
        }

        let t = versioning::set(cx, tx, &current, current.successor(current.attributes.clone())).await?;
        let mut next = path;
        next.push(lineage);
        pending.extend(
            t.notified
                .iter()
                .rev()
                .map(|c| (next.clone(), c.dependent, c.edge.is_symmetric())),
        );
        transitions.push(t);
    }

    info!(root = %root.lineage(), transitions = transitions.len(), "cascade applied");
    Ok(transitions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::edges;
    use crate::model::{Dependence, Edge, NewEntity};
    use crate::storage::MemoryBackend;
    use crate::tx::TxMode;

    #[tokio::test]
    async fn test_diamond_reversions_each_dependent_once() {
        let db = MemoryBackend::new();
        let cx = Context { backend: &db, hooks: &[], record_provenance: false };
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let mut ids = Vec::new();
        for id in ["a", "b", "c", "d"] {
            ids.push(versioning::add(&cx, &mut tx, NewEntity::resource(id).into_entity(Utc::now())).await.unwrap().entity);
        }
        let (a, b, c, d) = (&ids[0], &ids[1], &ids[2], &ids[3]);
        for (from, to) in [(a, b), (a, c), (b, d), (c, d)] {
            edges::link(&cx, &mut tx, Edge::new(from.uuid, to.uuid, "feeds").with_dependence(Dependence::Forward))
                .await
                .unwrap();
        }

        let transitions = replace_cascading(&cx, &mut tx, a, PropertyMap::new()).await.unwrap();
        let touched: Vec<&str> = transitions.iter().map(|t| t.old.id.as_str()).collect();
        assert_eq!(touched.len(), 4);
        assert_eq!(touched[0], "a");
        assert_eq!(touched.iter().filter(|id| **id == "d").count(), 1);

        let d_now = versioning::get_by_scope_id(&db, &tx, d.kind(), "d", None).await.unwrap();
        assert_eq!(d_now.version, 2);
    }

    #[tokio::test]
    async fn test_cycle_is_rejected() {
        let db = MemoryBackend::new();
        let cx = Context { backend: &db, hooks: &[], record_provenance: false };
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let a = versioning::add(&cx, &mut tx, NewEntity::resource("a").into_entity(Utc::now())).await.unwrap().entity;
        let b = versioning::add(&cx, &mut tx, NewEntity::resource("b").into_entity(Utc::now())).await.unwrap().entity;
        edges::link(&cx, &mut tx, Edge::new(a.uuid, b.uuid, "feeds").with_dependence(Dependence::Forward)).await.unwrap();
        edges::link(&cx, &mut tx, Edge::new(b.uuid, a.uuid, "feeds").with_dependence(Dependence::Forward)).await.unwrap();

        let err = replace_cascading(&cx, &mut tx, &a, PropertyMap::new()).await.unwrap_err();
        assert!(matches!(err, Error::CyclicDependency(_)));
    }

    #[tokio::test]
    async fn test_mutual_pair_reversions_both_once() {
        let db = MemoryBackend::new();
        let cx = Context { backend: &db, hooks: &[], record_provenance: false };
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let a = versioning::add(&cx, &mut tx, NewEntity::resource("a").into_entity(Utc::now())).await.unwrap().entity;
        let b = versioning::add(&cx, &mut tx, NewEntity::resource("b").into_entity(Utc::now())).await.unwrap().entity;
        let c = versioning::add(&cx, &mut tx, NewEntity::resource("c").into_entity(Utc::now())).await.unwrap().entity;
        edges::link(&cx, &mut tx, Edge::new(a.uuid, b.uuid, "peer").with_dependence(Dependence::Mutual)).await.unwrap();
        edges::link(&cx, &mut tx, Edge::new(b.uuid, c.uuid, "feeds").with_dependence(Dependence::Forward)).await.unwrap();

        let transitions = replace_cascading(&cx, &mut tx, &a, PropertyMap::new()).await.unwrap();
        let touched: Vec<&str> = transitions.iter().map(|t| t.old.id.as_str()).collect();
        assert_eq!(touched, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_member_change_reversions_resource_and_siblings() {
        let db = MemoryBackend::new();
        let cx = Context { backend: &db, hooks: &[], record_provenance: false };
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        versioning::add(&cx, &mut tx, NewEntity::resource("r").into_entity(Utc::now())).await.unwrap();
        let x = versioning::add(&cx, &mut tx, NewEntity::component("r", "x").into_entity(Utc::now())).await.unwrap().entity;
        versioning::add(&cx, &mut tx, NewEntity::component("r", "y").into_entity(Utc::now())).await.unwrap();

        // x -> r over manages, then r -> y; the echo from r back to x is dropped.
        let transitions = replace_cascading(&cx, &mut tx, &x, PropertyMap::new()).await.unwrap();
        let touched: Vec<&str> = transitions.iter().map(|t| t.old.id.as_str()).collect();
        assert_eq!(touched, vec!["x", "r", "y"]);
    }
}
