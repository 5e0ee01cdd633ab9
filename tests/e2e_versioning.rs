//! End-to-end tests for the version lifecycle.
//!
//! Each test drives `VersionGraph` against `MemoryBackend`: add, replace,
//! retire, and the lookups that read the result back.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use provenance_graph::model::edge::types;
use provenance_graph::propagation::ChangeLog;
use provenance_graph::{
    EntityKind, Error, NewEntity, PropertyMap, ProvEvent, Value, VersionGraph,
};

fn attrs(pairs: &[(&str, i64)]) -> PropertyMap {
    pairs.iter().map(|(k, v)| (k.to_string(), Value::from(*v))).collect()
}

// ============================================================================
// 1. Add, conflict, replace
// ============================================================================

#[tokio::test]
async fn test_component_lifecycle_in_resource_scope() {
    let log = Arc::new(ChangeLog::new());
    let graph = VersionGraph::open_memory().await.unwrap().with_hook(log.clone());

    let r1 = graph.create_entity(NewEntity::resource("R1")).await.unwrap().entity;
    let c1 = graph
        .create_entity(NewEntity::component("R1", "comp-a").with_attribute("rows", 10))
        .await
        .unwrap()
        .entity;
    assert_eq!(c1.version, 1);
    assert!(c1.is_valid());

    // Second add of the same scope id conflicts.
    let err = graph
        .create_entity(NewEntity::component("R1", "comp-a"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Conflict { kind: EntityKind::Component, ref scope, ref id } if scope == "R1" && id == "comp-a"
    ));

    let t = graph.replace_entity(&c1, attrs(&[("rows", 12)])).await.unwrap();
    let c2 = t.new.clone().unwrap();
    assert_eq!(c2.id, "comp-a");
    assert_eq!(c2.version, 2);
    assert!(c2.is_valid());
    assert!(!t.old.is_valid());
    assert_eq!(t.old.validity.until.map(|u| u >= c1.validity.since), Some(true));

    // The owning resource hears about the change over its manages edge.
    assert_eq!(t.notified.len(), 1);
    let change = &t.notified[0];
    assert_eq!(change.edge.edge_type, types::MANAGES);
    assert_eq!(change.dependent, r1.uuid);
    assert_eq!(change.new.as_ref().map(|e| e.uuid), Some(c2.uuid));
    assert_eq!(log.len(), 1);

    let current = graph
        .get_by_scope_id(EntityKind::Component, "comp-a", Some("R1"))
        .await
        .unwrap();
    assert_eq!(current, c2);
}

#[tokio::test]
async fn test_same_id_in_different_scopes_is_allowed() {
    let graph = VersionGraph::open_memory().await.unwrap();
    graph.create_entity(NewEntity::resource("R1")).await.unwrap();
    graph.create_entity(NewEntity::resource("R2")).await.unwrap();

    graph.create_entity(NewEntity::component("R1", "comp-a")).await.unwrap();
    graph.create_entity(NewEntity::component("R2", "comp-a")).await.unwrap();

    // Resource and component namespaces are separate too.
    graph.create_entity(NewEntity::resource("comp-a")).await.unwrap();
}

#[tokio::test]
async fn test_separators_in_ids_do_not_merge_scopes() {
    let graph = VersionGraph::open_memory().await.unwrap();
    graph.create_entity(NewEntity::resource("a/b")).await.unwrap();
    graph.create_entity(NewEntity::resource("a")).await.unwrap();

    graph.create_entity(NewEntity::component("a/b", "c")).await.unwrap();
    graph.create_entity(NewEntity::component("a", "b/c")).await.unwrap();
    graph.create_entity(NewEntity::component("a", "1:b/c")).await.unwrap();

    let nested = graph
        .get_by_scope_id(EntityKind::Component, "b/c", Some("a"))
        .await
        .unwrap();
    assert_eq!(nested.resource.as_deref(), Some("a"));

    // Still one valid version per lineage.
    let err = graph.create_entity(NewEntity::component("a", "b/c")).await.unwrap_err();
    assert!(matches!(err, Error::Conflict { .. }));
}

#[tokio::test]
async fn test_component_requires_live_resource() {
    let graph = VersionGraph::open_memory().await.unwrap();
    let err = graph
        .create_entity(NewEntity::component("nowhere", "comp-a"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

// ============================================================================
// 2. Version chains
// ============================================================================

#[tokio::test]
async fn test_history_forms_a_contiguous_chain() {
    let graph = VersionGraph::open_memory().await.unwrap();
    graph.create_entity(NewEntity::resource("R1")).await.unwrap();
    let mut current = graph
        .create_entity(NewEntity::component("R1", "comp-a"))
        .await
        .unwrap()
        .entity;
    for rows in 1..=4 {
        current = graph
            .replace_entity(&current, attrs(&[("rows", rows)]))
            .await
            .unwrap()
            .new
            .unwrap();
    }

    let history = graph
        .history(EntityKind::Component, "comp-a", Some("R1"))
        .await
        .unwrap();
    let versions: Vec<u64> = history.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![1, 2, 3, 4, 5]);
    assert_eq!(history.iter().filter(|e| e.is_valid()).count(), 1);
    assert!(history.last().unwrap().is_valid());

    for pair in history.windows(2) {
        let (older, newer) = (&pair[0], &pair[1]);
        assert_eq!(older.validity.until, Some(newer.validity.since));
        assert_eq!(older.id, newer.id);
        assert_eq!(older.version + 1, newer.version);
    }
}

#[tokio::test]
async fn test_replacing_a_stale_version_fails() {
    let graph = VersionGraph::open_memory().await.unwrap();
    let r1 = graph.create_entity(NewEntity::resource("R1")).await.unwrap().entity;
    graph.replace_entity(&r1, PropertyMap::new()).await.unwrap();

    let err = graph.replace_entity(&r1, PropertyMap::new()).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let history = graph.history(EntityKind::Resource, "R1", None).await.unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn test_retire_then_recreate_continues_numbering() {
    let graph = VersionGraph::open_memory().await.unwrap();
    let r = graph.create_entity(NewEntity::resource("R1")).await.unwrap().entity;

    let t = graph.retire_entity(&r).await.unwrap();
    assert!(t.new.is_none());
    assert!(matches!(
        graph.get_by_scope_id(EntityKind::Resource, "R1", None).await,
        Err(Error::NotFound(_))
    ));

    let again = graph.create_entity(NewEntity::resource("R1")).await.unwrap().entity;
    assert_eq!(again.version, 2);
}

#[tokio::test]
async fn test_scope_argument_must_match_kind() {
    let graph = VersionGraph::open_memory().await.unwrap();
    graph.create_entity(NewEntity::resource("R1")).await.unwrap();

    assert!(matches!(
        graph.get_by_scope_id(EntityKind::Component, "comp-a", None).await,
        Err(Error::InvalidEntity(_))
    ));
    assert!(matches!(
        graph.get_by_scope_id(EntityKind::Resource, "R1", Some("R1")).await,
        Err(Error::InvalidEntity(_))
    ));
}

// ============================================================================
// 3. Relationship entities
// ============================================================================

#[tokio::test]
async fn test_relationship_endpoints_follow_current_versions() {
    let graph = VersionGraph::open_memory().await.unwrap();
    graph.create_entity(NewEntity::resource("R1")).await.unwrap();
    let a1 = graph.create_entity(NewEntity::component("R1", "a")).await.unwrap().entity;
    let b = graph.create_entity(NewEntity::component("R1", "b")).await.unwrap().entity;
    let a2 = graph.replace_entity(&a1, PropertyMap::new()).await.unwrap().new.unwrap();

    // Built against the stale uuid, stored against the current one.
    let rel = graph
        .create_entity(NewEntity::relationship("R1", "a-b", a1.uuid, b.uuid))
        .await
        .unwrap()
        .entity;
    match rel.variant {
        provenance_graph::Variant::Relationship { start, end } => {
            assert_eq!(start, a2.uuid);
            assert_eq!(end, b.uuid);
        }
        other => panic!("unexpected variant {other:?}"),
    }

    let edges = graph.edges(rel.uuid).await.unwrap();
    let mut structural: Vec<&str> = edges.iter().map(|e| e.edge_type.as_str()).collect();
    structural.sort();
    assert_eq!(structural, vec![types::END, types::INCLUDES, types::MANAGES, types::START]);
}

#[tokio::test]
async fn test_relationship_endpoints_must_be_components() {
    let graph = VersionGraph::open_memory().await.unwrap();
    let r = graph.create_entity(NewEntity::resource("R1")).await.unwrap().entity;
    let a = graph.create_entity(NewEntity::component("R1", "a")).await.unwrap().entity;

    let err = graph
        .create_entity(NewEntity::relationship("R1", "bad", a.uuid, r.uuid))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidEntity(_)));
}

// ============================================================================
// 4. Provenance
// ============================================================================

#[tokio::test]
async fn test_provenance_trail_of_a_revision() {
    let graph = VersionGraph::open_memory().await.unwrap();
    let r1 = graph.create_entity(NewEntity::resource("R1")).await.unwrap().entity;
    let t = graph.replace_entity(&r1, PropertyMap::new()).await.unwrap();
    let r2 = t.new.unwrap();

    let old: Vec<ProvEvent> = graph.provenance(r1.uuid).await.unwrap().iter().map(|p| p.event).collect();
    assert_eq!(old, vec![ProvEvent::Created, ProvEvent::Invalidated]);

    let new = graph.provenance(r2.uuid).await.unwrap();
    let events: Vec<ProvEvent> = new.iter().map(|p| p.event).collect();
    assert_eq!(events, vec![ProvEvent::Created, ProvEvent::Revised]);
    assert_eq!(new[1].previous, Some(r1.uuid));

    // All records of one replace share its transaction.
    assert!(t.provenance.iter().all(|p| p.tx == t.provenance[0].tx));
}
