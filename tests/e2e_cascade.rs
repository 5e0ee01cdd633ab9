//! End-to-end tests for multi-hop cascades.

use pretty_assertions::assert_eq;
use provenance_graph::{
    Dependence, Edge, Entity, EntityKind, Error, MemoryBackend, NewEntity, PropertyMap, Value, VersionGraph,
};

async fn chain(graph: &VersionGraph<MemoryBackend>, ids: &[&str]) -> Vec<Entity> {
    let mut entities = Vec::new();
    for id in ids {
        entities.push(graph.create_entity(NewEntity::resource(*id)).await.unwrap().entity);
    }
    for pair in entities.windows(2) {
        graph
            .link(Edge::new(pair[0].uuid, pair[1].uuid, "feeds").with_dependence(Dependence::Forward))
            .await
            .unwrap();
    }
    entities
}

#[tokio::test]
async fn test_cascade_reversions_the_whole_chain() {
    let graph = VersionGraph::open_memory().await.unwrap();
    let entities = chain(&graph, &["a", "b", "c"]).await;

    let mut attrs = PropertyMap::new();
    attrs.insert("source".into(), Value::from("v2"));
    let transitions = graph.replace_cascading(&entities[0], attrs).await.unwrap();

    let touched: Vec<(String, u64)> = transitions
        .iter()
        .filter_map(|t| t.new.as_ref())
        .map(|e| (e.id.clone(), e.version))
        .collect();
    assert_eq!(
        touched,
        vec![("a".to_string(), 2), ("b".to_string(), 2), ("c".to_string(), 2)]
    );

    // Only the root takes the new attributes.
    let a = graph.get_by_scope_id(EntityKind::Resource, "a", None).await.unwrap();
    assert_eq!(a.attributes.get("source"), Some(&Value::from("v2")));
    let c = graph.get_by_scope_id(EntityKind::Resource, "c", None).await.unwrap();
    assert!(c.attributes.is_empty());
}

#[tokio::test]
async fn test_cascade_stops_at_non_propagating_edges() {
    let graph = VersionGraph::open_memory().await.unwrap();
    let entities = chain(&graph, &["a", "b"]).await;
    let c = graph.create_entity(NewEntity::resource("c")).await.unwrap().entity;
    graph.link(Edge::new(entities[1].uuid, c.uuid, "mentions")).await.unwrap();

    let transitions = graph.replace_cascading(&entities[0], PropertyMap::new()).await.unwrap();
    assert_eq!(transitions.len(), 2);
    assert_eq!(
        graph.get_by_scope_id(EntityKind::Resource, "c", None).await.unwrap().version,
        1
    );
}

#[tokio::test]
async fn test_cycle_aborts_without_changes() {
    let graph = VersionGraph::open_memory().await.unwrap();
    let entities = chain(&graph, &["a", "b", "c"]).await;
    graph
        .link(Edge::new(entities[2].uuid, entities[0].uuid, "feeds").with_dependence(Dependence::Forward))
        .await
        .unwrap();

    let err = graph
        .replace_cascading(&entities[0], PropertyMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CyclicDependency(_)));
    assert!(err.is_client_error());

    for id in ["a", "b", "c"] {
        let history = graph.history(EntityKind::Resource, id, None).await.unwrap();
        assert_eq!(history.len(), 1, "{id} was re-versioned");
    }
}

#[tokio::test]
async fn test_cascade_through_resource_ownership() {
    let graph = VersionGraph::open_memory().await.unwrap();
    graph.create_entity(NewEntity::resource("R1")).await.unwrap();
    let c1 = graph.create_entity(NewEntity::component("R1", "comp-a")).await.unwrap().entity;

    // comp-a changing notifies R1 over manages; R1 re-versions once.
    let transitions = graph.replace_cascading(&c1, PropertyMap::new()).await.unwrap();
    assert_eq!(transitions.len(), 2);
    assert_eq!(
        graph.get_by_scope_id(EntityKind::Resource, "R1", None).await.unwrap().version,
        2
    );
}
