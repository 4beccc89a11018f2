use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;
use crate::store::InMemoryKvStore;

fn props(pairs: &[(&str, serde_json::Value)]) -> PropertyMap {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn graph() -> GraphStore<InMemoryKvStore> {
    GraphStore::new(Arc::new(InMemoryKvStore::new()))
}

#[tokio::test]
async fn create_edge_updates_adjacency() {
    let g = graph();
    let a = g.create_node(props(&[("type", json!("USER"))])).await.unwrap();
    let b = g.create_node(props(&[("type", json!("IP"))])).await.unwrap();

    let edge = g
        .create_edge(&a.id, &b.id, "USES_IP", props(&[("count", json!(1))]))
        .await
        .unwrap();

    let a_after = g.get_node(&a.id).await.unwrap().unwrap();
    let b_after = g.get_node(&b.id).await.unwrap().unwrap();
    assert_eq!(a_after.out_edges, vec![edge.id.clone()]);
    assert_eq!(b_after.in_edges, vec![edge.id.clone()]);
}

#[tokio::test]
async fn create_edge_fails_on_missing_endpoint() {
    let g = graph();
    let a = g.create_node(props(&[("type", json!("USER"))])).await.unwrap();
    let err = g
        .create_edge(&a.id, "does-not-exist", "USES_IP", PropertyMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::EndpointMissing(_)));
}

#[tokio::test]
async fn update_node_moves_index_entries() {
    let g = graph();
    let node = g
        .create_node(props(&[("type", json!("USER")), ("userId", json!("u1"))]))
        .await
        .unwrap();

    let page = g.query(QuerySpec::by_type("USER", 10)).await.unwrap();
    assert_eq!(page.items.len(), 1);

    g.update_node(&node.id, props(&[("type", json!("IP"))]))
        .await
        .unwrap();

    let as_user = g.query(QuerySpec::by_type("USER", 10)).await.unwrap();
    assert!(as_user.items.is_empty());
    let as_ip = g.query(QuerySpec::by_type("IP", 10)).await.unwrap();
    assert_eq!(as_ip.items.len(), 1);
    assert_eq!(as_ip.items[0].id, node.id);
}

#[tokio::test]
async fn delete_node_cascades_to_incident_edges() {
    let g = graph();
    let a = g.create_node(props(&[("type", json!("USER"))])).await.unwrap();
    let b = g.create_node(props(&[("type", json!("IP"))])).await.unwrap();
    let edge = g
        .create_edge(&a.id, &b.id, "USES_IP", PropertyMap::new())
        .await
        .unwrap();

    assert!(g.delete_node(&a.id).await.unwrap());

    assert!(g.get_node(&a.id).await.unwrap().is_none());
    assert!(g.get_edge(&edge.id).await.unwrap().is_none());
    let b_after = g.get_node(&b.id).await.unwrap().unwrap();
    assert!(b_after.in_edges.is_empty());
}

#[tokio::test]
async fn delete_edge_clears_both_adjacency_sides_of_a_self_loop() {
    let g = graph();
    let a = g.create_node(props(&[("type", json!("USER"))])).await.unwrap();
    let edge = g
        .create_edge(&a.id, &a.id, "USES_IP", PropertyMap::new())
        .await
        .unwrap();

    assert!(g.delete_edge(&edge.id).await.unwrap());

    let a_after = g.get_node(&a.id).await.unwrap().unwrap();
    assert!(a_after.out_edges.is_empty());
    assert!(a_after.in_edges.is_empty());
}

#[tokio::test]
async fn query_paginates_across_many_nodes_of_one_type() {
    let g = graph();
    for _ in 0..5 {
        g.create_node(props(&[("type", json!("USER"))])).await.unwrap();
    }

    let mut seen = std::collections::HashSet::new();
    let mut cursor = None;
    loop {
        let spec = QuerySpec {
            node_type: Some("USER".to_string()),
            limit: 2,
            cursor: cursor.take(),
            ..Default::default()
        };
        let page = g.query(spec).await.unwrap();
        for n in &page.items {
            seen.insert(n.id.clone());
        }
        if !page.has_more {
            break;
        }
        cursor = page.cursor;
    }
    assert_eq!(seen.len(), 5);
}

#[tokio::test]
async fn traverse_respects_max_depth_and_visits_once() {
    let g = graph();
    let a = g.create_node(props(&[("type", json!("USER"))])).await.unwrap();
    let b = g.create_node(props(&[("type", json!("IP"))])).await.unwrap();
    let c = g.create_node(props(&[("type", json!("FINGERPRINT"))])).await.unwrap();
    g.create_edge(&a.id, &b.id, "USES_IP", PropertyMap::new()).await.unwrap();
    g.create_edge(&b.id, &c.id, "USES_IP", PropertyMap::new()).await.unwrap();
    // cycle back to a, should not cause infinite traversal or duplicates
    g.create_edge(&c.id, &a.id, "USES_IP", PropertyMap::new()).await.unwrap();

    let reached = g
        .traverse(
            &a.id,
            TraverseOptions {
                max_depth: 1,
                direction: Direction::Out,
                edge_type: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(reached.len(), 1);
    assert_eq!(reached[0].id, b.id);

    let deep = g
        .traverse(
            &a.id,
            TraverseOptions {
                max_depth: 5,
                direction: Direction::Out,
                edge_type: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(deep.len(), 2);
    let ids: std::collections::HashSet<_> = deep.iter().map(|n| n.id.clone()).collect();
    assert!(ids.contains(&b.id));
    assert!(ids.contains(&c.id));
}

proptest::proptest! {
    /// Invariant 1 (spec.md §8): after `create_node(p)`, every property
    /// in `p` is findable via `query({property, value})`. Runs over
    /// arbitrary small string property maps rather than a single fixed
    /// case.
    #[test]
    fn create_node_is_always_findable_by_every_property(
        values in proptest::collection::vec("[a-z]{1,8}", 1..5),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let g = graph();
            let properties: PropertyMap = values
                .iter()
                .enumerate()
                .map(|(i, v)| (format!("prop{i}"), json!(v)))
                .collect();
            let node = g.create_node(properties.clone()).await.unwrap();

            for (key, value) in &properties {
                let page = g
                    .query(QuerySpec::by_property(key.clone(), value.clone(), 10))
                    .await
                    .unwrap();
                assert!(page.items.iter().any(|n| n.id == node.id));
            }
        });
    }
}

#[tokio::test]
async fn get_connected_nodes_filters_by_edge_type() {
    let g = graph();
    let a = g.create_node(props(&[("type", json!("USER"))])).await.unwrap();
    let b = g.create_node(props(&[("type", json!("IP"))])).await.unwrap();
    let c = g.create_node(props(&[("type", json!("FINGERPRINT"))])).await.unwrap();
    g.create_edge(&a.id, &b.id, "USES_IP", PropertyMap::new()).await.unwrap();
    g.create_edge(&a.id, &c.id, "USES_FINGERPRINT", PropertyMap::new())
        .await
        .unwrap();

    let ips = g
        .get_connected_nodes(&a.id, Direction::Out, Some("USES_IP"))
        .await
        .unwrap();
    assert_eq!(ips.len(), 1);
    assert_eq!(ips[0].id, b.id);
}
