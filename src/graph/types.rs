use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;

pub type NodeId = String;
pub type EdgeId = String;
pub type PropertyMap = IndexMap<String, serde_json::Value>;

/// Canonical string encoding of a property value for embedding in an
/// index key (`index:<property>:<value_repr>:<nodeId>`). JSON encoding
/// is used so the same value always maps to the same key regardless of
/// which code path wrote it.
pub fn value_repr(value: &serde_json::Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// A node in the property graph: a properties map plus its adjacency lists.
///
/// The graph layer treats `properties` as opaque JSON — node "type" is
/// just a conventional property key (`"type"`), not a Rust-level
/// discriminant. The identity layer is the one that knows `type` means
/// `USER`/`IP`/`FINGERPRINT`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub properties: PropertyMap,
    pub in_edges: Vec<EdgeId>,
    pub out_edges: Vec<EdgeId>,
}

impl Node {
    pub fn property(&self, key: &str) -> Option<&serde_json::Value> {
        self.properties.get(key)
    }

    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.property(key).and_then(|v| v.as_str())
    }
}

/// A typed directed edge between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    pub edge_type: String,
    pub from_node_id: NodeId,
    pub to_node_id: NodeId,
    pub properties: PropertyMap,
}

impl Edge {
    pub fn count(&self) -> u64 {
        self.properties
            .get("count")
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
    }

    pub fn last_seen(&self) -> Option<&str> {
        self.properties.get("lastSeen").and_then(|v| v.as_str())
    }

    pub fn first_seen(&self) -> Option<&str> {
        self.properties.get("firstSeen").and_then(|v| v.as_str())
    }
}

/// Direction of traversal relative to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    Both,
}

/// Selector passed to [`crate::graph::GraphStore::query`].
#[derive(Debug, Clone, Default)]
pub struct QuerySpec {
    pub node_type: Option<String>,
    pub property: Option<String>,
    pub value: Option<serde_json::Value>,
    pub limit: usize,
    pub cursor: Option<crate::store::Cursor>,
}

impl QuerySpec {
    pub fn by_type(node_type: impl Into<String>, limit: usize) -> Self {
        Self {
            node_type: Some(node_type.into()),
            limit,
            ..Default::default()
        }
    }

    pub fn by_property(
        property: impl Into<String>,
        value: serde_json::Value,
        limit: usize,
    ) -> Self {
        Self {
            property: Some(property.into()),
            value: Some(value),
            limit,
            ..Default::default()
        }
    }
}

/// One page of [`crate::graph::GraphStore::query`] results.
#[derive(Debug, Clone)]
pub struct QueryPage {
    pub items: Vec<Node>,
    pub cursor: Option<crate::store::Cursor>,
    pub has_more: bool,
}

/// Options for [`crate::graph::GraphStore::traverse`].
#[derive(Debug, Clone)]
pub struct TraverseOptions {
    pub max_depth: usize,
    pub direction: Direction,
    pub edge_type: Option<String>,
}

impl Default for TraverseOptions {
    fn default() -> Self {
        Self {
            max_depth: 3,
            direction: Direction::Out,
            edge_type: None,
        }
    }
}

/// Failures from the graph layer.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("(de)serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("endpoint missing for edge: {0}")]
    EndpointMissing(NodeId),
}
