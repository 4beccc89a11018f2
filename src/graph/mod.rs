//! # Graph Database
//!
//! ## Purpose
//! Turns a [`KvStore`] into a schema-light property graph: typed nodes,
//! typed directed edges, secondary indexes on node properties,
//! neighborhood queries, and bounded traversal. Owns all key layout and
//! index maintenance; the store below knows nothing about nodes or edges.
//!
//! ## Mental model
//! Three key namespaces live side by side in the same flat store:
//! `node:<id>`, `edge:<id>`, `index:<property>:<value>:<nodeId>`. Nodes
//! reference edges by id in their adjacency lists and edges reference
//! nodes by id — resolution always goes back through the store, there
//! are no in-memory pointer cycles (spec.md §9).
//!
//! ## Invariants
//! - Every edge id in a node's in/out sets resolves to an existing edge
//!   whose endpoints match, as long as callers only mutate the graph
//!   through these methods.
//!   - Enforced in: [`GraphStore::create_edge`], [`GraphStore::delete_edge`].
//!   - Tested by: `graph::tests::create_edge_updates_adjacency`.
//! - An index record `index:k:v:<nodeId>` exists iff the node currently
//!   carries property `(k, v)`.
//!   - Enforced in: [`GraphStore::write_index_entries`], [`GraphStore::delete_index_entries`].
//!   - Tested by: `graph::tests::update_node_moves_index_entries`.
//! - `query` tolerates index rows whose node no longer resolves (stale
//!   rows from a crash-interrupted delete) by skipping them rather than
//!   erroring.
//!   - Enforced in: [`GraphStore::query`].
//!
//! ## Concurrency & ordering
//! No method holds a store-level lock across more than the single
//! `get`/`put`/`delete`/`list` call it issues; multi-step operations (a
//! node read followed by a rewritten adjacency list, for instance) are
//! not atomic. See spec.md §5 for what the identity layer built on top
//! assumes about this.
//!
//! ## Failure modes & recovery
//! [`GraphError::EndpointMissing`] is fatal to `create_edge` and is
//! surfaced to the caller, never retried. Missing nodes encountered
//! during traversal, query assembly, or edge-delete adjacency fixup are
//! tolerated silently — they represent acceptable skew, not data loss.

pub mod config;
pub mod id;
pub mod types;

#[cfg(test)]
mod tests;

pub use config::GraphConfig;
pub use types::{
    Direction, Edge, EdgeId, GraphError, Node, NodeId, PropertyMap, QueryPage, QuerySpec,
    TraverseOptions, value_repr,
};

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};

use crate::store::KvStore;

/// The small record written at each index key: `{nodeId, value}` per
/// spec.md §4.2. The node id also lives in the key itself (as the
/// substring after the last `:`), so this record is read back only for
/// administrative inspection — `query` never needs to parse it.
#[derive(Debug, Serialize, Deserialize)]
struct IndexRecord {
    node_id: NodeId,
    value: serde_json::Value,
}

pub struct GraphStore<S: KvStore> {
    store: Arc<S>,
    config: GraphConfig,
}

impl<S: KvStore> Clone for GraphStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

impl<S: KvStore> GraphStore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, GraphConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: GraphConfig) -> Self {
        Self { store, config }
    }

    async fn put_node(&self, node: &Node) -> Result<(), GraphError> {
        let bytes = serde_json::to_vec(node)?;
        self.store.put(&self.config.node_key(&node.id), bytes).await?;
        Ok(())
    }

    async fn put_edge(&self, edge: &Edge) -> Result<(), GraphError> {
        let bytes = serde_json::to_vec(edge)?;
        self.store.put(&self.config.edge_key(&edge.id), bytes).await?;
        Ok(())
    }

    async fn read_node(&self, id: &str) -> Result<Option<Node>, GraphError> {
        match self.store.get(&self.config.node_key(id)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn read_edge(&self, id: &str) -> Result<Option<Edge>, GraphError> {
        match self.store.get(&self.config.edge_key(id)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn write_index_entries(&self, node: &Node) -> Result<(), GraphError> {
        for (key, value) in &node.properties {
            let repr = value_repr(value);
            let record = IndexRecord {
                node_id: node.id.clone(),
                value: value.clone(),
            };
            let index_key = self.config.index_key(key, &repr, &node.id);
            self.store
                .put(&index_key, serde_json::to_vec(&record)?)
                .await?;
        }
        Ok(())
    }

    async fn delete_index_entries(&self, node: &Node) -> Result<(), GraphError> {
        for (key, value) in &node.properties {
            let repr = value_repr(value);
            let index_key = self.config.index_key(key, &repr, &node.id);
            self.store.delete(&index_key).await?;
        }
        Ok(())
    }

    /// Allocates a fresh id, writes the node record, then writes one
    /// index entry per property. Does not verify natural-key uniqueness
    /// — that discipline belongs to the identity tracker (spec.md §5).
    pub async fn create_node(&self, properties: PropertyMap) -> Result<Node, GraphError> {
        let node = Node {
            id: id::generate_id(),
            properties,
            in_edges: Vec::new(),
            out_edges: Vec::new(),
        };
        self.put_node(&node).await?;
        self.write_index_entries(&node).await?;
        Ok(node)
    }

    pub async fn get_node(&self, id: &str) -> Result<Option<Node>, GraphError> {
        self.read_node(id).await
    }

    /// Deletes index entries for *every* current property, merges `delta`
    /// over the properties map (delta overwrites), writes the node back,
    /// then writes index entries for every resulting property.
    ///
    /// Delete-all-then-write-all is simpler than diffing the old and new
    /// property maps and is correct for the small property maps this
    /// graph deals in (spec.md §4.2).
    pub async fn update_node(
        &self,
        id: &str,
        delta: PropertyMap,
    ) -> Result<Option<Node>, GraphError> {
        let Some(mut node) = self.read_node(id).await? else {
            return Ok(None);
        };
        self.delete_index_entries(&node).await?;
        for (key, value) in delta {
            node.properties.insert(key, value);
        }
        self.put_node(&node).await?;
        self.write_index_entries(&node).await?;
        Ok(Some(node))
    }

    /// Cascades onto every incident edge, then removes the node's index
    /// entries and record. Returns `false` if the node did not exist.
    pub async fn delete_node(&self, id: &str) -> Result<bool, GraphError> {
        let Some(node) = self.read_node(id).await? else {
            return Ok(false);
        };

        let mut edge_ids = node.in_edges.clone();
        for edge_id in &node.out_edges {
            if !edge_ids.contains(edge_id) {
                edge_ids.push(edge_id.clone());
            }
        }
        for edge_id in edge_ids {
            self.delete_edge(&edge_id).await?;
        }

        self.delete_index_entries(&node).await?;
        self.store.delete(&self.config.node_key(id)).await?;
        Ok(true)
    }

    /// Reads both endpoints; fails with [`GraphError::EndpointMissing`] if
    /// either is absent. Endpoint records are not locked — two concurrent
    /// `create_edge` calls touching the same endpoint's adjacency list
    /// can race (spec.md §5).
    pub async fn create_edge(
        &self,
        from_id: &str,
        to_id: &str,
        edge_type: &str,
        properties: PropertyMap,
    ) -> Result<Edge, GraphError> {
        let edge = Edge {
            id: id::generate_id(),
            edge_type: edge_type.to_string(),
            from_node_id: from_id.to_string(),
            to_node_id: to_id.to_string(),
            properties,
        };

        if from_id == to_id {
            let mut node = self
                .read_node(from_id)
                .await?
                .ok_or_else(|| GraphError::EndpointMissing(from_id.to_string()))?;
            node.out_edges.push(edge.id.clone());
            node.in_edges.push(edge.id.clone());
            self.put_node(&node).await?;
        } else {
            let (from_node, to_node) =
                tokio::try_join!(self.read_node(from_id), self.read_node(to_id))?;
            let mut from_node =
                from_node.ok_or_else(|| GraphError::EndpointMissing(from_id.to_string()))?;
            let mut to_node =
                to_node.ok_or_else(|| GraphError::EndpointMissing(to_id.to_string()))?;
            from_node.out_edges.push(edge.id.clone());
            to_node.in_edges.push(edge.id.clone());
            tokio::try_join!(self.put_node(&from_node), self.put_node(&to_node))?;
        }

        self.put_edge(&edge).await?;
        Ok(edge)
    }

    pub async fn get_edge(&self, id: &str) -> Result<Option<Edge>, GraphError> {
        self.read_edge(id).await
    }

    /// Merges properties; edges carry no indexes so there is no index
    /// bookkeeping to do.
    pub async fn update_edge(
        &self,
        id: &str,
        delta: PropertyMap,
    ) -> Result<Option<Edge>, GraphError> {
        let Some(mut edge) = self.read_edge(id).await? else {
            return Ok(None);
        };
        for (key, value) in delta {
            edge.properties.insert(key, value);
        }
        self.put_edge(&edge).await?;
        Ok(Some(edge))
    }

    /// Removes the edge's id from each endpoint's adjacency list
    /// (rewriting each endpoint), then deletes the edge record. Absent
    /// endpoints are tolerated silently. A self-loop (`from_node_id ==
    /// to_node_id`) is handled as a single read-modify-write against one
    /// node, retaining on both `in_edges` and `out_edges`, mirroring how
    /// `create_edge` special-cases the same endpoint to avoid losing one
    /// of the two adjacency updates.
    pub async fn delete_edge(&self, id: &str) -> Result<bool, GraphError> {
        let Some(edge) = self.read_edge(id).await? else {
            return Ok(false);
        };

        if edge.from_node_id == edge.to_node_id {
            if let Some(mut node) = self.read_node(&edge.from_node_id).await? {
                node.out_edges.retain(|e| e != id);
                node.in_edges.retain(|e| e != id);
                self.put_node(&node).await?;
            } else {
                tracing::debug!(edge_id = %id, node_id = %edge.from_node_id, "delete_edge: self-loop endpoint missing, skipping adjacency fixup");
            }
        } else {
            if let Some(mut from_node) = self.read_node(&edge.from_node_id).await? {
                from_node.out_edges.retain(|e| e != id);
                self.put_node(&from_node).await?;
            } else {
                tracing::debug!(edge_id = %id, node_id = %edge.from_node_id, "delete_edge: from-endpoint missing, skipping adjacency fixup");
            }

            if let Some(mut to_node) = self.read_node(&edge.to_node_id).await? {
                to_node.in_edges.retain(|e| e != id);
                self.put_node(&to_node).await?;
            } else {
                tracing::debug!(edge_id = %id, node_id = %edge.to_node_id, "delete_edge: to-endpoint missing, skipping adjacency fixup");
            }
        }

        self.store.delete(&self.config.edge_key(id)).await?;
        Ok(true)
    }

    /// Selects an index prefix from `spec` (by type, by property+value, or
    /// the full `index:` namespace for administrative listing), delegates
    /// pagination to the store (which already fetches one past `limit` to
    /// decide `has_more`), fetches nodes concurrently, and silently skips
    /// any that no longer resolve.
    pub async fn query(&self, spec: QuerySpec) -> Result<QueryPage, GraphError> {
        let prefix = if let Some(node_type) = &spec.node_type {
            self.config.index_prefix_for_type(node_type)
        } else if let (Some(property), Some(value)) = (&spec.property, &spec.value) {
            let repr = value_repr(value);
            self.config.index_prefix_for_property(property, &repr)
        } else {
            self.config.index_prefix.clone()
        };

        let page = self.store.list(&prefix, spec.limit, spec.cursor).await?;
        let has_more = !page.complete;

        let node_ids: Vec<String> = page
            .keys
            .iter()
            .filter_map(|k| k.rsplit(':').next().map(str::to_string))
            .collect();

        let nodes = try_join_all(node_ids.iter().map(|id| self.read_node(id))).await?;
        let items = nodes.into_iter().flatten().collect();

        Ok(QueryPage {
            items,
            cursor: page.next_cursor,
            has_more,
        })
    }

    /// Reads the node, fetches each incident edge in `direction`, keeps
    /// those matching `edge_type` if given, fetches the opposite endpoint
    /// of each surviving edge, and drops missing endpoints.
    pub async fn get_connected_nodes(
        &self,
        node_id: &str,
        direction: Direction,
        edge_type: Option<&str>,
    ) -> Result<Vec<Node>, GraphError> {
        let pairs = self.connected_edges(node_id, direction, edge_type).await?;
        Ok(pairs.into_iter().map(|(node, _)| node).collect())
    }

    /// Like [`Self::get_connected_nodes`] but also returns the edge that
    /// connects each node, for callers that need edge statistics (the
    /// identity tracker's `getUserConnections`/`getConnectionGraph`).
    pub async fn connected_edges(
        &self,
        node_id: &str,
        direction: Direction,
        edge_type: Option<&str>,
    ) -> Result<Vec<(Node, Edge)>, GraphError> {
        let Some(node) = self.read_node(node_id).await? else {
            return Ok(Vec::new());
        };

        let edge_ids: Vec<EdgeId> = match direction {
            Direction::Out => node.out_edges.clone(),
            Direction::In => node.in_edges.clone(),
            Direction::Both => {
                let mut both = node.out_edges.clone();
                both.extend(node.in_edges.clone());
                both
            }
        };

        let edges = try_join_all(edge_ids.iter().map(|id| self.read_edge(id))).await?;
        let mut pairs = Vec::new();
        for edge in edges.into_iter().flatten() {
            if edge_type.is_some_and(|wanted| edge.edge_type != wanted) {
                continue;
            }
            let other_id = if edge.from_node_id == node_id {
                edge.to_node_id.clone()
            } else {
                edge.from_node_id.clone()
            };
            if let Some(other) = self.read_node(&other_id).await? {
                pairs.push((other, edge));
            }
        }
        Ok(pairs)
    }

    /// Depth-bounded walk that visits each node at most once. `visited`
    /// and the result buffer are logically shared across the recursion;
    /// implemented here as an explicit work-list rather than a recursive
    /// `async fn` (spec.md §9 explicitly sanctions this substitution).
    /// Nodes at `depth >= max_depth` are included in the result but not
    /// expanded further.
    pub async fn traverse(
        &self,
        start_id: &str,
        opts: TraverseOptions,
    ) -> Result<Vec<Node>, GraphError> {
        let mut visited: HashSet<NodeId> = HashSet::from([start_id.to_string()]);
        let mut result: Vec<Node> = Vec::new();
        let mut frontier: Vec<(NodeId, usize)> = vec![(start_id.to_string(), 0)];

        while let Some((node_id, depth)) = frontier.pop() {
            if node_id != start_id {
                let Some(node) = self.read_node(&node_id).await? else {
                    continue;
                };
                result.push(node);
            }

            if depth >= opts.max_depth {
                continue;
            }

            let neighbors = match opts.direction {
                Direction::Both => {
                    let mut both = self
                        .get_connected_nodes(&node_id, Direction::Out, opts.edge_type.as_deref())
                        .await?;
                    both.extend(
                        self.get_connected_nodes(&node_id, Direction::In, opts.edge_type.as_deref())
                            .await?,
                    );
                    both
                }
                dir => {
                    self.get_connected_nodes(&node_id, dir, opts.edge_type.as_deref())
                        .await?
                }
            };

            for neighbor in neighbors {
                if visited.insert(neighbor.id.clone()) {
                    frontier.push((neighbor.id, depth + 1));
                }
            }
        }

        Ok(result)
    }
}
