//! # Identity Tracker
//!
//! ## Purpose
//! Upserts `USER`, `IP`, `FINGERPRINT` nodes and `USES_IP` /
//! `USES_FINGERPRINT` edges on every observed session, and projects two
//! read views over the resulting graph: a single user's connections, and
//! a risk-filtered subgraph across all users.
//!
//! ## Data flow
//! `recordConnection`: three concurrent node upserts, each a
//! query-by-natural-key followed by either an update or a create, then
//! two concurrent edge upserts, each a scan of the user's `outEdges`
//! followed by either an update or a create.
//!
//! ## Concurrency & ordering
//! Node upserts complete before edge upserts start. The two edge
//! upserts race on the user node's adjacency list — both read the user
//! node's `outEdges`, append, and write back without locking, so a
//! concurrent append can be lost. This crate accepts that loss rather
//! than serializing per-user writes: the edge record itself still
//! persists, a future call will simply fail its edge-lookup scan and
//! create a duplicate edge, and the risk engine tolerates duplicates
//! with only a small scoring bias (spec.md §5).
//!
//! ## Failure modes & recovery
//! Store failures propagate unchanged; this layer never swallows them.
//! A caller that abandons `recordConnection` mid-flight can leave a node
//! without its edges, which self-heals on the next call for that user.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::graph::{Direction, Edge, GraphError, GraphStore, Node, NodeId, PropertyMap, QuerySpec};
use crate::store::KvStore;

use super::config::TrackerConfig;
use super::risk::{RiskEngine, RiskLevel};
use super::ua::UaClassifier;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error(transparent)]
    Graph(#[from] GraphError),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub first_seen: String,
    pub last_seen: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IpConnection {
    pub ip: String,
    pub stats: Stats,
}

#[derive(Debug, Clone, Serialize)]
pub struct FingerprintConnection {
    pub fingerprint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub stats: Stats,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct UserConnections {
    pub ips: Vec<IpConnection>,
    pub fingerprints: Vec<FingerprintConnection>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub stats: Stats,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphLink {
    pub source: NodeId,
    pub target: NodeId,
    #[serde(rename = "type")]
    pub edge_type: String,
    pub stats: Stats,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ConnectionGraph {
    pub nodes: Vec<GraphNode>,
    pub links: Vec<GraphLink>,
}

#[derive(Debug, Clone)]
pub struct ConnectionGraphOptions {
    pub hours: i64,
    pub risk_threshold: u32,
}

impl Default for ConnectionGraphOptions {
    fn default() -> Self {
        Self {
            hours: 24,
            risk_threshold: 0,
        }
    }
}

/// Upserts the tripartite identity graph and projects read views over it.
/// Generic over the store backing the graph beneath it; holds no state
/// of its own beyond configuration and the UA classifier.
pub struct IdentityTracker<S: KvStore> {
    graph: GraphStore<S>,
    ua_classifier: Arc<dyn UaClassifier>,
    config: TrackerConfig,
}

impl<S: KvStore> IdentityTracker<S> {
    pub fn new(graph: GraphStore<S>, ua_classifier: Arc<dyn UaClassifier>) -> Self {
        Self::with_config(graph, ua_classifier, TrackerConfig::default())
    }

    pub fn with_config(
        graph: GraphStore<S>,
        ua_classifier: Arc<dyn UaClassifier>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            graph,
            ua_classifier,
            config,
        }
    }

    /// Records one observed session. Upserts the `USER`, `IP`, and
    /// `FINGERPRINT` nodes concurrently, then the `USES_IP` and
    /// `USES_FINGERPRINT` edges concurrently (spec.md §4.3, §5).
    pub async fn record_connection(
        &self,
        user_id: &str,
        ip: &str,
        fingerprint: &str,
        user_agent: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), TrackerError> {
        let (user_node, ip_node, fingerprint_node) = tokio::try_join!(
            self.get_or_create_user_node(user_id, timestamp),
            self.get_or_create_ip_node(ip, timestamp),
            self.get_or_create_fingerprint_node(fingerprint, user_agent, timestamp),
        )?;

        tokio::try_join!(
            self.get_or_create_edge(&user_node, &ip_node.id, "USES_IP", timestamp),
            self.get_or_create_edge(&user_node, &fingerprint_node.id, "USES_FINGERPRINT", timestamp),
        )?;

        Ok(())
    }

    /// Returns `{ips: [], fingerprints: []}` if the user has never been
    /// observed.
    pub async fn get_user_connections(&self, user_id: &str) -> Result<UserConnections, TrackerError> {
        let Some(user) = self.find_node_by_property("userId", user_id).await? else {
            return Ok(UserConnections::default());
        };

        let (ip_pairs, fp_pairs) = tokio::try_join!(
            self.graph.connected_edges(&user.id, Direction::Out, Some("USES_IP")),
            self.graph
                .connected_edges(&user.id, Direction::Out, Some("USES_FINGERPRINT")),
        )?;

        let ips = ip_pairs
            .iter()
            .filter_map(|(node, edge)| {
                node.property_str("ip").map(|ip| IpConnection {
                    ip: ip.to_string(),
                    stats: stats_from_edge(edge),
                })
            })
            .collect();

        let fingerprints = fp_pairs
            .iter()
            .filter_map(|(node, edge)| {
                node.property_str("fingerprint").map(|fp| FingerprintConnection {
                    fingerprint: fp.to_string(),
                    metadata: node.property("metadata").cloned(),
                    stats: stats_from_edge(edge),
                })
            })
            .collect();

        Ok(UserConnections { ips, fingerprints })
    }

    /// Enumerates `USER` nodes (first page only — see spec.md §9 open
    /// question), computes each user's risk score, skips users below
    /// `riskThreshold` or with no edge inside the `hours` window, and
    /// emits the surviving users, their in-window neighbors, and links.
    pub async fn get_connection_graph(
        &self,
        opts: ConnectionGraphOptions,
    ) -> Result<ConnectionGraph, TrackerError> {
        let now = Utc::now();
        let cutoff = iso(now - Duration::hours(opts.hours));

        let page = self
            .graph
            .query(QuerySpec::by_type("USER", self.config.user_page_size))
            .await?;
        if page.has_more {
            tracing::warn!(
                page_size = self.config.user_page_size,
                "getConnectionGraph: more USER nodes exist beyond the first page; they are dropped"
            );
        }

        let mut nodes = Vec::new();
        let mut seen_nodes: HashSet<NodeId> = HashSet::new();
        let mut links = Vec::new();
        let mut seen_links: HashSet<String> = HashSet::new();

        for user in page.items {
            let (ip_pairs, fp_pairs) = tokio::try_join!(
                self.graph.connected_edges(&user.id, Direction::Out, Some("USES_IP")),
                self.graph
                    .connected_edges(&user.id, Direction::Out, Some("USES_FINGERPRINT")),
            )?;

            let assessment = RiskEngine::calculate_user_risk(&ip_pairs, &fp_pairs, now);
            if assessment.score < opts.risk_threshold {
                continue;
            }

            let in_window: Vec<&(Node, Edge)> = ip_pairs
                .iter()
                .chain(fp_pairs.iter())
                .filter(|(_, edge)| edge.last_seen().is_some_and(|ts| ts >= cutoff))
                .collect();
            if in_window.is_empty() {
                continue;
            }

            let total_count = (ip_pairs.len() + fp_pairs.len()) as u64;
            if seen_nodes.insert(user.id.clone()) {
                nodes.push(GraphNode {
                    id: user.id.clone(),
                    node_type: "USER".to_string(),
                    label: user.property_str("userId").unwrap_or_default().to_string(),
                    risk: Some(assessment.level),
                    risk_score: Some(assessment.score),
                    metadata: None,
                    stats: Stats {
                        first_seen: user.property_str("firstSeen").unwrap_or_default().to_string(),
                        last_seen: user.property_str("lastSeen").unwrap_or_default().to_string(),
                        count: total_count,
                    },
                });
            }

            for (endpoint, edge) in in_window {
                if seen_nodes.insert(endpoint.id.clone()) {
                    nodes.push(endpoint_to_graph_node(endpoint, edge));
                }

                let link_key = format!("{}-{}", user.id, endpoint.id);
                if seen_links.insert(link_key) {
                    links.push(GraphLink {
                        source: user.id.clone(),
                        target: endpoint.id.clone(),
                        edge_type: edge.edge_type.clone(),
                        stats: stats_from_edge(edge),
                    });
                }
            }
        }

        Ok(ConnectionGraph { nodes, links })
    }

    async fn find_node_by_property(&self, property: &str, value: &str) -> Result<Option<Node>, GraphError> {
        let spec = QuerySpec::by_property(property, json!(value), 1);
        let page = self.graph.query(spec).await?;
        Ok(page.items.into_iter().next())
    }

    async fn get_or_create_user_node(&self, user_id: &str, timestamp: DateTime<Utc>) -> Result<Node, GraphError> {
        self.get_or_create_node("USER", "userId", user_id, timestamp, PropertyMap::new())
            .await
    }

    async fn get_or_create_ip_node(&self, ip: &str, timestamp: DateTime<Utc>) -> Result<Node, GraphError> {
        self.get_or_create_node("IP", "ip", ip, timestamp, PropertyMap::new())
            .await
    }

    /// Like the other two node upserts, except the UA classifier is only
    /// consulted on the creation path (spec.md §4.3): an existing
    /// fingerprint is never reclassified.
    async fn get_or_create_fingerprint_node(
        &self,
        fingerprint: &str,
        user_agent: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Node, GraphError> {
        let ts = iso(timestamp);

        if let Some(existing) = self.find_node_by_property("fingerprint", fingerprint).await? {
            let delta = props([("lastSeen", json!(ts))]);
            let updated = self.graph.update_node(&existing.id, delta).await?;
            return Ok(updated.unwrap_or(existing));
        }

        let classification = self.ua_classifier.classify(user_agent).await;
        let mut properties = PropertyMap::new();
        properties.insert("type".to_string(), json!("FINGERPRINT"));
        properties.insert("fingerprint".to_string(), json!(fingerprint));
        properties.insert("firstSeen".to_string(), json!(ts.clone()));
        properties.insert("lastSeen".to_string(), json!(ts));
        properties.insert("metadata".to_string(), classification.to_metadata());
        self.graph.create_node(properties).await
    }

    async fn get_or_create_node(
        &self,
        node_type: &str,
        natural_key_prop: &str,
        natural_key_value: &str,
        timestamp: DateTime<Utc>,
        extra: PropertyMap,
    ) -> Result<Node, GraphError> {
        let ts = iso(timestamp);

        if let Some(existing) = self.find_node_by_property(natural_key_prop, natural_key_value).await? {
            let delta = props([("lastSeen", json!(ts))]);
            let updated = self.graph.update_node(&existing.id, delta).await?;
            return Ok(updated.unwrap_or(existing));
        }

        let mut properties = PropertyMap::new();
        properties.insert("type".to_string(), json!(node_type));
        properties.insert(natural_key_prop.to_string(), json!(natural_key_value));
        properties.insert("firstSeen".to_string(), json!(ts.clone()));
        properties.insert("lastSeen".to_string(), json!(ts));
        for (key, value) in extra {
            properties.insert(key, value);
        }
        self.graph.create_node(properties).await
    }

    /// Scans `from_node`'s `outEdges` for one matching `(edge_type,
    /// to_id)`; advances its `lastSeen` and increments `count` if found,
    /// otherwise creates it with `count = 1`.
    async fn get_or_create_edge(
        &self,
        from_node: &Node,
        to_id: &str,
        edge_type: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Edge, GraphError> {
        let ts = iso(timestamp);

        for edge_id in &from_node.out_edges {
            if let Some(edge) = self.graph.get_edge(edge_id).await? {
                if edge.edge_type == edge_type && edge.to_node_id == to_id {
                    let count = edge.count() + 1;
                    let delta = props([("lastSeen", json!(ts)), ("count", json!(count))]);
                    let updated = self.graph.update_edge(&edge.id, delta).await?;
                    return Ok(updated.unwrap_or(edge));
                }
            }
        }

        let properties = props([
            ("firstSeen", json!(ts.clone())),
            ("lastSeen", json!(ts)),
            ("count", json!(1)),
        ]);
        self.graph.create_edge(&from_node.id, to_id, edge_type, properties).await
    }
}

fn endpoint_to_graph_node(node: &Node, edge: &Edge) -> GraphNode {
    let node_type = node.property_str("type").unwrap_or_default().to_string();
    let label = match node_type.as_str() {
        "IP" => node.property_str("ip").unwrap_or_default().to_string(),
        "FINGERPRINT" => node.property_str("fingerprint").unwrap_or_default().to_string(),
        _ => node.id.clone(),
    };
    GraphNode {
        id: node.id.clone(),
        node_type,
        label,
        risk: None,
        risk_score: None,
        metadata: node.property("metadata").cloned(),
        stats: stats_from_edge(edge),
    }
}

fn stats_from_edge(edge: &Edge) -> Stats {
    Stats {
        first_seen: edge.first_seen().unwrap_or_default().to_string(),
        last_seen: edge.last_seen().unwrap_or_default().to_string(),
        count: edge.count(),
    }
}

fn props<const N: usize>(pairs: [(&str, serde_json::Value); N]) -> PropertyMap {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ua::NoopUaClassifier;
    use crate::store::InMemoryKvStore;

    fn tracker() -> IdentityTracker<InMemoryKvStore> {
        let graph = GraphStore::new(Arc::new(InMemoryKvStore::new()));
        IdentityTracker::new(graph, Arc::new(NoopUaClassifier))
    }

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    /// S1 — single session creates three nodes and two edges, each with
    /// count=1 and firstSeen=lastSeen.
    #[tokio::test]
    async fn single_session_creates_nodes_and_edges_with_count_one() {
        let tracker = tracker();
        tracker
            .record_connection("u1", "1.1.1.1", "fpA", "Mozilla/5.0", ts("2024-01-01T00:00:00Z"))
            .await
            .unwrap();

        let conns = tracker.get_user_connections("u1").await.unwrap();
        assert_eq!(conns.ips.len(), 1);
        assert_eq!(conns.fingerprints.len(), 1);
        assert_eq!(conns.ips[0].ip, "1.1.1.1");
        assert_eq!(conns.ips[0].stats.count, 1);
        assert_eq!(conns.ips[0].stats.first_seen, conns.ips[0].stats.last_seen);
        assert_eq!(conns.fingerprints[0].fingerprint, "fpA");
    }

    /// S2 — a repeat session for the same triple advances lastSeen and
    /// increments count without creating new nodes or edges.
    #[tokio::test]
    async fn repeat_session_updates_existing_edges() {
        let tracker = tracker();
        tracker
            .record_connection("u1", "1.1.1.1", "fpA", "Mozilla/5.0", ts("2024-01-01T00:00:00Z"))
            .await
            .unwrap();
        tracker
            .record_connection("u1", "1.1.1.1", "fpA", "Mozilla/5.0", ts("2024-01-01T00:01:00Z"))
            .await
            .unwrap();

        let conns = tracker.get_user_connections("u1").await.unwrap();
        assert_eq!(conns.ips.len(), 1);
        assert_eq!(conns.ips[0].stats.count, 2);
        assert_eq!(conns.ips[0].stats.first_seen, "2024-01-01T00:00:00.000Z");
        assert_eq!(conns.ips[0].stats.last_seen, "2024-01-01T00:01:00.000Z");
    }

    #[tokio::test]
    async fn unknown_user_has_no_connections() {
        let tracker = tracker();
        let conns = tracker.get_user_connections("ghost").await.unwrap();
        assert!(conns.ips.is_empty());
        assert!(conns.fingerprints.is_empty());
    }

    /// S6 — an edge older than the requested window is excluded, and a
    /// user with no in-window edges does not appear at all.
    #[tokio::test]
    async fn connection_graph_filters_by_window() {
        let tracker = tracker();
        let now = Utc::now();
        tracker
            .record_connection("u1", "1.1.1.1", "fpA", "Mozilla/5.0", now - Duration::hours(25))
            .await
            .unwrap();

        let graph = tracker
            .get_connection_graph(ConnectionGraphOptions {
                hours: 24,
                risk_threshold: 0,
            })
            .await
            .unwrap();

        assert!(graph.nodes.is_empty());
        assert!(graph.links.is_empty());
    }

    #[tokio::test]
    async fn connection_graph_includes_users_with_recent_edges() {
        let tracker = tracker();
        let now = Utc::now();
        tracker
            .record_connection("u1", "1.1.1.1", "fpA", "Mozilla/5.0", now)
            .await
            .unwrap();

        let graph = tracker
            .get_connection_graph(ConnectionGraphOptions {
                hours: 24,
                risk_threshold: 0,
            })
            .await
            .unwrap();

        assert_eq!(graph.nodes.iter().filter(|n| n.node_type == "USER").count(), 1);
        assert_eq!(graph.nodes.iter().filter(|n| n.node_type == "IP").count(), 1);
        assert_eq!(graph.nodes.iter().filter(|n| n.node_type == "FINGERPRINT").count(), 1);
        assert_eq!(graph.links.len(), 2);
    }
}
