//! # riskgraph
//!
//! ## Purpose
//! Maintains a tripartite identity graph (users, IP addresses, browser
//! fingerprints) observed by a web-facing service, and derives a per-user
//! behavioral risk score from recent identity churn.
//!
//! ## Mental model
//! Three layers, leaves first: a [`store`] facade over an ordered
//! key-value host, a [`graph`] that turns that store into a schema-light
//! property graph with secondary indexes, and an [`identity`] layer that
//! upserts the graph's nodes/edges and scores churn over time windows.
//!
//! ## Key types
//! | Type | Description |
//! | --- | --- |
//! | [`store::KvStore`] | Narrow facade over the host key-value store. |
//! | [`graph::GraphStore`] | Property graph over a `KvStore`. |
//! | [`identity::tracker::IdentityTracker`] | Upserts nodes/edges, projects the risk graph. |
//! | [`identity::risk::RiskEngine`] | Pure per-user churn scoring. |
//!
//! ## Concurrency & ordering
//! No component holds a lock across an `.await`; operations issued
//! together within one call (the three node upserts of `record_connection`,
//! for instance) race against each other but all complete before the call
//! returns. See [`identity::tracker`] for the accepted races.

pub mod graph;
pub mod identity;
pub mod store;

pub use graph::{Edge, EdgeId, GraphStore, Node, NodeId};
pub use identity::risk::{RiskAssessment, RiskFactor, RiskLevel};
pub use identity::tracker::IdentityTracker;
pub use store::KvStore;
