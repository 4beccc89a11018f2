//! # Identity Tracker + Risk Engine
//!
//! ## Purpose
//! Upserts `USER`, `IP`, `FINGERPRINT` nodes and `USES_IP` /
//! `USES_FINGERPRINT` edges with first-seen/last-seen/count statistics,
//! derives per-user risk factors from recent edge activity, and projects
//! a filtered connection subgraph for visualization.
//!
//! ## Mental model
//! The tracker ([`tracker::IdentityTracker`]) is the only component that
//! knows what `USER`/`IP`/`FINGERPRINT` and `USES_IP`/`USES_FINGERPRINT`
//! mean — to the graph layer beneath it they are just a property value
//! and an edge type string. The risk engine ([`risk::RiskEngine`]) is a
//! pure function over edges the tracker has already fetched; it has no
//! dependency on the graph or store.

pub mod config;
pub mod risk;
pub mod tracker;
pub mod ua;

pub use config::TrackerConfig;
pub use risk::{RiskAssessment, RiskFactor, RiskLevel};
pub use tracker::{ConnectionGraph, ConnectionGraphOptions, IdentityTracker, TrackerError, UserConnections};
pub use ua::{NoopUaClassifier, UaClassification, UaClassifier};
