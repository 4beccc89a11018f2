//! # Risk Engine
//!
//! ## Purpose
//! Scores a single user's recent identity churn from the edges the
//! identity tracker has already fetched. Four independent, capped,
//! additive factors over three time windows (spec.md §4.4).
//!
//! ## Invariants
//! - Score is always in `[0, 100]`; an empty-edge user scores 0.
//!   - Enforced in: [`RiskEngine::calculate_user_risk`].
//!   - Tested by: `risk::tests::no_edges_scores_zero`.
//! - Level is a deterministic partition of score: `≥70` HIGH, `≥40`
//!   MEDIUM, else LOW.
//!   - Enforced in: [`RiskLevel::from_score`].
//!
//! ## Failure modes & recovery
//! None — this is a pure function over its inputs and never fails
//! (spec.md §7).

use std::collections::HashSet;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Serialize;

use crate::graph::{Edge, Node};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: u32) -> Self {
        if score >= 70 {
            RiskLevel::High
        } else if score >= 40 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// One additive contribution to a user's risk score.
#[derive(Debug, Clone, Serialize)]
pub struct RiskFactor {
    pub score: u32,
    pub reason: &'static str,
    pub details: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskAssessment {
    pub score: u32,
    pub level: RiskLevel,
    pub factors: Vec<RiskFactor>,
}

/// Stateless churn scorer. Takes no dependency on the graph or store —
/// callers gather the edges (typically via
/// [`crate::graph::GraphStore::connected_edges`]), this just scores them.
pub struct RiskEngine;

impl RiskEngine {
    /// `ip_edges` and `fingerprint_edges` are `(neighbor node, edge)`
    /// pairs for a single user's `USES_IP` / `USES_FINGERPRINT`
    /// adjacency, as returned by
    /// [`crate::graph::GraphStore::connected_edges`]. `now` anchors all
    /// three time windows.
    pub fn calculate_user_risk(
        ip_edges: &[(Node, Edge)],
        fingerprint_edges: &[(Node, Edge)],
        now: DateTime<Utc>,
    ) -> RiskAssessment {
        let cutoff_24h = iso(now - Duration::hours(24));
        let cutoff_1h = iso(now - Duration::hours(1));
        let cutoff_5m = iso(now - Duration::minutes(5));

        let mut factors = Vec::new();

        let ips_24h = distinct_values(ip_edges, "ip", &cutoff_24h);
        if ips_24h.len() > 3 {
            let n = ips_24h.len() as u32;
            factors.push(RiskFactor {
                score: (n * 10).min(30),
                reason: "Multiple IPs in 24 hours",
                details: format!("{n} distinct IPs in the last 24 hours"),
            });
        }

        let ips_1h = distinct_values(ip_edges, "ip", &cutoff_1h);
        if ips_1h.len() > 2 {
            let n = ips_1h.len() as u32;
            factors.push(RiskFactor {
                score: (n * 15).min(40),
                reason: "Rapid IP switching",
                details: format!("{n} distinct IPs in the last hour"),
            });
        }

        let fps_24h = distinct_values(fingerprint_edges, "fingerprint", &cutoff_24h);
        if fps_24h.len() > 2 {
            let n = fps_24h.len() as u32;
            factors.push(RiskFactor {
                score: (n * 15).min(35),
                reason: "Multiple fingerprints in 24 hours",
                details: format!("{n} distinct fingerprints in the last 24 hours"),
            });
        }

        if let Some(factor) = rapid_identity_change_factor(ip_edges, fingerprint_edges, &cutoff_5m) {
            factors.push(factor);
        }

        let score = factors.iter().map(|f| f.score).sum::<u32>().min(100);
        let level = RiskLevel::from_score(score);

        RiskAssessment { score, level, factors }
    }
}

/// Builds a unified event list from the `lastSeen` of every IP and
/// fingerprint edge `>= cutoff`, sorts ascending, and counts adjacent
/// pairs whose delta is strictly under 1000ms. Omitted if fewer than two
/// events fall in the window or no pair qualifies.
fn rapid_identity_change_factor(
    ip_edges: &[(Node, Edge)],
    fingerprint_edges: &[(Node, Edge)],
    cutoff: &str,
) -> Option<RiskFactor> {
    let mut events: Vec<DateTime<Utc>> = ip_edges
        .iter()
        .chain(fingerprint_edges.iter())
        .filter_map(|(_, edge)| edge.last_seen())
        .filter(|ts| *ts >= cutoff)
        .filter_map(parse_ts)
        .collect();
    events.sort();

    if events.len() < 2 {
        return None;
    }

    let rapid_pairs = events
        .windows(2)
        .filter(|pair| (pair[1] - pair[0]).num_milliseconds() < 1000)
        .count() as u32;

    if rapid_pairs == 0 {
        return None;
    }

    Some(RiskFactor {
        score: (rapid_pairs * 15).min(35),
        reason: "Very rapid identity changes",
        details: format!("{rapid_pairs} identity change(s) under 1 second apart"),
    })
}

fn distinct_values(edges: &[(Node, Edge)], property: &str, cutoff: &str) -> HashSet<String> {
    edges
        .iter()
        .filter(|(_, edge)| edge.last_seen().is_some_and(|ts| ts >= cutoff))
        .filter_map(|(node, _)| node.property_str(property).map(str::to_string))
        .collect()
}

fn parse_ts(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
