//! Runnable demonstration of the identity graph and risk engine.
//!
//! Spins up an in-memory store, replays a handful of `record_connection`
//! calls against it, and prints `get_user_connections`/
//! `get_connection_graph` output as JSON. Not a production HTTP service
//! — the boundary layer (routing, auth, decrypt oracle) is out of scope
//! (spec.md §1).

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use riskgraph::graph::GraphStore;
use riskgraph::identity::{ConnectionGraphOptions, IdentityTracker, NoopUaClassifier};
use riskgraph::store::InMemoryKvStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(about = "Replays sample sessions through the identity tracker and risk engine")]
struct Args {
    /// Window size passed to get_connection_graph, in hours.
    #[arg(long, default_value_t = 24)]
    hours: i64,

    /// Minimum risk score for a user to appear in the connection graph.
    #[arg(long, default_value_t = 0)]
    risk_threshold: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,riskgraph=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let store = Arc::new(InMemoryKvStore::new());
    let graph = GraphStore::new(store);
    let tracker = IdentityTracker::new(graph, Arc::new(NoopUaClassifier));

    println!("Replaying sample sessions...\n");
    replay_sample_sessions(&tracker).await?;

    println!("--- alice's connections ---");
    let alice = tracker.get_user_connections("alice").await?;
    println!("{}\n", serde_json::to_string_pretty(&alice)?);

    println!("--- connection graph (hours={}, risk_threshold={}) ---", args.hours, args.risk_threshold);
    let graph = tracker
        .get_connection_graph(ConnectionGraphOptions {
            hours: args.hours,
            risk_threshold: args.risk_threshold,
        })
        .await?;
    println!("{}", serde_json::to_string_pretty(&graph)?);

    Ok(())
}

/// A calm user (bob, one IP/fingerprint) and a churning one (alice,
/// several IPs in quick succession) so the risk engine has something to
/// say about both.
async fn replay_sample_sessions(
    tracker: &IdentityTracker<InMemoryKvStore>,
) -> Result<(), Box<dyn std::error::Error>> {
    let now = Utc::now();

    tracker
        .record_connection(
            "bob",
            "10.0.0.5",
            "fp-bob-laptop",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7)",
            now - Duration::hours(2),
        )
        .await?;

    let alice_ips = ["203.0.113.10", "203.0.113.11", "203.0.113.12", "203.0.113.13"];
    for (i, ip) in alice_ips.iter().enumerate() {
        let t: DateTime<Utc> = now - Duration::seconds(30 - i as i64 * 10);
        tracker
            .record_connection("alice", ip, "fp-alice-phone", "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0)", t)
            .await?;
    }
    tracker
        .record_connection(
            "alice",
            "198.51.100.20",
            "fp-alice-burner",
            "curl/8.4.0",
            now,
        )
        .await?;

    Ok(())
}
