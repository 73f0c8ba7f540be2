//! Unit tests for forwarding rule and snapshot types.

use chrono::Duration;

use super::*;

#[test]
fn constructors_fill_description_and_unique_ids() {
    let a = ForwardingRule::local("127.0.0.1", 8080, "db.internal", 5432);
    let b = ForwardingRule::local("127.0.0.1", 8080, "db.internal", 5432);
    assert_ne!(a.id, b.id);
    assert!(a.id.starts_with("fwd-"));
    assert_eq!(a.description, "Local 8080 -> db.internal:5432");

    let remote = ForwardingRule::remote("127.0.0.1", 9000, "localhost", 80);
    assert_eq!(remote.kind, ForwardType::Remote);
    assert_eq!(remote.remote_endpoint(), "localhost:80");

    let socks = ForwardingRule::dynamic("127.0.0.1", 1080).with_id("proxy");
    assert_eq!(socks.id, "proxy");
    assert_eq!(socks.description, "SOCKS proxy on port 1080");
}

#[test]
fn rule_survives_json_persistence() {
    let rule = ForwardingRule::remote("127.0.0.1", 9000, "0.0.0.0", 9001).with_description("staging hook");
    let json = serde_json::to_string(&rule).unwrap();
    let back: ForwardingRule = serde_json::from_str(&json).unwrap();
    assert_eq!(back, rule);
}

#[test]
fn throughput_divides_by_elapsed_seconds() {
    let start = Utc::now();
    let snapshot = StatsSnapshot {
        bytes_received: 4000,
        bytes_sent: 1000,
        connection_count: 3,
        active_connections: 1,
        start_time: start,
        last_activity: None,
        error_count: 0,
        last_error: None,
    };
    let (rx, tx) = snapshot.throughput(start + Duration::seconds(4));
    assert_eq!(rx, 1000.0);
    assert_eq!(tx, 250.0);
    assert_eq!(snapshot.throughput(start), (0.0, 0.0));
}
