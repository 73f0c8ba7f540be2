//! Plain-text rendering of session statistics for the foreground monitor.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use xssh_types::{ForwardType, ForwardingRule, StatsSnapshot};

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;

/// One session's status block: rule, uptime, connections, traffic, errors.
pub fn session_report(rule: &ForwardingRule, stats: &StatsSnapshot, now: DateTime<Utc>) -> String {
    let mut out = match rule.kind {
        ForwardType::Local => format!(
            "{} ({}): {} -> {}",
            rule.id,
            rule.kind,
            rule.local_endpoint(),
            rule.remote_endpoint()
        ),
        ForwardType::Remote => format!(
            "{} ({}): remote {} -> {}",
            rule.id,
            rule.kind,
            rule.remote_endpoint(),
            rule.local_endpoint()
        ),
        ForwardType::Dynamic => format!("{} ({}): SOCKS5 on {}", rule.id, rule.kind, rule.local_endpoint()),
    };
    if !rule.description.is_empty() {
        let _ = write!(out, " [{}]", rule.description);
    }

    let _ = write!(
        out,
        "\n  uptime {} | connections: {} active, {} total",
        format_uptime(stats.elapsed_secs(now)),
        stats.active_connections,
        stats.connection_count
    );

    if stats.bytes_received > 0 || stats.bytes_sent > 0 {
        let (rx_rate, tx_rate) = stats.throughput(now);
        let _ = write!(
            out,
            "\n  traffic: down {:.1}KB ({:.1}KB/s) up {:.1}KB ({:.1}KB/s)",
            stats.bytes_received as f64 / KIB,
            rx_rate / KIB,
            stats.bytes_sent as f64 / KIB,
            tx_rate / KIB
        );
    }

    if stats.error_count > 0 {
        let _ = write!(
            out,
            "\n  errors: {} (last: {})",
            stats.error_count,
            stats.last_error.as_deref().unwrap_or("unknown")
        );
    }
    out
}

/// Totals across all sessions.
pub fn summary(stats: &[StatsSnapshot]) -> String {
    let connections: u64 = stats.iter().map(|s| s.connection_count).sum();
    let bytes: u64 = stats.iter().map(|s| s.bytes_received + s.bytes_sent).sum();
    let errors: u64 = stats.iter().map(|s| s.error_count).sum();
    format!(
        "{} sessions | {} total connections | {:.1} MB transferred | {} errors",
        stats.len(),
        connections,
        bytes as f64 / MIB,
        errors
    )
}

/// Whole seconds as `1h2m3s`, `4m5s`, or `6s`.
pub fn format_uptime(secs: f64) -> String {
    let total = secs.round().max(0.0) as u64;
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}
