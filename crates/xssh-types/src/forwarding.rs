//! Forwarding rule and statistics records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kind of port forward, mirroring OpenSSH's `-L`, `-R`, and `-D`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ForwardType {
    /// Local listener forwarded to a fixed target through the tunnel.
    Local,
    /// Listener on the remote side forwarded back to a fixed local target.
    Remote,
    /// Local SOCKS5 proxy; the target is chosen per connection.
    Dynamic,
}

impl fmt::Display for ForwardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ForwardType::Local => "Local",
            ForwardType::Remote => "Remote",
            ForwardType::Dynamic => "Dynamic",
        };
        f.write_str(label)
    }
}

/// A single forwarding directive. Treated as immutable once its session runs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingRule {
    /// Registry key; must be unique among running sessions.
    pub id: String,
    pub kind: ForwardType,
    pub local_host: String,
    pub local_port: u16,
    /// Unused for [`ForwardType::Dynamic`].
    #[serde(default)]
    pub remote_host: String,
    #[serde(default)]
    pub remote_port: u16,
    #[serde(default)]
    pub description: String,
}

impl ForwardingRule {
    /// Local forward: `local_host:local_port` -> `remote_host:remote_port` via the tunnel.
    pub fn local(local_host: impl Into<String>, local_port: u16, remote_host: impl Into<String>, remote_port: u16) -> Self {
        let remote_host = remote_host.into();
        Self {
            id: generate_id(),
            kind: ForwardType::Local,
            local_host: local_host.into(),
            local_port,
            description: format!("Local {local_port} -> {remote_host}:{remote_port}"),
            remote_host,
            remote_port,
        }
    }

    /// Remote forward: the server listens on `remote_host:remote_port` and connections
    /// come back to `local_host:local_port`.
    pub fn remote(local_host: impl Into<String>, local_port: u16, remote_host: impl Into<String>, remote_port: u16) -> Self {
        let remote_host = remote_host.into();
        Self {
            id: generate_id(),
            kind: ForwardType::Remote,
            local_host: local_host.into(),
            local_port,
            description: format!("Remote {local_port} -> {remote_host}:{remote_port}"),
            remote_host,
            remote_port,
        }
    }

    /// Dynamic forward: SOCKS5 proxy on `local_host:local_port`.
    pub fn dynamic(local_host: impl Into<String>, local_port: u16) -> Self {
        Self {
            id: generate_id(),
            kind: ForwardType::Dynamic,
            local_host: local_host.into(),
            local_port,
            remote_host: String::new(),
            remote_port: 0,
            description: format!("SOCKS proxy on port {local_port}"),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn local_endpoint(&self) -> String {
        format!("{}:{}", self.local_host, self.local_port)
    }

    pub fn remote_endpoint(&self) -> String {
        format!("{}:{}", self.remote_host, self.remote_port)
    }
}

fn generate_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("fwd-{}", &id[..12])
}

/// Point-in-time copy of a session's traffic counters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub connection_count: u64,
    pub active_connections: i64,
    pub start_time: DateTime<Utc>,
    pub last_activity: Option<DateTime<Utc>>,
    pub error_count: u64,
    pub last_error: Option<String>,
}

impl StatsSnapshot {
    /// Seconds elapsed between `start_time` and `now`, never negative.
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> f64 {
        let millis = (now - self.start_time).num_milliseconds().max(0);
        millis as f64 / 1000.0
    }

    /// Average throughput as `(received/s, sent/s)`; zero before any time has elapsed.
    pub fn throughput(&self, now: DateTime<Utc>) -> (f64, f64) {
        let elapsed = self.elapsed_secs(now);
        if elapsed <= 0.0 {
            return (0.0, 0.0);
        }
        (self.bytes_received as f64 / elapsed, self.bytes_sent as f64 / elapsed)
    }
}

#[cfg(test)]
#[path = "forwarding_tests.rs"]
mod tests;
