//! Tunables for transports and forwarding sessions.

use std::time::Duration;

/// Buffer used by each direction of the stream pump.
pub const PUMP_BUFFER_SIZE: usize = 32 * 1024;

/// Settings applied when dialing and authenticating a new transport.
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// Upper bound for TCP connect, key exchange, and authentication combined.
    pub connect_timeout: Duration,
    /// Interval between keepalive probes sent by the SSH layer.
    pub keepalive_interval: Option<Duration>,
    /// Disconnect after this many unanswered keepalives.
    pub keepalive_max: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_max: 3,
        }
    }
}

/// Settings for the session acceptors.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// How long a local accept may block before the loop re-checks for shutdown.
    pub accept_poll_interval: Duration,
    /// Longest a pooled transport may take to answer a liveness check before it is replaced.
    pub liveness_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            accept_poll_interval: Duration::from_secs(1),
            liveness_timeout: Duration::from_secs(10),
        }
    }
}
