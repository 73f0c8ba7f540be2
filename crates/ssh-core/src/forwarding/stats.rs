use std::{
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicI64, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use chrono::{DateTime, TimeZone, Utc};
use xssh_types::StatsSnapshot;

/// Live traffic counters for one forwarding session.
///
/// Byte and connection counters are plain atomics so connection handlers can
/// update them without locking. Only `last_error` sits behind a mutex, and it
/// is touched on failures alone.
#[derive(Debug)]
pub struct ForwardingStats {
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
    connection_count: AtomicU64,
    active_connections: AtomicI64,
    error_count: AtomicU64,
    /// Unix milliseconds of the last write, 0 when nothing moved yet.
    last_activity_ms: AtomicI64,
    last_error: Mutex<Option<String>>,
    start_time: DateTime<Utc>,
    started: Instant,
}

impl Default for ForwardingStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ForwardingStats {
    pub fn new() -> Self {
        Self {
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            connection_count: AtomicU64::new(0),
            active_connections: AtomicI64::new(0),
            error_count: AtomicU64::new(0),
            last_activity_ms: AtomicI64::new(0),
            last_error: Mutex::new(None),
            start_time: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Bytes written toward the local side (out of the tunnel).
    pub fn add_bytes_received(&self, bytes: u64) {
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
        self.touch();
    }

    /// Bytes written into the tunnel.
    pub fn add_bytes_sent(&self, bytes: u64) {
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
        self.touch();
    }

    /// Count a new connection; it stays active until the guard is dropped.
    pub fn track_connection(&self) -> ConnectionGuard<'_> {
        self.connection_count.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::AcqRel);
        ConnectionGuard { stats: self }
    }

    pub fn record_error(&self, message: impl Into<String>) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.into());
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn connection_count(&self) -> u64 {
        self.connection_count.load(Ordering::Relaxed)
    }

    pub fn active_connections(&self) -> i64 {
        self.active_connections.load(Ordering::Acquire)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        match self.last_activity_ms.load(Ordering::Relaxed) {
            0 => None,
            millis => Utc.timestamp_millis_opt(millis).single(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Average `(received/s, sent/s)` since the session started.
    pub fn transfer_rate(&self) -> (f64, f64) {
        let secs = self.uptime().as_secs_f64();
        if secs == 0.0 {
            return (0.0, 0.0);
        }
        (self.bytes_received() as f64 / secs, self.bytes_sent() as f64 / secs)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            bytes_received: self.bytes_received(),
            bytes_sent: self.bytes_sent(),
            connection_count: self.connection_count(),
            active_connections: self.active_connections(),
            start_time: self.start_time,
            last_activity: self.last_activity(),
            error_count: self.error_count(),
            last_error: self.last_error(),
        }
    }

    fn touch(&self) {
        self.last_activity_ms.store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }
}

/// Marks one connection active for as long as it lives.
#[must_use = "the connection is counted as active only while the guard is held"]
pub struct ConnectionGuard<'a> {
    stats: &'a ForwardingStats,
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        self.stats.active_connections.fetch_sub(1, Ordering::AcqRel);
    }
}
