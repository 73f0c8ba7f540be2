use std::{
    net::SocketAddr,
    sync::{
        Arc, Mutex, OnceLock, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
    sync::oneshot,
    task::JoinHandle,
};
use tracing::{debug, warn};
use xssh_types::{ForwardingRule, StatsSnapshot};

use super::{pump::pump, stats::ForwardingStats};
use crate::{
    SshCoreError, SshResult,
    transport::{RemoteBinding, Transport},
};

/// One running forwarding rule: its acceptor, its counters, and its stop signal.
///
/// Sessions are created and torn down by
/// [`ForwardingManager`](super::ForwardingManager); callers only read them.
pub struct ForwardingSession {
    rule: ForwardingRule,
    stats: ForwardingStats,
    active: AtomicBool,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    acceptor: Mutex<Option<JoinHandle<()>>>,
    remote: Mutex<Option<(Arc<dyn Transport>, RemoteBinding)>>,
    local_addr: OnceLock<SocketAddr>,
}

impl ForwardingSession {
    pub(super) fn new(rule: ForwardingRule) -> (Arc<Self>, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let session = Arc::new(Self {
            rule,
            stats: ForwardingStats::new(),
            active: AtomicBool::new(false),
            shutdown: Mutex::new(Some(tx)),
            acceptor: Mutex::new(None),
            remote: Mutex::new(None),
            local_addr: OnceLock::new(),
        });
        (session, rx)
    }

    pub fn id(&self) -> &str {
        &self.rule.id
    }

    pub fn rule(&self) -> &ForwardingRule {
        &self.rule
    }

    pub fn stats(&self) -> &ForwardingStats {
        &self.stats
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Address the local listener actually bound. `None` for remote forwards.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    pub fn uptime(&self) -> Duration {
        self.stats.uptime()
    }

    /// Average `(received/s, sent/s)` since the session started.
    pub fn transfer_rate(&self) -> (f64, f64) {
        self.stats.transfer_rate()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Mark the session running, unless it was stopped while starting.
    pub(super) fn activate(&self) -> bool {
        let pending = lock(&self.shutdown);
        if pending.is_some() {
            self.active.store(true, Ordering::Release);
            true
        } else {
            false
        }
    }

    pub(super) fn set_local_addr(&self, addr: SocketAddr) {
        let _ = self.local_addr.set(addr);
    }

    pub(super) fn attach_acceptor(&self, handle: JoinHandle<()>) {
        *lock(&self.acceptor) = Some(handle);
    }

    /// Remember a remote binding so stop can cancel it.
    ///
    /// A binding that arrives after the session was already stopped is
    /// cancelled right away.
    pub(super) async fn attach_remote(&self, transport: Arc<dyn Transport>, binding: RemoteBinding) {
        let stopped = {
            let pending = lock(&self.shutdown);
            if pending.is_some() {
                *lock(&self.remote) = Some((transport.clone(), binding.clone()));
            }
            pending.is_none()
        };
        if stopped {
            cancel_remote(transport.as_ref(), &binding).await;
        }
    }

    /// Record a runtime failure unless the session is already shutting down.
    ///
    /// Failures seen while the session is still starting are counted.
    pub(super) fn record_failure(&self, message: impl Into<String>) {
        if lock(&self.shutdown).is_some() {
            let message = message.into();
            warn!(id = %self.rule.id, error = %message, "forwarding connection failed");
            self.stats.record_error(message);
        }
    }

    /// Pump one connection through the tunnel, accounting traffic to this session.
    pub(super) async fn relay<L, T>(&self, local: L, tunnel: T)
    where
        L: AsyncRead + AsyncWrite,
        T: AsyncRead + AsyncWrite,
    {
        let outcome = pump(
            local,
            tunnel,
            |n| self.stats.add_bytes_sent(n),
            |n| self.stats.add_bytes_received(n),
        )
        .await;
        match outcome.result {
            Ok(bytes) => debug!(id = %self.rule.id, direction = %outcome.direction, bytes, "connection closed"),
            Err(err) => self.record_failure(format!("copy {} failed: {err}", outcome.direction)),
        }
    }

    /// Stop accepting, cancel any remote binding, and wait for the acceptor to exit.
    ///
    /// Only the first call fires the shutdown signal; later calls are no-ops.
    pub(super) async fn shutdown(&self) {
        self.active.store(false, Ordering::Release);
        let remote = {
            let mut pending = lock(&self.shutdown);
            if let Some(tx) = pending.take() {
                let _ = tx.send(());
            }
            lock(&self.remote).take()
        };
        if let Some((transport, binding)) = remote {
            cancel_remote(transport.as_ref(), &binding).await;
        }
        let acceptor = lock(&self.acceptor).take();
        if let Some(handle) = acceptor
            && let Err(err) = handle.await
            && err.is_panic()
        {
            warn!(id = %self.rule.id, ?err, "forwarding acceptor panicked");
        }
    }
}

impl std::fmt::Debug for ForwardingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardingSession")
            .field("rule", &self.rule)
            .field("active", &self.is_active())
            .field("local_addr", &self.local_addr())
            .finish_non_exhaustive()
    }
}

/// Bind a local listener, mapping failures to [`SshCoreError::BindFailed`].
pub(super) async fn bind_local(host: &str, port: u16) -> SshResult<TcpListener> {
    TcpListener::bind((host, port))
        .await
        .map_err(|source| SshCoreError::BindFailed {
            address: format!("{host}:{port}"),
            source,
        })
}

async fn cancel_remote(transport: &dyn Transport, binding: &RemoteBinding) {
    if let Err(err) = transport.close_listener(binding).await {
        warn!(%binding, ?err, "failed to cancel remote listener");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
