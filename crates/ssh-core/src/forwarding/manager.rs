use std::{collections::HashMap, sync::Arc};

use secrecy::SecretString;
use tokio::sync::{RwLock, oneshot};
use tracing::{info, warn};
use xssh_types::{ForwardType, ForwardingRule, Host};

use super::{dynamic, local, remote, session::ForwardingSession};
use crate::{
    SshCoreError,
    config::{EngineConfig, TransportConfig},
    transport::{Connector, RusshConnector, TransportPool},
};

type Result<T> = crate::SshResult<T>;

struct ManagerState {
    sessions: RwLock<HashMap<String, Arc<ForwardingSession>>>,
    pool: TransportPool,
    engine: EngineConfig,
}

/// Registry of running forwarding sessions and the transports they share.
///
/// Cloning is cheap; every clone drives the same registry.
#[derive(Clone)]
pub struct ForwardingManager {
    state: Arc<ManagerState>,
}

impl ForwardingManager {
    /// Manager that dials real SSH transports.
    pub fn new(config: TransportConfig) -> Self {
        Self::with_connector(Arc::new(RusshConnector::new(config)), EngineConfig::default())
    }

    /// Manager backed by a custom transport connector.
    pub fn with_connector(connector: Arc<dyn Connector>, engine: EngineConfig) -> Self {
        Self {
            state: Arc::new(ManagerState {
                sessions: RwLock::new(HashMap::new()),
                pool: TransportPool::with_liveness_timeout(connector, engine.liveness_timeout),
                engine,
            }),
        }
    }

    /// Start forwarding `rule` through a transport to `host`.
    ///
    /// Returns once the listener is up; traffic is handled in background
    /// tasks. A failed start leaves nothing registered.
    pub async fn start_forwarding(&self, rule: ForwardingRule, host: &Host, credential: Option<&SecretString>) -> Result<()> {
        validate_rule(&rule)?;
        let id = rule.id.clone();
        let (session, shutdown) = ForwardingSession::new(rule);

        {
            let mut sessions = self.state.sessions.write().await;
            if sessions.contains_key(&id) {
                return Err(SshCoreError::SessionExists(id));
            }
            sessions.insert(id.clone(), session.clone());
        }

        if let Err(err) = self.launch(&session, host, credential, shutdown).await {
            {
                let mut sessions = self.state.sessions.write().await;
                if sessions.get(&id).is_some_and(|current| Arc::ptr_eq(current, &session)) {
                    sessions.remove(&id);
                }
            }
            session.shutdown().await;
            warn!(%id, error = %err, "failed to start forwarding");
            return Err(err);
        }

        if session.activate() {
            info!(%id, kind = %session.rule().kind, description = %session.rule().description, "forwarding started");
        }
        Ok(())
    }

    async fn launch(
        &self,
        session: &Arc<ForwardingSession>,
        host: &Host,
        credential: Option<&SecretString>,
        shutdown: oneshot::Receiver<()>,
    ) -> Result<()> {
        let transport = self.state.pool.get(host, credential).await?;
        let poll = self.state.engine.accept_poll_interval;
        match session.rule().kind {
            ForwardType::Local => local::start(session, transport, shutdown, poll).await,
            ForwardType::Remote => remote::start(session, transport, shutdown).await,
            ForwardType::Dynamic => dynamic::start(session, transport, shutdown, poll).await,
        }
    }

    /// Stop the session registered under `id` and wait for its acceptor to exit.
    ///
    /// The session leaves the registry before it is signalled, so a second
    /// stop for the same id reports [`SshCoreError::SessionNotFound`].
    pub async fn stop_forwarding(&self, id: &str) -> Result<()> {
        let session = self
            .state
            .sessions
            .write()
            .await
            .remove(id)
            .ok_or_else(|| SshCoreError::SessionNotFound(id.to_string()))?;
        session.shutdown().await;
        info!(%id, "forwarding stopped");
        Ok(())
    }

    pub async fn get_session(&self, id: &str) -> Option<Arc<ForwardingSession>> {
        self.state.sessions.read().await.get(id).cloned()
    }

    /// All registered sessions, oldest first.
    pub async fn get_all_sessions(&self) -> Vec<Arc<ForwardingSession>> {
        let mut sessions: Vec<_> = self.state.sessions.read().await.values().cloned().collect();
        sessions.sort_by(|a, b| {
            a.stats()
                .start_time()
                .cmp(&b.stats().start_time())
                .then_with(|| a.id().cmp(b.id()))
        });
        sessions
    }

    pub async fn session_count(&self) -> usize {
        self.state.sessions.read().await.len()
    }

    /// Number of live pooled transports.
    pub async fn transport_count(&self) -> usize {
        self.state.pool.len().await
    }

    /// Stop every registered session.
    pub async fn stop_all(&self) {
        let drained: Vec<_> = self.state.sessions.write().await.drain().collect();
        for (id, session) in drained {
            session.shutdown().await;
            info!(%id, "forwarding stopped");
        }
    }

    /// Stop every session and close all pooled transports.
    pub async fn shutdown(&self) {
        self.stop_all().await;
        self.state.pool.close_all().await;
    }
}

fn validate_rule(rule: &ForwardingRule) -> Result<()> {
    if rule.id.trim().is_empty() {
        return Err(SshCoreError::empty("rule id"));
    }
    if rule.local_host.trim().is_empty() {
        return Err(SshCoreError::empty("local host"));
    }
    match rule.kind {
        ForwardType::Local => {
            if rule.remote_host.trim().is_empty() {
                return Err(SshCoreError::empty("remote host"));
            }
            if rule.remote_port == 0 {
                return Err(SshCoreError::invalid_forward("local", "target port must not be 0"));
            }
        }
        ForwardType::Remote => {
            if rule.local_port == 0 {
                return Err(SshCoreError::invalid_forward("remote", "local target port must not be 0"));
            }
        }
        ForwardType::Dynamic => {}
    }
    Ok(())
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
