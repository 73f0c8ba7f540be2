//! Unit tests for transport pooling.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use secrecy::SecretString;
use xssh_types::Host;

use super::*;
use crate::{
    SshCoreError, SshResult,
    transport::{ForwardStream, RemoteBinding, RemoteListener},
};

struct FlakyTransport {
    alive: AtomicBool,
    // Liveness checks never complete, like a peer that stopped answering.
    hung: AtomicBool,
    closed: AtomicBool,
}

#[async_trait]
impl Transport for FlakyTransport {
    async fn dial(&self, _host: &str, _port: u16, _origin: Option<SocketAddr>) -> SshResult<ForwardStream> {
        Err(SshCoreError::Other("not used".into()))
    }

    async fn listen(&self, _host: &str, _port: u16) -> SshResult<RemoteListener> {
        Err(SshCoreError::Other("not used".into()))
    }

    async fn close_listener(&self, _binding: &RemoteBinding) -> SshResult<()> {
        Ok(())
    }

    async fn probe(&self) -> bool {
        if self.hung.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct CountingConnector {
    created: AtomicUsize,
    last: std::sync::Mutex<Option<Arc<FlakyTransport>>>,
}

#[async_trait]
impl Connector for CountingConnector {
    async fn connect(&self, _host: &Host, _credential: Option<&SecretString>) -> SshResult<Arc<dyn Transport>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let transport = Arc::new(FlakyTransport {
            alive: AtomicBool::new(true),
            hung: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        *self.last.lock().unwrap() = Some(transport.clone());
        Ok(transport)
    }
}

struct RefusingConnector;

#[async_trait]
impl Connector for RefusingConnector {
    async fn connect(&self, host: &Host, _credential: Option<&SecretString>) -> SshResult<Arc<dyn Transport>> {
        Err(SshCoreError::AuthFailed {
            target: host.transport_key(),
            message: "denied".into(),
        })
    }
}

#[tokio::test]
async fn same_target_reuses_one_transport() {
    let connector = Arc::new(CountingConnector::default());
    let pool = TransportPool::new(connector.clone());
    let host = Host::new("web", "10.0.0.1", "ops", 22);

    let first = pool.get(&host, None).await.unwrap();
    let second = pool.get(&host, None).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(connector.created.load(Ordering::SeqCst), 1);
    assert_eq!(pool.len().await, 1);
}

#[tokio::test]
async fn different_users_get_separate_transports() {
    let connector = Arc::new(CountingConnector::default());
    let pool = TransportPool::new(connector.clone());

    pool.get(&Host::new("a", "10.0.0.1", "ops", 22), None).await.unwrap();
    pool.get(&Host::new("b", "10.0.0.1", "root", 22), None).await.unwrap();

    assert_eq!(connector.created.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn dead_transport_is_evicted_and_replaced() {
    let connector = Arc::new(CountingConnector::default());
    let pool = TransportPool::new(connector.clone());
    let host = Host::new("web", "10.0.0.1", "ops", 22);

    pool.get(&host, None).await.unwrap();
    let stale = connector.last.lock().unwrap().clone().unwrap();
    stale.alive.store(false, Ordering::SeqCst);

    pool.get(&host, None).await.unwrap();
    assert_eq!(connector.created.load(Ordering::SeqCst), 2);
    assert!(stale.closed.load(Ordering::SeqCst), "stale transport should be closed by the pool");
}

#[tokio::test]
async fn unresponsive_transport_is_replaced_after_timeout() {
    let connector = Arc::new(CountingConnector::default());
    let pool = TransportPool::with_liveness_timeout(connector.clone(), Duration::from_millis(50));
    let host = Host::new("web", "10.0.0.1", "ops", 22);

    let first = pool.get(&host, None).await.unwrap();
    let stale = connector.last.lock().unwrap().clone().unwrap();
    stale.hung.store(true, Ordering::SeqCst);

    let second = tokio::time::timeout(Duration::from_secs(2), pool.get(&host, None))
        .await
        .expect("get must not wait on a hung transport")
        .unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(connector.created.load(Ordering::SeqCst), 2);
    assert!(stale.closed.load(Ordering::SeqCst));
    assert_eq!(pool.len().await, 1);
}

#[tokio::test]
async fn connect_failure_leaves_pool_empty() {
    let pool = TransportPool::new(Arc::new(RefusingConnector));
    let host = Host::new("web", "10.0.0.1", "ops", 22);

    let err = pool.get(&host, None).await.err().expect("connect should fail");
    assert!(matches!(err, SshCoreError::AuthFailed { .. }));
    assert!(pool.is_empty().await);
    assert!(pool.slots.lock().await.is_empty(), "failed connect must not leave an empty slot behind");

    for port in 2200..2210 {
        let _ = pool.get(&Host::new("web", "10.0.0.1", "ops", port), None).await;
    }
    assert!(pool.slots.lock().await.is_empty());
}

#[tokio::test]
async fn close_all_closes_cached_transports() {
    let connector = Arc::new(CountingConnector::default());
    let pool = TransportPool::new(connector.clone());
    pool.get(&Host::new("web", "10.0.0.1", "ops", 22), None).await.unwrap();
    let transport = connector.last.lock().unwrap().clone().unwrap();

    pool.close_all().await;

    assert!(transport.closed.load(Ordering::SeqCst));
    assert!(pool.is_empty().await);
}
