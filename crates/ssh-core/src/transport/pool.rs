use std::{collections::HashMap, sync::Arc, time::Duration};

use secrecy::SecretString;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use xssh_types::Host;

use super::traits::{Connector, Transport};

type Result<T> = crate::SshResult<T>;

type Slot = Arc<Mutex<Option<Arc<dyn Transport>>>>;

/// Shares one transport per `user@host:port`.
///
/// Each key has its own slot lock, so dialing one host never blocks sessions
/// that target another.
pub struct TransportPool {
    connector: Arc<dyn Connector>,
    slots: Mutex<HashMap<String, Slot>>,
    liveness_timeout: Duration,
}

impl TransportPool {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self::with_liveness_timeout(connector, Duration::from_secs(10))
    }

    /// A cached transport that does not answer a liveness check within `liveness_timeout`
    /// is treated as dead and replaced.
    pub fn with_liveness_timeout(connector: Arc<dyn Connector>, liveness_timeout: Duration) -> Self {
        Self {
            connector,
            slots: Mutex::new(HashMap::new()),
            liveness_timeout,
        }
    }

    /// Return a live transport for `host`, dialing a new one if needed.
    pub async fn get(&self, host: &Host, credential: Option<&SecretString>) -> Result<Arc<dyn Transport>> {
        let key = host.transport_key();
        let slot = self.slot(&key).await;
        let mut cached = slot.lock().await;

        if let Some(existing) = cached.as_ref() {
            let alive = matches!(tokio::time::timeout(self.liveness_timeout, existing.probe()).await, Ok(true));
            if alive {
                debug!(transport = %key, "reusing pooled transport");
                return Ok(existing.clone());
            }
            warn!(transport = %key, "pooled transport failed liveness check; reconnecting");
            if let Some(stale) = cached.take() {
                stale.close().await;
            }
        }

        match self.connector.connect(host, credential).await {
            Ok(fresh) => {
                info!(transport = %key, "transport established");
                *cached = Some(fresh.clone());
                Ok(fresh)
            }
            Err(err) => {
                drop(cached);
                self.discard_empty(&key, &slot).await;
                Err(err)
            }
        }
    }

    /// Number of cached transports.
    pub async fn len(&self) -> usize {
        let slots: Vec<Slot> = self.slots.lock().await.values().cloned().collect();
        let mut count = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                count += 1;
            }
        }
        count
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Close and forget every cached transport.
    pub async fn close_all(&self) {
        let drained: Vec<(String, Slot)> = self.slots.lock().await.drain().collect();
        for (key, slot) in drained {
            if let Some(transport) = slot.lock().await.take() {
                debug!(transport = %key, "closing pooled transport");
                transport.close().await;
            }
        }
    }

    /// Drop `slot` from the map if it is still empty and nobody else is waiting on it.
    async fn discard_empty(&self, key: &str, slot: &Slot) {
        let mut slots = self.slots.lock().await;
        let Some(current) = slots.get(key) else {
            return;
        };
        // One reference from the map, one held by the caller.
        if !Arc::ptr_eq(current, slot) || Arc::strong_count(slot) > 2 {
            return;
        }
        if slot.try_lock().is_ok_and(|guard| guard.is_none()) {
            slots.remove(key);
        }
    }

    async fn slot(&self, key: &str) -> Slot {
        let mut slots = self.slots.lock().await;
        slots.entry(key.to_string()).or_default().clone()
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
