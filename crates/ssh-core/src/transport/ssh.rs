use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use russh::{
    Channel, Disconnect,
    client::{self, DisconnectReason, Handle, Msg, Session},
    keys::{HashAlg, PrivateKeyWithHashAlg, PublicKey},
};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, info, warn};
use xssh_types::Host;

use super::traits::{Connector, ForwardStream, InboundStream, RemoteBinding, RemoteListener, Transport};
use crate::{SshCoreError, config::TransportConfig, keys::load_identity};

type Result<T> = crate::SshResult<T>;

type RouteSender = mpsc::UnboundedSender<InboundStream>;

struct Route {
    binding: RemoteBinding,
    sender: RouteSender,
}

type Routes = Arc<Mutex<Vec<Route>>>;

/// Add a route for a listener whose forwarding request is still in flight.
async fn register_route(routes: &Routes, binding: RemoteBinding) -> (RouteSender, mpsc::UnboundedReceiver<InboundStream>) {
    let (sender, incoming) = mpsc::unbounded_channel();
    routes.lock().await.push(Route {
        binding,
        sender: sender.clone(),
    });
    (sender, incoming)
}

/// Record the port the server assigned (0 keeps the requested one) and return the final binding.
async fn settle_route(routes: &Routes, sender: &RouteSender, assigned: u32) -> Option<RemoteBinding> {
    let mut routes = routes.lock().await;
    let route = routes.iter_mut().find(|route| route.sender.same_channel(sender))?;
    if assigned != 0 {
        route.binding.port = assigned;
    }
    Some(route.binding.clone())
}

async fn forget_route(routes: &Routes, sender: &RouteSender) {
    routes.lock().await.retain(|route| !route.sender.same_channel(sender));
}

async fn route_for(routes: &Routes, address: &str, port: u32) -> Option<RouteSender> {
    let routes = routes.lock().await;
    routes
        .iter()
        .find(|route| route.binding.matches(address, port))
        .map(|route| route.sender.clone())
}

/// Forget every route. Dropping the senders ends each listener's accept loop.
async fn drop_routes(routes: &Routes) -> usize {
    let mut routes = routes.lock().await;
    let count = routes.len();
    routes.clear();
    count
}

/// russh client handler: permissive host keys, routes forwarded channels to listeners.
#[derive(Clone)]
struct TunnelHandler {
    authority: String,
    routes: Routes,
}

impl client::Handler for TunnelHandler {
    type Error = SshCoreError;

    fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> impl Future<Output = std::result::Result<bool, Self::Error>> + Send {
        let authority = self.authority.clone();
        let fingerprint = server_public_key.fingerprint(HashAlg::Sha256).to_string();
        async move {
            // Host keys are not verified; see DESIGN.md.
            warn!(target = %authority, %fingerprint, "accepting server host key without verification");
            Ok(true)
        }
    }

    fn server_channel_open_forwarded_tcpip(
        &mut self,
        channel: Channel<Msg>,
        connected_address: &str,
        connected_port: u32,
        originator_address: &str,
        originator_port: u32,
        _session: &mut Session,
    ) -> impl Future<Output = std::result::Result<(), Self::Error>> + Send {
        let routes = self.routes.clone();
        let connected_address = connected_address.to_string();
        let origin = format!("{originator_address}:{originator_port}");
        async move {
            match route_for(&routes, &connected_address, connected_port).await {
                Some(sender) => {
                    debug!(remote = %format!("{connected_address}:{connected_port}"), %origin, "inbound forwarded connection");
                    let inbound = InboundStream {
                        stream: Box::new(channel.into_stream()),
                        origin,
                    };
                    if sender.send(inbound).is_err() {
                        debug!(port = connected_port, "remote listener went away; dropping channel");
                    }
                }
                None => {
                    warn!(
                        address = %connected_address,
                        port = connected_port,
                        "received forwarded-tcpip with no matching remote listener"
                    );
                    let _ = channel.close().await;
                }
            }
            Ok(())
        }
    }

    fn disconnected(
        &mut self,
        reason: DisconnectReason<Self::Error>,
    ) -> impl Future<Output = std::result::Result<(), Self::Error>> + Send {
        let authority = self.authority.clone();
        let routes = self.routes.clone();
        async move {
            let dropped = drop_routes(&routes).await;
            match reason {
                DisconnectReason::ReceivedDisconnect(info) => {
                    info!(transport = %authority, reason = ?info.reason_code, message = %info.message, listeners = dropped, "server closed the connection");
                }
                DisconnectReason::Error(err) => {
                    warn!(transport = %authority, error = %err, listeners = dropped, "connection lost");
                }
            }
            Ok(())
        }
    }
}

/// [`Transport`] backed by a russh client connection.
pub struct SshTransport {
    authority: String,
    // Write access is only taken for global forwarding requests.
    handle: RwLock<Handle<TunnelHandler>>,
    routes: Routes,
    ping_timeout: Duration,
}

#[async_trait]
impl Transport for SshTransport {
    async fn dial(&self, target_host: &str, target_port: u16, origin: Option<SocketAddr>) -> Result<ForwardStream> {
        let (origin_host, origin_port) = origin
            .map(|addr| (addr.ip().to_string(), addr.port()))
            .unwrap_or_else(|| ("127.0.0.1".to_string(), 0));
        let handle = self.handle.read().await;
        let channel = handle
            .channel_open_direct_tcpip(target_host.to_string(), target_port.into(), origin_host, origin_port.into())
            .await?;
        Ok(Box::new(channel.into_stream()))
    }

    async fn listen(&self, bind_host: &str, bind_port: u16) -> Result<RemoteListener> {
        // The server may open channels as soon as it accepts the request, so the route goes in first.
        let requested_binding = RemoteBinding {
            address: bind_host.to_string(),
            port: bind_port.into(),
        };
        let (sender, incoming) = register_route(&self.routes, requested_binding.clone()).await;
        let requested = {
            let mut handle = self.handle.write().await;
            handle.tcpip_forward(bind_host.to_string(), bind_port.into()).await
        };
        let assigned = match requested {
            Ok(assigned) => assigned,
            Err(err) => {
                forget_route(&self.routes, &sender).await;
                return Err(err.into());
            }
        };

        // Gone only if the connection dropped while the request was in flight.
        let Some(binding) = settle_route(&self.routes, &sender, assigned).await else {
            return Err(SshCoreError::ListenerClosed(requested_binding.to_string()));
        };
        info!(transport = %self.authority, bind = %binding, "remote listener registered");
        Ok(RemoteListener::new(binding, incoming))
    }

    async fn close_listener(&self, binding: &RemoteBinding) -> Result<()> {
        // Dropping the route's sender ends the listener's accept loop.
        self.routes.lock().await.retain(|route| &route.binding != binding);
        let handle = self.handle.write().await;
        handle.cancel_tcpip_forward(binding.address.clone(), binding.port).await?;
        debug!(transport = %self.authority, bind = %binding, "remote listener cancelled");
        Ok(())
    }

    async fn probe(&self) -> bool {
        let handle = self.handle.read().await;
        if handle.is_closed() {
            return false;
        }
        // send_ping resolves only once the server answers.
        matches!(tokio::time::timeout(self.ping_timeout, handle.send_ping()).await, Ok(Ok(())))
    }

    async fn close(&self) {
        self.routes.lock().await.clear();
        let handle = self.handle.read().await;
        if let Err(err) = handle.disconnect(Disconnect::ByApplication, "", "").await {
            debug!(?err, transport = %self.authority, "disconnect failed");
        }
        info!(transport = %self.authority, "transport closed");
    }
}

/// Dials hosts over SSH and authenticates with an identity file or a password.
#[derive(Clone, Default)]
pub struct RusshConnector {
    config: TransportConfig,
}

impl RusshConnector {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    fn client_config(&self) -> client::Config {
        client::Config {
            nodelay: true,
            inactivity_timeout: None,
            keepalive_interval: self.config.keepalive_interval,
            keepalive_max: self.config.keepalive_max,
            ..Default::default()
        }
    }

    async fn establish(&self, host: &Host, credential: Option<&SecretString>) -> Result<SshTransport> {
        let authority = host.transport_key();
        let routes = Routes::default();
        let handler = TunnelHandler {
            authority: authority.clone(),
            routes: routes.clone(),
        };
        info!(target = %authority, "connecting");
        let config = Arc::new(self.client_config());
        let mut handle = client::connect(config, (host.address.as_str(), host.port), handler).await?;
        authenticate(&mut handle, host, credential).await?;
        Ok(SshTransport {
            authority,
            handle: RwLock::new(handle),
            routes,
            ping_timeout: self.config.connect_timeout,
        })
    }
}

#[async_trait]
impl Connector for RusshConnector {
    async fn connect(&self, host: &Host, credential: Option<&SecretString>) -> Result<Arc<dyn Transport>> {
        let limit = self.config.connect_timeout;
        let transport = tokio::time::timeout(limit, self.establish(host, credential))
            .await
            .map_err(|_| SshCoreError::Timeout {
                operation: format!("connecting to {}", host.transport_key()),
                seconds: limit.as_secs(),
            })??;
        Ok(Arc::new(transport))
    }
}

async fn authenticate(handle: &mut Handle<TunnelHandler>, host: &Host, credential: Option<&SecretString>) -> Result<()> {
    let target = host.transport_key();
    let rejected = |message: &str| SshCoreError::AuthFailed {
        target: target.clone(),
        message: message.to_string(),
    };

    if let Some(path) = &host.identity_file {
        let passphrase = credential.map(|secret| secret.expose_secret());
        let key = Arc::new(load_identity(path, passphrase).await?);
        let rsa_hint = handle.best_supported_rsa_hash().await.unwrap_or(None).flatten();
        let hash_alg = if key.algorithm().is_rsa() { rsa_hint } else { None };
        debug!(key = ?key.algorithm(), "attempting public-key auth");
        let result = handle
            .authenticate_publickey(host.user.clone(), PrivateKeyWithHashAlg::new(key, hash_alg))
            .await?;
        if result.success() {
            info!(%target, method = "publickey", "authentication succeeded");
            return Ok(());
        }
        return Err(rejected("public key rejected by server"));
    }

    if let Some(password) = credential {
        let result = handle
            .authenticate_password(host.user.clone(), password.expose_secret().to_string())
            .await?;
        if result.success() {
            info!(%target, method = "password", "authentication succeeded");
            return Ok(());
        }
        return Err(rejected("password rejected by server"));
    }

    Err(rejected("no identity file or password configured"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(port: u32) -> RemoteBinding {
        RemoteBinding {
            address: "127.0.0.1".into(),
            port,
        }
    }

    fn inbound(origin: &str) -> InboundStream {
        let (stream, _peer) = tokio::io::duplex(64);
        InboundStream {
            stream: Box::new(stream),
            origin: origin.into(),
        }
    }

    #[tokio::test]
    async fn route_accepts_channels_before_forward_is_confirmed() {
        let routes = Routes::default();
        let (sender, incoming) = register_route(&routes, binding(9000)).await;

        // A channel arriving before the server's reply is still delivered.
        let early = route_for(&routes, "127.0.0.1", 9000).await.expect("route registered up front");
        early.send(inbound("203.0.113.7:1")).ok();

        let settled = settle_route(&routes, &sender, 0).await.expect("route still present");
        assert_eq!(settled, binding(9000));
        let mut listener = RemoteListener::new(settled, incoming);
        assert_eq!(listener.accept().await.unwrap().origin, "203.0.113.7:1");
    }

    #[tokio::test]
    async fn settle_applies_server_assigned_port() {
        let routes = Routes::default();
        let (sender, _incoming) = register_route(&routes, binding(0)).await;

        let settled = settle_route(&routes, &sender, 41000).await.unwrap();

        assert_eq!(settled.port, 41000);
        assert!(route_for(&routes, "127.0.0.1", 41000).await.is_some());
    }

    #[tokio::test]
    async fn rejected_forward_leaves_other_routes_alone() {
        let routes = Routes::default();
        let (_kept, _kept_incoming) = register_route(&routes, binding(9000)).await;
        let (rejected, mut rejected_incoming) = register_route(&routes, binding(9000)).await;

        forget_route(&routes, &rejected).await;
        drop(rejected);

        assert_eq!(routes.lock().await.len(), 1);
        assert!(route_for(&routes, "127.0.0.1", 9000).await.is_some());
        assert!(rejected_incoming.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropping_routes_closes_listeners() {
        let routes = Routes::default();
        let (_, first) = register_route(&routes, binding(9000)).await;
        let (_, second) = register_route(&routes, binding(9001)).await;
        let mut first_listener = RemoteListener::new(binding(9000), first);
        let mut second_listener = RemoteListener::new(binding(9001), second);

        assert_eq!(drop_routes(&routes).await, 2);

        assert!(routes.lock().await.is_empty());
        assert!(matches!(first_listener.accept().await, Err(SshCoreError::ListenerClosed(_))));
        assert!(matches!(second_listener.accept().await, Err(SshCoreError::ListenerClosed(_))));
        assert!(settle_route(&routes, &mpsc::unbounded_channel().0, 0).await.is_none());
    }
}
