use std::{fmt, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};
use xssh_types::Host;

// Internal Result type alias for convenience
type Result<T> = crate::SshResult<T>;

/// Trait for streams that can be used for forwarding.
pub trait ForwardStreamIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> ForwardStreamIo for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Type alias for boxed forward streams.
pub type ForwardStream = Box<dyn ForwardStreamIo>;

/// Address and port the server actually bound for a remote listener.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RemoteBinding {
    pub address: String,
    pub port: u32,
}

impl RemoteBinding {
    /// Whether a `forwarded-tcpip` open for `address:port` belongs to this binding.
    ///
    /// Servers report the address they were asked to bind; an empty request
    /// matches any reported address.
    pub fn matches(&self, address: &str, port: u32) -> bool {
        self.port == port && (self.address.is_empty() || self.address == address)
    }
}

impl fmt::Display for RemoteBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Stream opened by the remote side of a remote listener.
pub struct InboundStream {
    pub stream: ForwardStream,
    /// `address:port` of the peer that connected on the server side.
    pub origin: String,
}

/// Acceptor for streams arriving on a remote listener.
///
/// Ends with [`crate::SshCoreError::ListenerClosed`] once the transport drops the
/// binding, which is how a stopped remote forward unblocks its accept loop.
pub struct RemoteListener {
    binding: RemoteBinding,
    incoming: mpsc::UnboundedReceiver<InboundStream>,
}

impl RemoteListener {
    pub fn new(binding: RemoteBinding, incoming: mpsc::UnboundedReceiver<InboundStream>) -> Self {
        Self { binding, incoming }
    }

    pub fn binding(&self) -> &RemoteBinding {
        &self.binding
    }

    pub async fn accept(&mut self) -> Result<InboundStream> {
        self.incoming
            .recv()
            .await
            .ok_or_else(|| crate::SshCoreError::ListenerClosed(self.binding.to_string()))
    }
}

/// One authenticated connection able to dial out and listen remotely.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a stream to `target_host:target_port` from the remote side.
    async fn dial(&self, target_host: &str, target_port: u16, origin: Option<SocketAddr>) -> Result<ForwardStream>;

    /// Ask the remote side to listen on `bind_host:bind_port`.
    async fn listen(&self, bind_host: &str, bind_port: u16) -> Result<RemoteListener>;

    /// Cancel a binding returned by [`Transport::listen`].
    async fn close_listener(&self, binding: &RemoteBinding) -> Result<()>;

    /// Cheap liveness check used before a pooled transport is reused.
    async fn probe(&self) -> bool;

    /// Tear the connection down. Only the pool calls this.
    async fn close(&self);
}

/// Dials and authenticates new transports.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, host: &Host, credential: Option<&SecretString>) -> Result<Arc<dyn Transport>>;
}
