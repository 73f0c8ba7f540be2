//! Authenticated, multiplexed transports used by forwarding sessions.
//!
//! A [`Transport`] opens outbound streams and accepts inbound streams over one
//! connection. [`TransportPool`] shares a transport between every session that
//! targets the same `user@host:port`, re-dialing through a [`Connector`] when the
//! cached one stops answering liveness probes.

mod pool;
mod ssh;
mod traits;

pub use pool::TransportPool;
pub use ssh::{RusshConnector, SshTransport};
pub use traits::{Connector, ForwardStream, ForwardStreamIo, InboundStream, RemoteBinding, RemoteListener, Transport};
