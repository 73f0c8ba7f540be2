use std::sync::Arc;

use tokio::{net::TcpStream, sync::oneshot};
use tracing::{debug, info};

use super::session::ForwardingSession;
use crate::{
    SshResult,
    transport::{InboundStream, RemoteListener, Transport},
};

/// Start a remote forward: the server listens, each inbound stream is pumped to the local target.
pub(super) async fn start(
    session: &Arc<ForwardingSession>,
    transport: Arc<dyn Transport>,
    shutdown: oneshot::Receiver<()>,
) -> SshResult<()> {
    let rule = session.rule();
    let listener = transport.listen(&rule.remote_host, rule.remote_port).await?;
    let binding = listener.binding().clone();
    info!(
        id = %rule.id,
        remote = %binding,
        target = %rule.local_endpoint(),
        "remote forward listening"
    );
    session.attach_remote(transport, binding).await;

    let handle = tokio::spawn(accept_loop(listener, session.clone(), shutdown));
    session.attach_acceptor(handle);
    Ok(())
}

async fn accept_loop(mut listener: RemoteListener, session: Arc<ForwardingSession>, mut shutdown: oneshot::Receiver<()>) {
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            inbound = listener.accept() => match inbound {
                Ok(inbound) => {
                    debug!(id = %session.id(), origin = %inbound.origin, "inbound remote connection");
                    tokio::spawn(forward_inbound(session.clone(), inbound));
                }
                Err(err) => {
                    session.record_failure(format!("remote accept failed: {err}"));
                    break;
                }
            },
        }
    }
    info!(id = %session.id(), "remote listener closed");
}

async fn forward_inbound(session: Arc<ForwardingSession>, inbound: InboundStream) {
    let _guard = session.stats().track_connection();
    let rule = session.rule();
    match TcpStream::connect((rule.local_host.as_str(), rule.local_port)).await {
        Ok(local) => {
            local.set_nodelay(true).ok();
            session.relay(local, inbound.stream).await;
        }
        Err(err) => session.record_failure(format!("connect {} failed: {err}", rule.local_endpoint())),
    }
}
