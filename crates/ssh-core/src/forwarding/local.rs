use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::{net::TcpStream, sync::oneshot};
use tracing::info;

use super::{
    acceptor::accept_loop,
    session::{ForwardingSession, bind_local},
};
use crate::{SshResult, transport::Transport};

/// Start a local forward: listen locally, tunnel each connection to the fixed target.
pub(super) async fn start(
    session: &Arc<ForwardingSession>,
    transport: Arc<dyn Transport>,
    shutdown: oneshot::Receiver<()>,
    poll: Duration,
) -> SshResult<()> {
    let rule = session.rule();
    let listener = bind_local(&rule.local_host, rule.local_port).await?;
    let bound = listener.local_addr()?;
    session.set_local_addr(bound);
    info!(
        id = %rule.id,
        bind = %bound,
        target = %rule.remote_endpoint(),
        "local forward listening"
    );

    let handler_session = session.clone();
    let handle = tokio::spawn(accept_loop(listener, session.clone(), shutdown, poll, move |stream, origin| {
        forward_connection(handler_session.clone(), transport.clone(), stream, origin)
    }));
    session.attach_acceptor(handle);
    Ok(())
}

async fn forward_connection(session: Arc<ForwardingSession>, transport: Arc<dyn Transport>, stream: TcpStream, origin: SocketAddr) {
    let _guard = session.stats().track_connection();
    stream.set_nodelay(true).ok();
    let rule = session.rule();
    match transport.dial(&rule.remote_host, rule.remote_port, Some(origin)).await {
        Ok(tunnel) => session.relay(stream, tunnel).await,
        Err(err) => session.record_failure(format!("dial {} failed: {err}", rule.remote_endpoint())),
    }
}
