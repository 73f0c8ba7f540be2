use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::{net::TcpStream, sync::oneshot};
use tracing::{debug, info};

use super::{
    acceptor::accept_loop,
    session::{ForwardingSession, bind_local},
    socks::{SocksReply, negotiate, write_reply},
};
use crate::{SshResult, transport::Transport};

/// Start a dynamic forward: a local SOCKS5 proxy dialing through the tunnel.
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
    info!(id = %rule.id, bind = %bound, "SOCKS proxy listening");

    let handler_session = session.clone();
    let handle = tokio::spawn(accept_loop(listener, session.clone(), shutdown, poll, move |stream, origin| {
        proxy_connection(handler_session.clone(), transport.clone(), stream, origin)
    }));
    session.attach_acceptor(handle);
    Ok(())
}

async fn proxy_connection(session: Arc<ForwardingSession>, transport: Arc<dyn Transport>, mut stream: TcpStream, origin: SocketAddr) {
    let _guard = session.stats().track_connection();
    stream.set_nodelay(true).ok();

    let target = match negotiate(&mut stream).await {
        Ok(target) => target,
        Err(err) => {
            session.record_failure(format!("SOCKS negotiation with {origin} failed: {err}"));
            return;
        }
    };
    debug!(id = %session.id(), %origin, %target, "SOCKS connect");

    let tunnel = match transport.dial(&target.host, target.port, Some(origin)).await {
        Ok(tunnel) => tunnel,
        Err(err) => {
            session.record_failure(format!("dial {target} failed: {err}"));
            let _ = write_reply(&mut stream, SocksReply::GeneralFailure).await;
            return;
        }
    };
    if let Err(err) = write_reply(&mut stream, SocksReply::Succeeded).await {
        session.record_failure(format!("SOCKS reply to {origin} failed: {err}"));
        return;
    }
    session.relay(stream, tunnel).await;
}
