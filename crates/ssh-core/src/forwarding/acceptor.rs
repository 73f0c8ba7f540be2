use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use tokio::{
    net::{TcpListener, TcpStream},
    sync::oneshot,
    time::{sleep, timeout},
};
use tracing::{debug, info};

use super::session::ForwardingSession;

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Accept loop shared by local and dynamic forwards.
///
/// Each accept waits at most `poll` before the loop checks the shutdown
/// signal again; an expired wait is not an error. Every accepted connection
/// is handed to `handler` on its own task.
pub(super) async fn accept_loop<F, Fut>(
    listener: TcpListener,
    session: Arc<ForwardingSession>,
    mut shutdown: oneshot::Receiver<()>,
    poll: Duration,
    handler: F,
) where
    F: Fn(TcpStream, SocketAddr) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            accepted = timeout(poll, listener.accept()) => match accepted {
                Err(_) => continue,
                Ok(Ok((stream, origin))) => {
                    debug!(id = %session.id(), %origin, "accepted connection");
                    tokio::spawn(handler(stream, origin));
                }
                Ok(Err(err)) => {
                    session.record_failure(format!("accept failed: {err}"));
                    sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            },
        }
    }
    info!(id = %session.id(), "listener closed");
}
