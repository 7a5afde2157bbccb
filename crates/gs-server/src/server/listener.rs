//! Accept loop
//!
//! Accepts receiver connections and spawns one session task per peer.
//! The loop never waits on session work; it only reports the new session
//! to the coordinator before spawning it, so the open always precedes the
//! matching close in the coordinator's queue.

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::coordinator::ServerEvent;
use crate::session::{ClientSession, SessionContext};

/// Run until `cancel` fires, then wait for every session task to finish
pub(crate) async fn accept_loop(
    listener: TcpListener,
    ctx: SessionContext,
    events: mpsc::Sender<ServerEvent>,
    cancel: CancellationToken,
) {
    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Listener shutting down");
                break;
            }

            Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!("Session task failed: {}", e);
                }
            }

            result = listener.accept() => {
                match result {
                    Ok((stream, peer_addr)) => {
                        tracing::debug!("New connection from {}", peer_addr);
                        if let Err(e) = stream.set_nodelay(true) {
                            tracing::debug!("Failed to set TCP_NODELAY for {}: {}", peer_addr, e);
                        }
                        if let Some(session) = open_session(stream, peer_addr, &ctx, &events).await {
                            sessions.spawn(session.run());
                        }
                    }
                    Err(e) => {
                        tracing::error!("Failed to accept connection: {}", e);
                    }
                }
            }
        }
    }

    // Stop accepting before draining sessions
    drop(listener);

    while let Some(joined) = sessions.join_next().await {
        if let Err(e) = joined {
            tracing::error!("Session task failed: {}", e);
        }
    }
}

async fn open_session(
    stream: TcpStream,
    peer_addr: std::net::SocketAddr,
    ctx: &SessionContext,
    events: &mpsc::Sender<ServerEvent>,
) -> Option<ClientSession> {
    let (handle, session) = ClientSession::new(stream, peer_addr, ctx.clone());

    if events.send(ServerEvent::SessionOpened(handle)).await.is_err() {
        tracing::warn!("Coordinator stopped, rejecting {}", peer_addr);
        return None;
    }
    Some(session)
}
