//! XMPP device session layer.

pub mod session;
pub mod stanza;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinSet;

use crate::state::AppState;

/// Accept devices until shutdown, then wait for every session to finish
/// its cleanup.
pub async fn accept_loop(state: Arc<AppState>, listener: TcpListener) {
    let mut shutdown = state.subscribe_shutdown();
    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.wait_for(|stop| *stop) => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    tracing::debug!(%peer, "device connection accepted");
                    if let Err(e) = socket.set_nodelay(true) {
                        tracing::debug!(%peer, error = %e, "set_nodelay failed");
                    }
                    sessions.spawn(session::run(
                        state.clone(),
                        socket,
                        peer,
                        state.subscribe_shutdown(),
                    ));
                }
                Err(e) => tracing::warn!(error = %e, "xmpp accept failed"),
            },
            // Reap finished sessions as we go.
            Some(done) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = done {
                    tracing::error!(error = %e, "device session task failed");
                }
            }
        }
    }

    tracing::info!(sessions = sessions.len(), "xmpp listener stopping");
    while let Some(done) = sessions.join_next().await {
        if let Err(e) = done {
            tracing::error!(error = %e, "device session task failed");
        }
    }
}
