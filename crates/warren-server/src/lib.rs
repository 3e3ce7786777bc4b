//! Warren server: HTTP and XMPP front ends around the plugin dispatcher.

pub mod api;
pub mod config;
pub mod error;
pub mod http;
pub mod state;
pub mod xmpp;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinSet;

pub use config::ServerConfig;
pub use error::ServerError;
pub use state::AppState;

/// Bind the configured listeners and serve until shutdown is triggered.
/// Sessions are drained before returning; [`AppState::shutdown`] is left
/// to the caller.
pub async fn serve(state: Arc<AppState>) -> Result<(), ServerError> {
    let config = &state.config;
    let mut tasks = JoinSet::new();

    if config.http_listener {
        let listener = TcpListener::bind(config.http_addr).await?;
        tracing::info!(addr = %config.http_addr, "http listener started");
        let app = http::router(state.clone());
        let mut shutdown = state.subscribe_shutdown();
        tasks.spawn(async move {
            let stopped = async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            };
            if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(stopped).await {
                tracing::error!(error = %e, "http server failed");
            }
        });
    } else {
        tracing::warn!("http listener is disabled");
    }

    if config.xmpp_listener {
        let listener = TcpListener::bind(config.xmpp_addr).await?;
        tracing::info!(addr = %config.xmpp_addr, "xmpp listener started");
        tasks.spawn(xmpp::accept_loop(state.clone(), listener));
    } else {
        tracing::warn!("xmpp listener is disabled");
    }

    tracing::info!(
        http_api = config.http_api,
        http_violet = config.http_violet,
        mode = if config.standalone { "standalone" } else { "connected to violet" },
        "server ready"
    );

    while let Some(done) = tasks.join_next().await {
        if let Err(e) = done {
            tracing::error!(error = %e, "listener task failed");
        }
    }
    Ok(())
}
