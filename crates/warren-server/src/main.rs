use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use warren_plugin::PluginCatalog;
use warren_server::{AppState, ServerConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("-- warren start --");
    let config = ServerConfig::from_env();

    let state = AppState::bootstrap(config, PluginCatalog::builtin())
        .await
        .expect("failed to open the data directory");

    let signal_state = state.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("shutdown requested"),
            Err(e) => tracing::error!(error = %e, "can't listen for ctrl-c, shutting down"),
        }
        signal_state.trigger_shutdown();
    });

    if let Err(e) = warren_server::serve(state.clone()).await {
        tracing::error!(error = %e, "server failed");
        state.trigger_shutdown();
    }

    if let Err(e) = state.shutdown().await {
        tracing::error!(error = %e, "failed to flush state");
    }
    tracing::info!("-- warren stop --");
}
