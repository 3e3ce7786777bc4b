//! Composition root: every shared component of the server, built once.

use std::sync::Arc;

use tokio::sync::watch;
use warren_db::Entities;
use warren_plugin::{Dispatcher, HostConfig, PluginCatalog, PluginRegistry};

use crate::config::ServerConfig;
use crate::error::ServerError;

pub struct AppState {
    pub config: ServerConfig,
    pub entities: Arc<Entities>,
    pub plugins: Arc<PluginRegistry>,
    pub dispatcher: Dispatcher,
    pub http_client: reqwest::Client,
    shutdown: watch::Sender<bool>,
}

impl AppState {
    /// Open the store, load every entity, then load the configured plugins.
    pub async fn bootstrap(
        config: ServerConfig,
        catalog: PluginCatalog,
    ) -> Result<Arc<Self>, ServerError> {
        let (store, entities) = warren_db::open(&config.store)?;
        entities.load_all().await?;
        tracing::info!(
            data_dir = %config.store.data_dir.display(),
            bunnies = entities.bunnies.len(),
            ztamps = entities.ztamps.len(),
            accounts = entities.accounts.len(),
            "entities loaded"
        );
        let entities = Arc::new(entities);

        let host = HostConfig {
            entities: entities.clone(),
            http_root: config.http_root.clone(),
            broadcast_url: config.broadcast_url.clone(),
        };
        let plugins = Arc::new(PluginRegistry::new(catalog, host, store));
        plugins.load_state().await?;
        let sources = if config.plugins.is_empty() {
            plugins.catalog().sources()
        } else {
            config.plugins.clone()
        };
        let loaded = plugins.load_all(&sources);
        tracing::info!(loaded, requested = sources.len(), "plugins loaded");

        let (shutdown, _) = watch::channel(false);
        Ok(Arc::new(Self {
            dispatcher: Dispatcher::new(plugins.clone()),
            config,
            entities,
            plugins,
            http_client: reqwest::Client::new(),
            shutdown,
        }))
    }

    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Ask every listener and device session to stop.
    pub fn trigger_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Final teardown once sessions have drained.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        self.plugins.unload_all();
        self.plugins.save_state().await?;
        self.entities.save_all().await?;
        tracing::info!("state flushed");
        Ok(())
    }
}
