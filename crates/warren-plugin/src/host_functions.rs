//! Services the server exposes to plugins.
//!
//! Each loaded plugin receives its own [`HostContext`] at `init`, carrying
//! its name and type so that entity access can be scoped per plugin.

use std::path::PathBuf;
use std::sync::Arc;

use warren_db::{Bunny, Capability, EntityId, Entities, Ztamp};

use crate::plugin::PluginType;

/// Maximum log message length from plugins.
const MAX_LOG_MESSAGE_LEN: usize = 2048;

/// Strip control characters (except newline/tab) and truncate.
fn sanitize_log_message(message: &str) -> String {
    let cleaned: String = message
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .take(MAX_LOG_MESSAGE_LEN)
        .collect();
    if message.chars().count() > MAX_LOG_MESSAGE_LEN {
        format!("{cleaned}... (truncated)")
    } else {
        cleaned
    }
}

/// Server-wide part of every plugin's context.
#[derive(Clone)]
pub struct HostConfig {
    pub entities: Arc<Entities>,
    /// Local directory served over HTTP; plugin files live under `plugins/<name>`.
    pub http_root: PathBuf,
    /// Public base URL devices fetch files from.
    pub broadcast_url: String,
}

impl HostConfig {
    pub fn context_for(&self, plugin_name: &str, plugin_type: PluginType) -> HostContext {
        HostContext {
            plugin_name: plugin_name.to_string(),
            plugin_type,
            config: self.clone(),
        }
    }
}

#[derive(Clone)]
pub struct HostContext {
    plugin_name: String,
    plugin_type: PluginType,
    config: HostConfig,
}

impl HostContext {
    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    pub fn entities(&self) -> &Arc<Entities> {
        &self.config.entities
    }

    pub fn bunny(&self, id: &EntityId) -> Option<Arc<Bunny>> {
        self.config.entities.bunnies.get(id)
    }

    /// A ztamp plugin only sees the tags that granted it access.
    pub fn ztamp(&self, id: &EntityId) -> Option<Arc<Ztamp>> {
        let capability = Capability {
            holder: &self.plugin_name,
            scoped: self.plugin_type == PluginType::ZtampPlugin,
        };
        self.config.entities.ztamps.get_if_owned(id, &capability)
    }

    pub fn local_http_folder(&self) -> PathBuf {
        self.config
            .http_root
            .join("plugins")
            .join(&self.plugin_name)
    }

    /// Public URL of a file under this plugin's HTTP folder.
    pub fn broadcast_url(&self, relative: &str) -> String {
        format!(
            "{}/plugins/{}/{}",
            self.config.broadcast_url.trim_end_matches('/'),
            self.plugin_name,
            relative.trim_start_matches('/')
        )
    }

    pub fn log_info(&self, message: &str) {
        let msg = sanitize_log_message(message);
        tracing::info!(plugin = %self.plugin_name, "{msg}");
    }

    pub fn log_warn(&self, message: &str) {
        let msg = sanitize_log_message(message);
        tracing::warn!(plugin = %self.plugin_name, "{msg}");
    }

    pub fn log_error(&self, message: &str) {
        let msg = sanitize_log_message(message);
        tracing::error!(plugin = %self.plugin_name, "{msg}");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeDelta;
    use warren_db::JsonStore;

    pub(crate) fn host_config(dir: &std::path::Path) -> HostConfig {
        let store = JsonStore::open(dir.join("data"), &Entities::KINDS).unwrap();
        HostConfig {
            entities: Arc::new(Entities::new(&store, TimeDelta::seconds(3600))),
            http_root: dir.join("http"),
            broadcast_url: "http://warren.local/".into(),
        }
    }

    #[test]
    fn test_sanitize_strips_control_chars() {
        assert_eq!(sanitize_log_message("a\x07b\nc"), "ab\nc");
        let long = "x".repeat(MAX_LOG_MESSAGE_LEN + 5);
        assert!(sanitize_log_message(&long).ends_with("... (truncated)"));
    }

    #[test]
    fn test_paths_and_urls() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = host_config(dir.path()).context_for("surprise", PluginType::BunnyPlugin);
        assert_eq!(
            ctx.local_http_folder(),
            dir.path().join("http").join("plugins").join("surprise")
        );
        assert_eq!(
            ctx.broadcast_url("fr/boing.mp3"),
            "http://warren.local/plugins/surprise/fr/boing.mp3"
        );
    }

    #[test]
    fn test_ztamp_plugin_access_is_scoped() {
        let dir = tempfile::tempdir().unwrap();
        let config = host_config(dir.path());
        let tag = EntityId::new(vec![0xd0, 0x02]);

        let system = config.context_for("rfid", PluginType::Required);
        assert!(system.ztamp(&tag).is_some());

        let scoped = config.context_for("weather", PluginType::ZtampPlugin);
        assert!(scoped.ztamp(&tag).is_none());
        system.ztamp(&tag).unwrap().add_plugin("weather");
        assert!(scoped.ztamp(&tag).is_some());
    }
}
