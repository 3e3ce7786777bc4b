//! Plugin registry: loading, unloading and enabling plugins.
//!
//! The registry owns one descriptor per loaded plugin, kept in registration
//! order. Dispatch takes `Arc` snapshots of the descriptors, so unloading a
//! plugin never invalidates a traversal that is already running; the
//! instance is dropped once the last traversal releases it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use warren_db::{Account, Bunny, JsonStore};

use crate::api::{ApiCall, ApiError, ApiResult};
use crate::catalog::PluginCatalog;
use crate::dispatch::guarded;
use crate::error::PluginError;
use crate::host_functions::HostConfig;
use crate::http::HttpRequest;
use crate::plugin::{Plugin, PluginType};

/// Name of the document holding the enabled flags.
const STATE_DOC: &str = "plugins";

// ─── Descriptor ─────────────────────────────────────────────────────────

pub struct PluginDescriptor {
    name: String,
    visual_name: String,
    source: String,
    plugin_type: PluginType,
    enabled: AtomicBool,
    api_calls: Vec<ApiCall>,
    bunny_api_calls: Vec<ApiCall>,
    instance: Box<dyn Plugin>,
}

pub type PluginHandle = Arc<PluginDescriptor>;

impl PluginDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn visual_name(&self) -> &str {
        &self.visual_name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn plugin_type(&self) -> PluginType {
        self.plugin_type
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn plugin(&self) -> &dyn Plugin {
        self.instance.as_ref()
    }

    pub fn api_calls(&self) -> &[ApiCall] {
        &self.api_calls
    }

    pub fn bunny_api_calls(&self) -> &[ApiCall] {
        &self.bunny_api_calls
    }

    /// Run one of the plugin's global API calls. A panic becomes an error answer.
    pub fn api_call(&self, call: &str, account: &Account, req: &HttpRequest) -> ApiResult {
        guarded(&self.name, "api_call", || {
            self.instance.api_call(call, account, req)
        })
        .unwrap_or_else(|| Err(self.call_failed(call)))
    }

    pub fn bunny_api_call(
        &self,
        call: &str,
        account: &Account,
        bunny: &Arc<Bunny>,
        req: &HttpRequest,
    ) -> ApiResult {
        guarded(&self.name, "bunny_api_call", || {
            self.instance.bunny_api_call(call, account, bunny, req)
        })
        .unwrap_or_else(|| Err(self.call_failed(call)))
    }

    fn call_failed(&self, call: &str) -> ApiError {
        ApiError::new(format!("Plugin '{}' failed on '{call}'", self.name))
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("plugin_type", &self.plugin_type)
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct Loaded {
    by_name: IndexMap<String, PluginHandle>,
    /// source reference -> plugin name
    sources: HashMap<String, String>,
    /// Sources and names of plugins whose `init` is running.
    pending_sources: HashSet<String>,
    pending_names: HashSet<String>,
}

impl Loaded {
    fn claims(&self, source: &str, name: &str) -> bool {
        self.sources.contains_key(source)
            || self.by_name.contains_key(name)
            || self.pending_sources.contains(source)
            || self.pending_names.contains(name)
    }

    fn release(&mut self, source: &str, name: &str) {
        self.pending_sources.remove(source);
        self.pending_names.remove(name);
    }
}

// ─── Registry ───────────────────────────────────────────────────────────

pub struct PluginRegistry {
    catalog: PluginCatalog,
    host: HostConfig,
    store: JsonStore,
    loaded: RwLock<Loaded>,
    /// Persisted enabled flags, by plugin name.
    states: RwLock<BTreeMap<String, bool>>,
}

impl PluginRegistry {
    pub fn new(catalog: PluginCatalog, host: HostConfig, store: JsonStore) -> Self {
        Self {
            catalog,
            host,
            store,
            loaded: RwLock::new(Loaded::default()),
            states: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn catalog(&self) -> &PluginCatalog {
        &self.catalog
    }

    pub fn host(&self) -> &HostConfig {
        &self.host
    }

    /// Read the persisted enabled flags. Call before loading plugins.
    pub async fn load_state(&self) -> Result<(), PluginError> {
        if let Some(states) = self
            .store
            .read_doc::<BTreeMap<String, bool>>(STATE_DOC)
            .await?
        {
            *self.states.write() = states;
        }
        Ok(())
    }

    pub async fn save_state(&self) -> Result<(), PluginError> {
        let states = self.states.read().clone();
        self.store.write_doc(STATE_DOC, &states).await?;
        Ok(())
    }

    /// Instantiate, initialise and register the plugin behind `source`.
    ///
    /// The source and name are reserved before `init` runs, so a concurrent
    /// load of the same plugin fails without initialising a second instance.
    pub fn load(&self, source: &str) -> Result<PluginHandle, PluginError> {
        if self.loaded.read().sources.contains_key(source) {
            tracing::warn!(source, "plugin source already loaded");
            return Err(PluginError::AlreadyLoaded(source.to_string()));
        }

        let instance = self.catalog.instantiate(source)?;
        let name = instance.name().to_string();
        {
            let mut loaded = self.loaded.write();
            if loaded.claims(source, &name) {
                tracing::warn!(plugin = %name, source, "plugin is already loaded or loading");
                return Err(PluginError::AlreadyLoaded(name));
            }
            loaded.pending_sources.insert(source.to_string());
            loaded.pending_names.insert(name.clone());
        }

        let plugin_type = instance.plugin_type();
        let host = self.host.context_for(&name, plugin_type);
        if !guarded(&name, "init", || instance.init(host)).unwrap_or(false) {
            self.loaded.write().release(source, &name);
            tracing::error!(plugin = %name, source, "plugin initialization failed");
            return Err(PluginError::InitFailed(name));
        }

        let enabled = plugin_type == PluginType::Required
            || self
                .states
                .read()
                .get(&name)
                .copied()
                .unwrap_or_else(|| instance.enabled_by_default());

        let handle = Arc::new(PluginDescriptor {
            visual_name: instance.visual_name().to_string(),
            source: source.to_string(),
            plugin_type,
            enabled: AtomicBool::new(enabled),
            api_calls: instance.api_calls(),
            bunny_api_calls: instance.bunny_api_calls(),
            name: name.clone(),
            instance,
        });

        {
            let mut loaded = self.loaded.write();
            loaded.release(source, &name);
            loaded.by_name.insert(name.clone(), handle.clone());
            loaded.sources.insert(source.to_string(), name.clone());
        }

        tracing::info!(plugin = %name, source, kind = %plugin_type, enabled, "plugin loaded");

        if plugin_type == PluginType::BunnyPlugin {
            for bunny in self.host.entities.bunnies.list() {
                if bunny.plugin_loaded(&name) && bunny.is_connected() && enabled {
                    guarded(&name, "on_bunny_connect", || {
                        handle.plugin().on_bunny_connect(&bunny)
                    });
                }
            }
        }

        Ok(handle)
    }

    /// Remove a plugin. Returns false if no plugin has that name.
    pub fn unload(&self, name: &str) -> bool {
        let handle = {
            let mut loaded = self.loaded.write();
            let Some(handle) = loaded.by_name.shift_remove(name) else {
                tracing::warn!(plugin = %name, "can't unload unknown plugin");
                return false;
            };
            loaded.sources.remove(handle.source());
            handle
        };

        if handle.plugin_type() == PluginType::BunnyPlugin {
            for bunny in self.host.entities.bunnies.list() {
                if bunny.plugin_unloaded(name) && bunny.is_connected() && handle.is_enabled() {
                    guarded(name, "on_bunny_disconnect", || {
                        handle.plugin().on_bunny_disconnect(&bunny)
                    });
                }
            }
        }

        tracing::info!(plugin = %name, source = %handle.source(), "plugin unloaded");
        true
    }

    /// Unload and load again from the recorded source.
    pub fn reload(&self, name: &str) -> bool {
        let Some(source) = self.get(name).map(|h| h.source().to_string()) else {
            tracing::warn!(plugin = %name, "can't reload unknown plugin");
            return false;
        };
        if !self.unload(name) {
            return false;
        }
        match self.load(&source) {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(plugin = %name, source = %source, "reload failed: {e}");
                false
            }
        }
    }

    /// Load every listed source; failures are logged and skipped.
    pub fn load_all<S: AsRef<str>>(&self, sources: &[S]) -> usize {
        let mut count = 0;
        for source in sources {
            match self.load(source.as_ref()) {
                Ok(_) => count += 1,
                Err(e) => tracing::error!(source = source.as_ref(), "failed to load plugin: {e}"),
            }
        }
        count
    }

    /// Unload everything, most recently loaded first.
    pub fn unload_all(&self) {
        let names: Vec<String> = self.loaded.read().by_name.keys().cloned().collect();
        for name in names.iter().rev() {
            self.unload(name);
        }
    }

    pub fn enable(&self, name: &str) -> Result<(), PluginError> {
        self.set_enabled(name, true)
    }

    pub fn disable(&self, name: &str) -> Result<(), PluginError> {
        self.set_enabled(name, false)
    }

    /// Flip the enabled flag. Connected devices a bunny plugin is bound to
    /// see it come and go as if it had been loaded or unloaded.
    fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), PluginError> {
        let handle = {
            let loaded = self.loaded.write();
            let handle = loaded
                .by_name
                .get(name)
                .ok_or_else(|| PluginError::NotFound(name.to_string()))?;
            if !enabled && handle.plugin_type() == PluginType::Required {
                return Err(PluginError::ProtectedPlugin(name.to_string()));
            }
            if handle.is_enabled() == enabled {
                return Err(PluginError::AlreadyInState {
                    name: name.to_string(),
                    state: if enabled { "enabled" } else { "disabled" },
                });
            }
            handle.enabled.store(enabled, Ordering::Release);
            self.states.write().insert(name.to_string(), enabled);
            handle.clone()
        };
        tracing::info!(plugin = %name, enabled, "plugin state changed");

        if handle.plugin_type() == PluginType::BunnyPlugin {
            for bunny in self.host.entities.bunnies.list() {
                if !bunny.is_connected() || !bunny.bound_plugins().iter().any(|p| p == name) {
                    continue;
                }
                if enabled {
                    guarded(name, "on_bunny_connect", || {
                        handle.plugin().on_bunny_connect(&bunny)
                    });
                } else {
                    guarded(name, "on_bunny_disconnect", || {
                        handle.plugin().on_bunny_disconnect(&bunny)
                    });
                }
            }
        }
        Ok(())
    }

    /// Activate a bunny plugin on one device.
    pub fn attach_to_bunny(&self, name: &str, bunny: &Arc<Bunny>) -> Result<(), PluginError> {
        let handle = self
            .get(name)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))?;
        if handle.plugin_type() != PluginType::BunnyPlugin {
            return Err(PluginError::NotABunnyPlugin(name.to_string()));
        }
        if !bunny.activate(name) {
            return Err(PluginError::AlreadyInState {
                name: name.to_string(),
                state: "active",
            });
        }
        if bunny.plugin_loaded(name) && bunny.is_connected() && handle.is_enabled() {
            guarded(name, "on_bunny_connect", || {
                handle.plugin().on_bunny_connect(bunny)
            });
        }
        tracing::info!(plugin = %name, bunny = %bunny.id(), "plugin activated on bunny");
        Ok(())
    }

    /// Deactivate a plugin on one device. Works for plugins that are not
    /// loaded anymore.
    pub fn detach_from_bunny(&self, name: &str, bunny: &Arc<Bunny>) -> Result<(), PluginError> {
        if !bunny.deactivate(name) {
            return Err(PluginError::AlreadyInState {
                name: name.to_string(),
                state: "inactive",
            });
        }
        let was_bound = bunny.plugin_unloaded(name);
        if let Some(handle) = self.get(name) {
            if was_bound && bunny.is_connected() && handle.is_enabled() {
                guarded(name, "on_bunny_disconnect", || {
                    handle.plugin().on_bunny_disconnect(bunny)
                });
            }
        }
        tracing::info!(plugin = %name, bunny = %bunny.id(), "plugin deactivated on bunny");
        Ok(())
    }

    // ── Query methods ────────────────────────────────────────────────

    pub fn get(&self, name: &str) -> Option<PluginHandle> {
        self.loaded.read().by_name.get(name).cloned()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.read().by_name.contains_key(name)
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded.read().by_name.len()
    }

    /// Every loaded plugin, in registration order.
    pub fn list(&self) -> Vec<PluginHandle> {
        self.loaded.read().by_name.values().cloned().collect()
    }

    fn filtered(&self, keep: impl Fn(&PluginDescriptor) -> bool) -> Vec<PluginHandle> {
        self.loaded
            .read()
            .by_name
            .values()
            .filter(|h| keep(h))
            .cloned()
            .collect()
    }

    pub fn enabled(&self) -> Vec<PluginHandle> {
        self.filtered(|h| h.is_enabled())
    }

    pub fn bunny_plugins(&self) -> Vec<PluginHandle> {
        self.filtered(|h| h.plugin_type() == PluginType::BunnyPlugin)
    }

    pub fn system_plugins(&self) -> Vec<PluginHandle> {
        self.filtered(|h| h.plugin_type().is_system())
    }

    pub fn required_plugins(&self) -> Vec<PluginHandle> {
        self.filtered(|h| h.plugin_type() == PluginType::Required)
    }

    pub fn bunny_enabled(&self) -> Vec<PluginHandle> {
        self.filtered(|h| h.plugin_type() == PluginType::BunnyPlugin && h.is_enabled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host_functions::tests::host_config;
    use crate::host_functions::HostContext;
    use crate::testing::{catalog_with, CallLog, Scripted};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn registry(dir: &std::path::Path, catalog: PluginCatalog) -> PluginRegistry {
        let host = host_config(dir);
        let store = JsonStore::open(dir.join("data"), &[]).unwrap();
        PluginRegistry::new(catalog, host, store)
    }

    fn names(handles: &[PluginHandle]) -> Vec<&str> {
        handles.iter().map(|h| h.name()).collect()
    }

    #[test]
    fn test_load_and_query() {
        let dir = tempfile::tempdir().unwrap();
        let log = CallLog::default();
        let reg = registry(
            dir.path(),
            catalog_with(vec![
                Scripted::new("rfid", PluginType::Required, &log),
                Scripted::new("surprise", PluginType::BunnyPlugin, &log),
                Scripted::new("clock", PluginType::System, &log),
            ]),
        );
        assert_eq!(reg.load_all(&["rfid", "surprise", "clock"]), 3);

        assert_eq!(names(&reg.list()), vec!["rfid", "surprise", "clock"]);
        assert_eq!(names(&reg.system_plugins()), vec!["rfid", "clock"]);
        assert_eq!(names(&reg.required_plugins()), vec!["rfid"]);
        assert_eq!(names(&reg.bunny_plugins()), vec!["surprise"]);
        assert_eq!(names(&reg.bunny_enabled()), vec!["surprise"]);
        assert_eq!(reg.get("surprise").unwrap().visual_name(), "Scripted surprise");
    }

    #[test]
    fn test_duplicate_name_from_other_source() {
        let dir = tempfile::tempdir().unwrap();
        let log = CallLog::default();
        let mut catalog = catalog_with(vec![Scripted::new("surprise", PluginType::BunnyPlugin, &log)]);
        let copy = Scripted::new("surprise", PluginType::BunnyPlugin, &log);
        catalog.register("surprise-copy", move || Box::new(copy.clone()));
        let reg = registry(dir.path(), catalog);

        let first = reg.load("surprise").unwrap();
        let err = reg.load("surprise-copy").unwrap_err();
        assert!(matches!(err, PluginError::AlreadyLoaded(ref n) if n == "surprise"));
        assert_eq!(reg.loaded_count(), 1);
        assert!(Arc::ptr_eq(&reg.get("surprise").unwrap(), &first));
        assert_eq!(reg.get("surprise").unwrap().source(), "surprise");
    }

    #[test]
    fn test_same_source_twice() {
        let dir = tempfile::tempdir().unwrap();
        let log = CallLog::default();
        let reg = registry(
            dir.path(),
            catalog_with(vec![Scripted::new("clock", PluginType::System, &log)]),
        );
        reg.load("clock").unwrap();
        assert!(matches!(
            reg.load("clock"),
            Err(PluginError::AlreadyLoaded(_))
        ));
    }

    #[test]
    fn test_unknown_source_is_not_a_module() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path(), PluginCatalog::new());
        assert!(matches!(reg.load("nope"), Err(PluginError::NotAModule(_))));
    }

    #[test]
    fn test_failed_init_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let log = CallLog::default();
        let mut broken = Scripted::new("broken", PluginType::System, &log);
        broken.init_ok = false;
        let reg = registry(dir.path(), catalog_with(vec![broken]));

        assert!(matches!(reg.load("broken"), Err(PluginError::InitFailed(_))));
        assert!(!reg.is_loaded("broken"));
        // The source is free again.
        assert!(matches!(reg.load("broken"), Err(PluginError::InitFailed(_))));
    }

    #[test]
    fn test_unload_unknown_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path(), PluginCatalog::new());
        assert!(!reg.unload("ghost"));
        assert!(!reg.reload("ghost"));
    }

    #[test]
    fn test_required_cannot_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let log = CallLog::default();
        let reg = registry(
            dir.path(),
            catalog_with(vec![Scripted::new("rfid", PluginType::Required, &log)]),
        );
        reg.load("rfid").unwrap();
        assert!(matches!(
            reg.disable("rfid"),
            Err(PluginError::ProtectedPlugin(_))
        ));
        assert!(matches!(
            reg.enable("rfid"),
            Err(PluginError::AlreadyInState { state: "enabled", .. })
        ));
        // Unloading a required plugin is allowed.
        assert!(reg.unload("rfid"));
    }

    #[test]
    fn test_enable_disable_errors() {
        let dir = tempfile::tempdir().unwrap();
        let log = CallLog::default();
        let reg = registry(
            dir.path(),
            catalog_with(vec![Scripted::new("clock", PluginType::System, &log)]),
        );
        reg.load("clock").unwrap();
        assert!(matches!(reg.enable("ghost"), Err(PluginError::NotFound(_))));
        assert!(matches!(
            reg.enable("clock"),
            Err(PluginError::AlreadyInState { .. })
        ));
        reg.disable("clock").unwrap();
        assert!(!reg.get("clock").unwrap().is_enabled());
        assert!(matches!(
            reg.disable("clock"),
            Err(PluginError::AlreadyInState { state: "disabled", .. })
        ));
        assert!(reg.enabled().is_empty());
    }

    #[test]
    fn test_reload_keeps_name_type_and_disabled_flag() {
        let dir = tempfile::tempdir().unwrap();
        let log = CallLog::default();
        let reg = registry(
            dir.path(),
            catalog_with(vec![Scripted::new("clock", PluginType::System, &log)]),
        );
        let before = reg.load("clock").unwrap();
        reg.disable("clock").unwrap();

        assert!(reg.reload("clock"));
        let after = reg.get("clock").unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.plugin_type(), PluginType::System);
        assert!(!after.is_enabled());
    }

    #[tokio::test]
    async fn test_enabled_flags_persist() {
        let dir = tempfile::tempdir().unwrap();
        let log = CallLog::default();
        let catalog = catalog_with(vec![Scripted::new("clock", PluginType::System, &log)]);
        let reg = registry(dir.path(), catalog.clone());
        reg.load("clock").unwrap();
        reg.disable("clock").unwrap();
        reg.save_state().await.unwrap();

        let fresh = registry(dir.path(), catalog);
        fresh.load_state().await.unwrap();
        fresh.load("clock").unwrap();
        assert!(!fresh.get("clock").unwrap().is_enabled());
    }

    #[test]
    fn test_bunny_plugin_binding_on_load_and_unload() {
        let dir = tempfile::tempdir().unwrap();
        let log = CallLog::default();
        let reg = registry(
            dir.path(),
            catalog_with(vec![Scripted::new("surprise", PluginType::BunnyPlugin, &log)]),
        );
        let bunnies = &reg.host.entities.bunnies;
        let online = bunnies.get_hex("0019db000001").unwrap();
        let offline = bunnies.get_hex("0019db000002").unwrap();
        let other = bunnies.get_hex("0019db000003").unwrap();
        online.activate("surprise");
        offline.activate("surprise");
        let (tx, _rx) = mpsc::unbounded_channel();
        online.connect(tx);
        let (tx, _rx2) = mpsc::unbounded_channel();
        other.connect(tx);

        reg.load("surprise").unwrap();
        assert_eq!(online.bound_plugins(), vec!["surprise"]);
        assert_eq!(offline.bound_plugins(), vec!["surprise"]);
        assert!(other.bound_plugins().is_empty());
        assert_eq!(log.take(), vec!["surprise:on_bunny_connect:0019db000001"]);

        assert!(reg.unload("surprise"));
        assert!(online.bound_plugins().is_empty());
        assert_eq!(log.take(), vec!["surprise:on_bunny_disconnect:0019db000001"]);
    }

    #[test]
    fn test_attach_and_detach() {
        let dir = tempfile::tempdir().unwrap();
        let log = CallLog::default();
        let reg = registry(
            dir.path(),
            catalog_with(vec![
                Scripted::new("surprise", PluginType::BunnyPlugin, &log),
                Scripted::new("clock", PluginType::System, &log),
            ]),
        );
        reg.load_all(&["surprise", "clock"]);
        let bunny = reg.host.entities.bunnies.get_hex("0019db000001").unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        bunny.connect(tx);

        assert!(matches!(
            reg.attach_to_bunny("clock", &bunny),
            Err(PluginError::NotABunnyPlugin(_))
        ));
        reg.attach_to_bunny("surprise", &bunny).unwrap();
        assert!(matches!(
            reg.attach_to_bunny("surprise", &bunny),
            Err(PluginError::AlreadyInState { .. })
        ));
        reg.detach_from_bunny("surprise", &bunny).unwrap();
        assert!(!bunny.has_plugin("surprise"));
        assert_eq!(
            log.take(),
            vec![
                "surprise:on_bunny_connect:0019db000001",
                "surprise:on_bunny_disconnect:0019db000001",
            ]
        );
    }

    #[test]
    fn test_disable_detaches_bound_devices() {
        let dir = tempfile::tempdir().unwrap();
        let log = CallLog::default();
        let reg = registry(
            dir.path(),
            catalog_with(vec![Scripted::new("surprise", PluginType::BunnyPlugin, &log)]),
        );
        let bunnies = &reg.host.entities.bunnies;
        let bound = bunnies.get_hex("0019db000001").unwrap();
        let unbound = bunnies.get_hex("0019db000002").unwrap();
        bound.activate("surprise");
        let (tx, _rx) = mpsc::unbounded_channel();
        bound.connect(tx);
        let (tx, _rx2) = mpsc::unbounded_channel();
        unbound.connect(tx);

        reg.load("surprise").unwrap();
        assert_eq!(log.take(), vec!["surprise:on_bunny_connect:0019db000001"]);

        reg.disable("surprise").unwrap();
        assert_eq!(log.take(), vec!["surprise:on_bunny_disconnect:0019db000001"]);
        reg.enable("surprise").unwrap();
        assert_eq!(log.take(), vec!["surprise:on_bunny_connect:0019db000001"]);
        reg.disable("surprise").unwrap();
        log.take();
        // Already detached when it was disabled.
        assert!(reg.unload("surprise"));
        assert!(log.take().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_surprise_stops_playing() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("http").join("plugins").join("surprise").join("fr");
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(folder.join("boing.mp3"), b"ID3").unwrap();
        let reg = registry(dir.path(), PluginCatalog::builtin());

        let bunny = reg.host.entities.bunnies.get_hex("0019db000001").unwrap();
        bunny.settings().set("surprise", "frequency", 10);
        bunny.settings().set("surprise", "folder", "fr");
        bunny.activate("surprise");
        bunny.set_idle(true);
        let (tx, mut rx) = mpsc::unbounded_channel();
        bunny.connect(tx);

        reg.load("surprise").unwrap();
        assert!(rx.recv().await.is_some());

        reg.disable("surprise").unwrap();
        tokio::time::sleep(Duration::from_secs(35)).await;
        assert!(rx.try_recv().is_err());

        reg.enable("surprise").unwrap();
        assert!(rx.recv().await.is_some());
    }

    /// Counts `init` calls and holds each one open for a while.
    #[derive(Clone, Default)]
    struct SlowInit(Arc<AtomicUsize>);

    impl Plugin for SlowInit {
        fn name(&self) -> &str {
            "slow"
        }

        fn visual_name(&self) -> &str {
            "Slow to start"
        }

        fn init(&self, _host: HostContext) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            true
        }
    }

    #[test]
    fn test_concurrent_loads_init_once() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = SlowInit::default();
        let inits = plugin.0.clone();
        let mut catalog = PluginCatalog::new();
        catalog.register("slow", move || Box::new(plugin.clone()));
        let reg = registry(dir.path(), catalog);

        let start = Barrier::new(2);
        let (reg, start) = (&reg, &start);
        let results: Vec<bool> = std::thread::scope(|s| {
            let loaders: Vec<_> = (0..2)
                .map(|_| {
                    s.spawn(move || {
                        start.wait();
                        reg.load("slow").is_ok()
                    })
                })
                .collect();
            loaders.into_iter().map(|l| l.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|ok| **ok).count(), 1);
        assert_eq!(inits.load(Ordering::SeqCst), 1);
        assert_eq!(reg.loaded_count(), 1);
    }

    #[test]
    fn test_descriptor_debug_names_plugin() {
        let dir = tempfile::tempdir().unwrap();
        let log = CallLog::default();
        let reg = registry(
            dir.path(),
            catalog_with(vec![Scripted::new("clock", PluginType::System, &log)]),
        );
        let handle = reg.load("clock").unwrap();
        let shown = format!("{handle:?}");
        assert!(shown.contains("\"clock\""));
        assert!(shown.contains("enabled: true"));
    }
}
