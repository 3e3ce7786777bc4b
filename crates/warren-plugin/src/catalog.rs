//! Compiled-in plugin units, addressed by source reference.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::PluginError;
use crate::plugin::Plugin;

pub type PluginFactory = Arc<dyn Fn() -> Box<dyn Plugin> + Send + Sync>;

/// Maps a source reference (what `loadPlugin(filename)` names) to a
/// constructor.
#[derive(Clone, Default)]
pub struct PluginCatalog {
    units: IndexMap<String, PluginFactory>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog of the plugins shipped with the server.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog
            .register("rfid", crate::builtin::rfid::create)
            .register("surprise", crate::builtin::surprise::create);
        catalog
    }

    pub fn register<F>(&mut self, source: &str, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Plugin> + Send + Sync + 'static,
    {
        self.units.insert(source.to_string(), Arc::new(factory));
        self
    }

    pub fn contains(&self, source: &str) -> bool {
        self.units.contains_key(source)
    }

    pub fn sources(&self) -> Vec<String> {
        self.units.keys().cloned().collect()
    }

    pub fn instantiate(&self, source: &str) -> Result<Box<dyn Plugin>, PluginError> {
        let factory = self
            .units
            .get(source)
            .ok_or_else(|| PluginError::NotAModule(source.to_string()))?;
        Ok(factory())
    }
}
