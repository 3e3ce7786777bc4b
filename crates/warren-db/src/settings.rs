use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde_json::Value;

/// Namespace used for settings owned by the server itself rather than a plugin.
pub const GLOBAL: &str = "global";

/// Serialized form: namespace -> key -> value.
pub type SettingsMap = BTreeMap<String, BTreeMap<String, Value>>;

/// Per-entity settings, partitioned by namespace (a plugin name or [`GLOBAL`]).
#[derive(Debug, Default)]
pub struct Settings {
    inner: RwLock<SettingsMap>,
}

impl Settings {
    pub fn from_map(map: SettingsMap) -> Self {
        Self {
            inner: RwLock::new(map),
        }
    }

    pub fn get(&self, namespace: &str, key: &str) -> Option<Value> {
        self.inner
            .read()
            .get(namespace)
            .and_then(|ns| ns.get(key))
            .cloned()
    }

    pub fn get_str(&self, namespace: &str, key: &str) -> Option<String> {
        match self.get(namespace, key)? {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn get_u64(&self, namespace: &str, key: &str) -> Option<u64> {
        match self.get(namespace, key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn set(&self, namespace: &str, key: &str, value: impl Into<Value>) {
        self.inner
            .write()
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    pub fn remove(&self, namespace: &str, key: &str) -> Option<Value> {
        let mut map = self.inner.write();
        let ns = map.get_mut(namespace)?;
        let removed = ns.remove(key);
        if ns.is_empty() {
            map.remove(namespace);
        }
        removed
    }

    pub fn global_str(&self, key: &str) -> Option<String> {
        self.get_str(GLOBAL, key)
    }

    pub fn set_global(&self, key: &str, value: impl Into<Value>) {
        self.set(GLOBAL, key, value)
    }

    pub fn snapshot(&self) -> SettingsMap {
        self.inner.read().clone()
    }
}
