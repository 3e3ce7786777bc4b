use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::registry::{Capability, Entity, LazyEntity};
use crate::settings::{Settings, SettingsMap};
use crate::EntityId;

/// An RFID tag. Ownership lives in the `global.OwnerAccount` setting.
pub struct Ztamp {
    id: EntityId,
    settings: Settings,
    plugins: RwLock<Vec<String>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ZtampRecord {
    #[serde(default)]
    pub settings: SettingsMap,
    #[serde(default)]
    pub plugins: Vec<String>,
}

impl Ztamp {
    pub const OWNER_KEY: &'static str = "OwnerAccount";
    pub const NAME_KEY: &'static str = "ZtampName";

    pub fn id(&self) -> &EntityId {
        &self.id
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Display name, falling back to the serial.
    pub fn name(&self) -> String {
        self.settings
            .global_str(Self::NAME_KEY)
            .unwrap_or_else(|| self.id.to_hex())
    }

    pub fn owner(&self) -> Option<String> {
        self.settings.global_str(Self::OWNER_KEY)
    }

    pub fn set_owner(&self, login: Option<&str>) {
        match login {
            Some(login) => self.settings.set_global(Self::OWNER_KEY, login),
            None => {
                self.settings.remove(crate::GLOBAL, Self::OWNER_KEY);
            }
        }
    }

    /// Plugins that claimed interaction rights over this tag.
    pub fn plugins(&self) -> Vec<String> {
        self.plugins.read().clone()
    }

    pub fn has_plugin(&self, name: &str) -> bool {
        self.plugins.read().iter().any(|p| p == name)
    }

    pub fn add_plugin(&self, name: &str) -> bool {
        let mut plugins = self.plugins.write();
        if plugins.iter().any(|p| p == name) {
            return false;
        }
        plugins.push(name.to_string());
        true
    }

    pub fn remove_plugin(&self, name: &str) -> bool {
        let mut plugins = self.plugins.write();
        let before = plugins.len();
        plugins.retain(|p| p != name);
        plugins.len() != before
    }
}

impl Entity for Ztamp {
    const KIND: &'static str = "ztamp";
    type Record = ZtampRecord;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn to_record(&self) -> ZtampRecord {
        ZtampRecord {
            settings: self.settings.snapshot(),
            plugins: self.plugins(),
        }
    }

    fn from_record(id: EntityId, record: ZtampRecord) -> Self {
        Self {
            id,
            settings: Settings::from_map(record.settings),
            plugins: RwLock::new(record.plugins),
        }
    }

    fn admits(&self, holder: &Capability<'_>) -> bool {
        !holder.scoped || self.has_plugin(holder.holder)
    }
}

impl LazyEntity for Ztamp {
    fn create(id: EntityId) -> Self {
        Self::from_record(id, ZtampRecord::default())
    }
}
