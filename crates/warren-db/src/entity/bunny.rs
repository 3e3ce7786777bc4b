use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::registry::{Entity, LazyEntity};
use crate::settings::{Settings, SettingsMap};
use crate::EntityId;

/// A network-attached device. Settings and activated plugins persist;
/// the link to a live session does not.
pub struct Bunny {
    id: EntityId,
    settings: Settings,
    plugins: RwLock<Vec<String>>,
    link: Mutex<Link>,
}

#[derive(Default)]
struct Link {
    connected: bool,
    idle: bool,
    generation: u64,
    outbox: Option<UnboundedSender<Vec<u8>>>,
    bound: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BunnyRecord {
    #[serde(default)]
    pub settings: SettingsMap,
    #[serde(default)]
    pub plugins: Vec<String>,
}

impl Bunny {
    pub const NAME_KEY: &'static str = "BunnyName";

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

    pub fn set_name(&self, name: &str) {
        self.settings.set_global(Self::NAME_KEY, name);
    }

    pub fn is_connected(&self) -> bool {
        self.link.lock().connected
    }

    pub fn is_idle(&self) -> bool {
        let link = self.link.lock();
        link.connected && link.idle
    }

    pub fn set_idle(&self, idle: bool) {
        self.link.lock().idle = idle;
    }

    /// Attach a live session. Returns the generation the session must hand
    /// back to [`Bunny::disconnect`].
    pub fn connect(&self, outbox: UnboundedSender<Vec<u8>>) -> u64 {
        self.take_over(outbox).0
    }

    /// [`Bunny::connect`], also telling whether an older session was still
    /// attached. That session's generation is retired.
    pub fn take_over(&self, outbox: UnboundedSender<Vec<u8>>) -> (u64, bool) {
        let mut link = self.link.lock();
        let replaced = link.connected;
        link.connected = true;
        link.idle = false;
        link.generation += 1;
        link.outbox = Some(outbox);
        (link.generation, replaced)
    }

    /// Wipe connection state if `generation` is still the current session.
    pub fn disconnect(&self, generation: u64) -> bool {
        let mut link = self.link.lock();
        if link.generation != generation || !link.connected {
            return false;
        }
        link.connected = false;
        link.idle = false;
        link.outbox = None;
        true
    }

    /// Queue an encoded packet for the device. False when nothing is listening.
    pub fn send_packet(&self, packet: Vec<u8>) -> bool {
        let link = self.link.lock();
        match &link.outbox {
            Some(tx) => tx.send(packet).is_ok(),
            None => false,
        }
    }

    pub fn activated_plugins(&self) -> Vec<String> {
        self.plugins.read().clone()
    }

    pub fn has_plugin(&self, name: &str) -> bool {
        self.plugins.read().iter().any(|p| p == name)
    }

    pub fn activate(&self, name: &str) -> bool {
        let mut plugins = self.plugins.write();
        if plugins.iter().any(|p| p == name) {
            return false;
        }
        plugins.push(name.to_string());
        true
    }

    pub fn deactivate(&self, name: &str) -> bool {
        let mut plugins = self.plugins.write();
        let before = plugins.len();
        plugins.retain(|p| p != name);
        plugins.len() != before
    }

    /// A plugin was loaded. Binds it if this device activated it.
    pub fn plugin_loaded(&self, name: &str) -> bool {
        if !self.has_plugin(name) {
            return false;
        }
        let mut link = self.link.lock();
        if link.bound.iter().any(|p| p == name) {
            return false;
        }
        link.bound.push(name.to_string());
        true
    }

    /// A plugin was unloaded. Returns whether it had been bound.
    pub fn plugin_unloaded(&self, name: &str) -> bool {
        let mut link = self.link.lock();
        let before = link.bound.len();
        link.bound.retain(|p| p != name);
        link.bound.len() != before
    }

    pub fn bound_plugins(&self) -> Vec<String> {
        self.link.lock().bound.clone()
    }
}

impl Entity for Bunny {
    const KIND: &'static str = "bunny";
    type Record = BunnyRecord;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn to_record(&self) -> BunnyRecord {
        BunnyRecord {
            settings: self.settings.snapshot(),
            plugins: self.activated_plugins(),
        }
    }

    fn from_record(id: EntityId, record: BunnyRecord) -> Self {
        Self {
            id,
            settings: Settings::from_map(record.settings),
            plugins: RwLock::new(record.plugins),
            link: Mutex::new(Link::default()),
        }
    }
}

impl LazyEntity for Bunny {
    fn create(id: EntityId) -> Self {
        Self::from_record(id, BunnyRecord::default())
    }
}
