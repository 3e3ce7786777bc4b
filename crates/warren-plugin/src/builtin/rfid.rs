use std::sync::{Arc, OnceLock};

use warren_db::{Bunny, EntityId};

use crate::host_functions::HostContext;
use crate::plugin::{Plugin, PluginType};

pub const NAME: &str = "rfid";

/// Setting of the tag recording which bunny saw it last.
pub const LAST_SEEN_BY: &str = "LastSeenBy";

/// Records every tag sighting on the tag itself. Never consumes the event.
#[derive(Default)]
pub struct Rfid {
    host: OnceLock<HostContext>,
}

pub fn create() -> Box<dyn Plugin> {
    Box::new(Rfid::default())
}

impl Plugin for Rfid {
    fn name(&self) -> &str {
        NAME
    }

    fn visual_name(&self) -> &str {
        "Keeps track of RFID tag sightings"
    }

    fn plugin_type(&self) -> PluginType {
        PluginType::Required
    }

    fn init(&self, host: HostContext) -> bool {
        self.host.set(host).is_ok()
    }

    fn on_rfid(&self, bunny: &Arc<Bunny>, tag: &EntityId) -> bool {
        let Some(host) = self.host.get() else {
            return false;
        };
        if let Some(ztamp) = host.ztamp(tag) {
            ztamp.settings().set_global(LAST_SEEN_BY, bunny.id().to_hex());
            tracing::info!(bunny = %bunny.id(), ztamp = %tag, "ztamp seen");
        }
        false
    }
}
