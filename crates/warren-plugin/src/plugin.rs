//! The capability interface every plugin implements.
//!
//! All hooks are synchronous and default to no-ops, so a plugin only
//! overrides what it reacts to. Hooks run outside every registry lock.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use warren_db::{Account, Bunny, EntityId};

use crate::api::{ApiCall, ApiError, ApiResult};
use crate::host_functions::HostContext;
use crate::http::{HttpRequest, HttpResponse};
use crate::packet::Packet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PluginType {
    /// System plugin that can never be deactivated.
    Required,
    System,
    /// Only acts on devices that activated it.
    BunnyPlugin,
    /// System plugin restricted to the tags that granted it access.
    ZtampPlugin,
}

impl PluginType {
    /// Everything but [`PluginType::BunnyPlugin`] receives system events.
    pub fn is_system(self) -> bool {
        self != PluginType::BunnyPlugin
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PluginType::Required => "required",
            PluginType::System => "system",
            PluginType::BunnyPlugin => "bunny",
            PluginType::ZtampPlugin => "ztamp",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickType {
    Single,
    Double,
}

impl ClickType {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(ClickType::Single),
            2 => Some(ClickType::Double),
            _ => None,
        }
    }
}

pub trait Plugin: Send + Sync + 'static {
    /// Unique registry key.
    fn name(&self) -> &str;

    fn visual_name(&self) -> &str;

    fn plugin_type(&self) -> PluginType {
        PluginType::BunnyPlugin
    }

    fn enabled_by_default(&self) -> bool {
        true
    }

    /// Returning false aborts the load; the instance is dropped.
    fn init(&self, _host: HostContext) -> bool {
        true
    }

    fn http_request_before(&self, _req: &HttpRequest) {}

    /// Returning a response stops the handle phase.
    fn http_request_handle(&self, _req: &HttpRequest) -> Option<HttpResponse> {
        None
    }

    fn http_request_after(&self, _req: &HttpRequest) {}

    fn xmpp_bunny_message(&self, _bunny: &Arc<Bunny>, _stanza: &str) {}

    fn xmpp_violet_message(&self, _bunny: &Arc<Bunny>, _stanza: &str) {}

    /// Vote to drop a packet on its way from Violet to the device.
    fn xmpp_violet_packet(&self, _bunny: &Arc<Bunny>, _packet: &Packet) -> bool {
        false
    }

    fn on_click(&self, _bunny: &Arc<Bunny>, _click: ClickType) -> bool {
        false
    }

    fn on_ears_move(&self, _bunny: &Arc<Bunny>, _left: u8, _right: u8) -> bool {
        false
    }

    fn on_rfid(&self, _bunny: &Arc<Bunny>, _tag: &EntityId) -> bool {
        false
    }

    fn on_bunny_connect(&self, _bunny: &Arc<Bunny>) {}

    fn on_bunny_disconnect(&self, _bunny: &Arc<Bunny>) {}

    /// Calls served at `/ojn/api/plugin/<name>/<call>`.
    fn api_calls(&self) -> Vec<ApiCall> {
        Vec::new()
    }

    /// Calls served at `/ojn/api/bunny/<serial>/<name>/<call>`.
    fn bunny_api_calls(&self) -> Vec<ApiCall> {
        Vec::new()
    }

    fn api_call(&self, call: &str, _account: &Account, _req: &HttpRequest) -> ApiResult {
        Err(ApiError::new(format!("Unknown api call : {call}")))
    }

    fn bunny_api_call(
        &self,
        call: &str,
        _account: &Account,
        _bunny: &Arc<Bunny>,
        _req: &HttpRequest,
    ) -> ApiResult {
        Err(ApiError::new(format!("Unknown api call : {call}")))
    }
}
