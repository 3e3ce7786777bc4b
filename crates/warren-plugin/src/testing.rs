//! Scriptable plugin used by the unit tests.

use std::sync::Arc;

use parking_lot::Mutex;
use warren_db::{Account, Bunny, EntityId};

use crate::api::{ApiAnswer, ApiCall, ApiResult};
use crate::catalog::PluginCatalog;
use crate::host_functions::HostContext;
use crate::http::{HttpRequest, HttpResponse};
use crate::packet::Packet;
use crate::plugin::{ClickType, Plugin, PluginType};

#[derive(Clone, Default)]
pub(crate) struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    fn push(&self, entry: String) {
        self.0.lock().push(entry);
    }

    pub(crate) fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock())
    }
}

#[derive(Clone)]
pub(crate) struct Scripted {
    pub name: &'static str,
    pub kind: PluginType,
    pub visual: String,
    pub log: CallLog,
    pub init_ok: bool,
    pub consumes: bool,
    pub drops: bool,
    pub responds: bool,
    pub panics: bool,
}

impl Scripted {
    pub(crate) fn new(name: &'static str, kind: PluginType, log: &CallLog) -> Self {
        Self {
            name,
            kind,
            visual: format!("Scripted {name}"),
            log: log.clone(),
            init_ok: true,
            consumes: false,
            drops: false,
            responds: false,
            panics: false,
        }
    }

    fn record(&self, hook: &str, bunny: Option<&Bunny>) {
        let entry = match bunny {
            Some(b) => format!("{}:{hook}:{}", self.name, b.id()),
            None => format!("{}:{hook}", self.name),
        };
        self.log.push(entry);
        if self.panics {
            panic!("{} blew up in {hook}", self.name);
        }
    }
}

impl Plugin for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    fn visual_name(&self) -> &str {
        &self.visual
    }

    fn plugin_type(&self) -> PluginType {
        self.kind
    }

    fn init(&self, _host: HostContext) -> bool {
        self.init_ok
    }

    fn http_request_before(&self, _req: &HttpRequest) {
        self.record("before", None);
    }

    fn http_request_handle(&self, _req: &HttpRequest) -> Option<HttpResponse> {
        self.record("handle", None);
        self.responds
            .then(|| HttpResponse::ok("text/plain", self.name.as_bytes().to_vec()))
    }

    fn http_request_after(&self, _req: &HttpRequest) {
        self.record("after", None);
    }

    fn xmpp_violet_packet(&self, bunny: &Arc<Bunny>, _packet: &Packet) -> bool {
        self.record("packet", Some(bunny));
        self.drops
    }

    fn on_click(&self, bunny: &Arc<Bunny>, _click: ClickType) -> bool {
        self.record("on_click", Some(bunny));
        self.consumes
    }

    fn on_rfid(&self, bunny: &Arc<Bunny>, _tag: &EntityId) -> bool {
        self.record("on_rfid", Some(bunny));
        self.consumes
    }

    fn on_bunny_connect(&self, bunny: &Arc<Bunny>) {
        self.record("on_bunny_connect", Some(bunny));
    }

    fn on_bunny_disconnect(&self, bunny: &Arc<Bunny>) {
        self.record("on_bunny_disconnect", Some(bunny));
    }

    fn api_calls(&self) -> Vec<ApiCall> {
        vec![ApiCall::public("ping()")]
    }

    fn api_call(&self, call: &str, _account: &Account, _req: &HttpRequest) -> ApiResult {
        Ok(ApiAnswer::ok(format!("{} {call}", self.name)))
    }
}

/// Catalog where every plugin is loadable under its own name.
pub(crate) fn catalog_with(plugins: Vec<Scripted>) -> PluginCatalog {
    let mut catalog = PluginCatalog::new();
    for plugin in plugins {
        let source = plugin.name;
        catalog.register(source, move || Box::new(plugin.clone()));
    }
    catalog
}
