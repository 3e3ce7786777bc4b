//! Event dispatcher: routes every session event through the enabled plugins.
//!
//! Each entry point snapshots the enabled plugins of its audience in
//! registration order, then folds their answers with the event's
//! [`Combine`] rule. A panicking hook is logged and counts as "no".

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use warren_db::{Bunny, EntityId};

use crate::events::{Audience, Combine, Event};
use crate::http::{HttpRequest, HttpResponse};
use crate::packet::Packet;
use crate::plugin::{ClickType, Plugin, PluginType};
use crate::registry::{PluginHandle, PluginRegistry};

/// Run one plugin hook, containing any panic it raises.
pub(crate) fn guarded<R>(plugin: &str, hook: &'static str, f: impl FnOnce() -> R) -> Option<R> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".into());
            tracing::error!(plugin = %plugin, hook, reason = %reason, "plugin hook panicked");
            None
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<PluginRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    fn snapshot(&self, audience: Audience) -> Vec<PluginHandle> {
        self.registry
            .enabled()
            .into_iter()
            .filter(|h| audience == Audience::All || h.plugin_type().is_system())
            .collect()
    }

    /// The device's bound bunny plugins that are still loaded and enabled.
    fn device_plugins(&self, bunny: &Bunny) -> Vec<PluginHandle> {
        bunny
            .bound_plugins()
            .iter()
            .filter_map(|name| self.registry.get(name))
            .filter(|h| h.plugin_type() == PluginType::BunnyPlugin && h.is_enabled())
            .collect()
    }

    fn fold(event: Event, plugins: &[PluginHandle], call: &dyn Fn(&dyn Plugin) -> bool) -> bool {
        let mut outcome = false;
        for handle in plugins {
            let vote = guarded(handle.name(), event.name(), || call(handle.plugin())).unwrap_or(false);
            match event.combine() {
                Combine::Broadcast => {}
                Combine::FirstResponder if vote => {
                    tracing::debug!(plugin = %handle.name(), event = event.name(), "event consumed");
                    return true;
                }
                Combine::FirstResponder => {}
                Combine::AnyVote => outcome |= vote,
            }
        }
        outcome
    }

    fn dispatch(
        &self,
        event: Event,
        bunny: Option<&Arc<Bunny>>,
        call: &dyn Fn(&dyn Plugin) -> bool,
    ) -> bool {
        let plugins = self.snapshot(event.audience());
        let outcome = Self::fold(event, &plugins, call);
        let Some(bunny) = bunny.filter(|_| event.reaches_device_plugins()) else {
            return outcome;
        };
        if outcome && event.combine() == Combine::FirstResponder {
            return true;
        }
        let device = self.device_plugins(bunny);
        Self::fold(event, &device, call) || outcome
    }

    // ── HTTP ─────────────────────────────────────────────────────────

    pub fn http_request_before(&self, req: &HttpRequest) {
        self.dispatch(Event::HttpRequestBefore, None, &|p: &dyn Plugin| {
            p.http_request_before(req);
            false
        });
    }

    /// First plugin response wins; `None` means the default handler runs.
    pub fn http_request_handle(&self, req: &HttpRequest) -> Option<HttpResponse> {
        let event = Event::HttpRequestHandle;
        for handle in self.snapshot(event.audience()) {
            if let Some(Some(response)) =
                guarded(handle.name(), event.name(), || handle.plugin().http_request_handle(req))
            {
                tracing::debug!(plugin = %handle.name(), path = %req.path(), "request handled by plugin");
                return Some(response);
            }
        }
        None
    }

    pub fn http_request_after(&self, req: &HttpRequest) {
        self.dispatch(Event::HttpRequestAfter, None, &|p: &dyn Plugin| {
            p.http_request_after(req);
            false
        });
    }

    // ── XMPP relay ───────────────────────────────────────────────────

    pub fn xmpp_bunny_message(&self, bunny: &Arc<Bunny>, stanza: &str) {
        self.dispatch(Event::XmppBunnyMessage, Some(bunny), &|p: &dyn Plugin| {
            p.xmpp_bunny_message(bunny, stanza);
            false
        });
    }

    pub fn xmpp_violet_message(&self, bunny: &Arc<Bunny>, stanza: &str) {
        self.dispatch(Event::XmppVioletMessage, Some(bunny), &|p: &dyn Plugin| {
            p.xmpp_violet_message(bunny, stanza);
            false
        });
    }

    /// True if any enabled system plugin wants the packet dropped.
    pub fn xmpp_violet_packet(&self, bunny: &Arc<Bunny>, packet: &Packet) -> bool {
        self.dispatch(Event::XmppVioletPacket, Some(bunny), &|p: &dyn Plugin| {
            p.xmpp_violet_packet(bunny, packet)
        })
    }

    // ── Device input ─────────────────────────────────────────────────

    pub fn on_click(&self, bunny: &Arc<Bunny>, click: ClickType) -> bool {
        self.dispatch(Event::Click, Some(bunny), &|p: &dyn Plugin| p.on_click(bunny, click))
    }

    pub fn on_ears_move(&self, bunny: &Arc<Bunny>, left: u8, right: u8) -> bool {
        self.dispatch(Event::EarsMove, Some(bunny), &|p: &dyn Plugin| {
            p.on_ears_move(bunny, left, right)
        })
    }

    pub fn on_rfid(&self, bunny: &Arc<Bunny>, tag: &EntityId) -> bool {
        self.dispatch(Event::Rfid, Some(bunny), &|p: &dyn Plugin| p.on_rfid(bunny, tag))
    }

    // ── Device lifecycle ─────────────────────────────────────────────

    pub fn on_bunny_connect(&self, bunny: &Arc<Bunny>) {
        tracing::info!(bunny = %bunny.id(), "bunny connected");
        self.dispatch(Event::BunnyConnect, Some(bunny), &|p: &dyn Plugin| {
            p.on_bunny_connect(bunny);
            false
        });
    }

    pub fn on_bunny_disconnect(&self, bunny: &Arc<Bunny>) {
        tracing::info!(bunny = %bunny.id(), "bunny disconnected");
        self.dispatch(Event::BunnyDisconnect, Some(bunny), &|p: &dyn Plugin| {
            p.on_bunny_disconnect(bunny);
            false
        });
    }
}
