//! One device connection: relay between the bunny and Violet, with every
//! unit passed through the dispatcher on the way.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use base64::prelude::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use warren_db::{Bunny, EntityId};
use warren_plugin::packet;
use warren_plugin::{ClickType, Dispatcher};

use super::stanza::{self, StanzaSplitter, MAX_UNIT};
use crate::state::AppState;

const VIOLET_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifetime of a packet pushed to a device, in seconds.
const PACKET_TTL: u32 = 604_800;

const SASL_NS: &str = "urn:ietf:params:xml:ns:xmpp-sasl";

/// A device attached to this session. Dropping it detaches the device and
/// dispatches `on_bunny_disconnect`, however the session ended.
struct Link {
    bunny: Arc<Bunny>,
    generation: u64,
    dispatcher: Dispatcher,
}

impl Drop for Link {
    fn drop(&mut self) {
        if self.bunny.disconnect(self.generation) {
            self.dispatcher.on_bunny_disconnect(&self.bunny);
            tracing::info!(bunny = %self.bunny.id(), "bunny disconnected");
        }
    }
}

struct Session {
    state: Arc<AppState>,
    peer: SocketAddr,
    outbox: mpsc::UnboundedSender<Vec<u8>>,
    link: Option<Link>,
    violet: Option<OwnedWriteHalf>,
    /// Bytes for the device, flushed after each event.
    to_bunny: Vec<u8>,
    authenticated: bool,
    next_id: u32,
    closing: bool,
}

/// Serve one device until it leaves, fails, or the server shuts down.
pub async fn run(
    state: Arc<AppState>,
    socket: TcpStream,
    peer: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) {
    let (mut reader, mut writer) = socket.into_split();
    let (outbox, mut queued) = mpsc::unbounded_channel();

    let (mut violet_reader, violet_writer) = match connect_violet(&state).await {
        Some((r, w)) => (Some(r), Some(w)),
        None => (None, None),
    };

    let mut session = Session {
        state,
        peer,
        outbox,
        link: None,
        violet: violet_writer,
        to_bunny: Vec::new(),
        authenticated: false,
        next_id: 0,
        closing: false,
    };
    let mut from_bunny = StanzaSplitter::new(MAX_UNIT);
    let mut from_violet = StanzaSplitter::new(MAX_UNIT);
    let mut buf = vec![0u8; 4096];
    let mut violet_buf = vec![0u8; 4096];

    tracing::debug!(%peer, "device session started");

    loop {
        tokio::select! {
            _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => break,
            read = reader.read(&mut buf) => {
                let n = match read {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) => {
                        tracing::debug!(%peer, error = %e, "device read failed");
                        break;
                    }
                };
                match from_bunny.push(&buf[..n]) {
                    Ok(units) => {
                        for unit in units {
                            session.from_bunny(&unit).await;
                        }
                    }
                    Err(e) => tracing::warn!(%peer, error = %e, "dropping oversized stanza"),
                }
            }
            read = read_upstream(&mut violet_reader, &mut violet_buf) => {
                match read {
                    Ok(n) if n > 0 => match from_violet.push(&violet_buf[..n]) {
                        Ok(units) => {
                            for unit in units {
                                session.from_violet(&unit);
                            }
                        }
                        Err(e) => tracing::warn!(%peer, error = %e, "dropping oversized violet stanza"),
                    },
                    result => {
                        if let Err(e) = result {
                            tracing::warn!(%peer, error = %e, "violet connection failed");
                        } else {
                            tracing::info!(%peer, "violet closed the connection");
                        }
                        violet_reader = None;
                        session.violet = None;
                    }
                }
            }
            Some(frame) = queued.recv() => session.push_packet(&frame),
        }

        if !session.to_bunny.is_empty() {
            let out = std::mem::take(&mut session.to_bunny);
            if let Err(e) = writer.write_all(&out).await {
                tracing::debug!(%peer, error = %e, "device write failed");
                break;
            }
        }
        if session.closing {
            break;
        }
    }

    // Dropping the session drops its link: disconnect is dispatched here.
    drop(session);
    tracing::debug!(%peer, "device session ended");
}

async fn connect_violet(state: &AppState) -> Option<(OwnedReadHalf, OwnedWriteHalf)> {
    if state.config.standalone {
        return None;
    }
    let addr = state.config.violet_xmpp_addr.as_str();
    match tokio::time::timeout(VIOLET_CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Some(stream.into_split()),
        Ok(Err(e)) => {
            tracing::warn!(addr, error = %e, "can't reach violet, answering locally");
            None
        }
        Err(_) => {
            tracing::warn!(addr, "violet connection timed out, answering locally");
            None
        }
    }
}

/// Read from Violet, or wait forever when there is no upstream.
async fn read_upstream(upstream: &mut Option<OwnedReadHalf>, buf: &mut [u8]) -> std::io::Result<usize> {
    match upstream {
        Some(reader) => reader.read(buf).await,
        None => std::future::pending().await,
    }
}

impl Session {
    fn bunny(&self) -> Option<Arc<Bunny>> {
        self.link.as_ref().map(|l| l.bunny.clone())
    }

    fn attach(&mut self, id: EntityId) {
        let Some(bunny) = self.state.entities.bunnies.get(&id) else {
            return;
        };
        let dispatcher = self.state.dispatcher.clone();
        let (generation, replaced) = bunny.take_over(self.outbox.clone());
        if replaced {
            tracing::info!(bunny = %id, "replacing the previous session of this bunny");
            dispatcher.on_bunny_disconnect(&bunny);
        }
        self.link = Some(Link {
            bunny: bunny.clone(),
            generation,
            dispatcher: dispatcher.clone(),
        });
        tracing::info!(bunny = %id, peer = %self.peer, "bunny connected");
        dispatcher.on_bunny_connect(&bunny);
    }

    // ─── Bunny → Violet ─────────────────────────────────────────────

    async fn from_bunny(&mut self, unit: &str) {
        if self.link.is_none() {
            if let Some(id) = stanza::device_id(unit) {
                self.attach(id);
            }
        }

        let relay = match self.bunny() {
            Some(bunny) => {
                if let Some(resource) = stanza::resource(unit) {
                    bunny.set_idle(resource == "idle");
                }
                self.dispatch_from_bunny(&bunny, unit)
            }
            None => true,
        };
        if !relay {
            return;
        }

        let rewritten = {
            let config = &self.state.config;
            stanza::rewrite_domain(unit, &config.domain, config.violet_domain())
        };
        match self.violet.as_mut() {
            Some(violet) => {
                if let Err(e) = violet.write_all(rewritten.as_bytes()).await {
                    tracing::warn!(peer = %self.peer, error = %e, "violet write failed");
                    self.violet = None;
                }
            }
            None => self.answer_locally(unit),
        }
    }

    /// One dispatch per unit. False when a plugin consumed it.
    fn dispatch_from_bunny(&self, bunny: &Arc<Bunny>, unit: &str) -> bool {
        let dispatcher = &self.state.dispatcher;
        if stanza::root_name(unit) == "message" {
            if let Some(code) = stanza::element_text(unit, "clic") {
                return match code.parse().ok().and_then(ClickType::from_code) {
                    Some(click) => !dispatcher.on_click(bunny, click),
                    None => {
                        tracing::warn!(bunny = %bunny.id(), code, "unknown click type");
                        true
                    }
                };
            }
            if stanza::contains_element(unit, "ears") {
                let left: Option<u8> =
                    stanza::element_text(unit, "left").and_then(|v| v.parse().ok());
                let right: Option<u8> =
                    stanza::element_text(unit, "right").and_then(|v| v.parse().ok());
                return match (left, right) {
                    (Some(left), Some(right)) => !dispatcher.on_ears_move(bunny, left, right),
                    _ => {
                        tracing::warn!(bunny = %bunny.id(), "malformed ears message");
                        true
                    }
                };
            }
        }
        dispatcher.xmpp_bunny_message(bunny, unit);
        true
    }

    // ─── Violet → Bunny ─────────────────────────────────────────────

    fn from_violet(&mut self, unit: &str) {
        let unit = {
            let config = &self.state.config;
            stanza::rewrite_domain(unit, config.violet_domain(), &config.domain)
        };
        if let Some(bunny) = self.bunny() {
            let payload = stanza::element_text(&unit, "packet")
                .filter(|_| stanza::root_name(&unit) == "message");
            match payload {
                Some(payload) => match self.filter_packets(&bunny, payload) {
                    Some(kept) if kept == payload => {}
                    Some(kept) => {
                        let unit = unit.replacen(payload, &kept, 1);
                        self.to_bunny.extend_from_slice(unit.as_bytes());
                        return;
                    }
                    None => return,
                },
                None => self.state.dispatcher.xmpp_violet_message(&bunny, &unit),
            }
        }
        self.to_bunny.extend_from_slice(unit.as_bytes());
    }

    /// Run every block of a base64 packet past the plugins. Returns the
    /// payload to forward, or `None` when nothing is left of it.
    fn filter_packets(&self, bunny: &Arc<Bunny>, payload: &str) -> Option<String> {
        let blocks = BASE64_STANDARD
            .decode(payload)
            .map_err(|e| e.to_string())
            .and_then(|bytes| packet::decode(&bytes).map_err(|e| e.to_string()));
        let blocks = match blocks {
            Ok(blocks) => blocks,
            Err(e) => {
                tracing::warn!(bunny = %bunny.id(), error = %e, "dropping malformed violet packet");
                return None;
            }
        };
        let total = blocks.len();
        let kept: Vec<_> = blocks
            .into_iter()
            .filter(|p| !self.state.dispatcher.xmpp_violet_packet(bunny, p))
            .collect();
        if kept.is_empty() {
            tracing::debug!(bunny = %bunny.id(), "violet packet dropped");
            return None;
        }
        if kept.len() == total {
            return Some(payload.to_string());
        }
        Some(BASE64_STANDARD.encode(packet::encode(&kept)))
    }

    // ─── Server → Bunny ─────────────────────────────────────────────

    /// Wrap a packet queued by a plugin into a message for the device.
    fn push_packet(&mut self, frame: &[u8]) {
        let Some(bunny) = self.bunny() else {
            return;
        };
        self.next_id = self.next_id.wrapping_add(1);
        let domain = &self.state.config.domain;
        let stanza = format!(
            "<message from=\"net.violet.platform@{domain}/idle\" to=\"{id}@{domain}/idle\" id=\"{n}\">\
             <packet xmlns=\"violet:packet\" format=\"1.0\" ttl=\"{PACKET_TTL}\">{payload}</packet>\
             </message>",
            id = bunny.id(),
            n = self.next_id,
            payload = BASE64_STANDARD.encode(frame),
        );
        self.to_bunny.extend_from_slice(stanza.as_bytes());
    }

    /// Minimal XMPP server side, used when there is no Violet to relay to.
    fn answer_locally(&mut self, unit: &str) {
        let domain = self.state.config.domain.clone();
        let reply = match stanza::root_name(unit) {
            _ if stanza::is_stream_close(unit) => {
                self.closing = true;
                "</stream:stream>".to_string()
            }
            "stream:stream" => {
                self.next_id = self.next_id.wrapping_add(1);
                let features = if self.authenticated {
                    "<stream:features>\
                     <bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'><required/></bind>\
                     <session xmlns='urn:ietf:params:xml:ns:xmpp-session'/>\
                     </stream:features>"
                        .to_string()
                } else {
                    format!(
                        "<stream:features><mechanisms xmlns='{SASL_NS}'>\
                         <mechanism>DIGEST-MD5</mechanism></mechanisms></stream:features>"
                    )
                };
                format!(
                    "<?xml version='1.0'?><stream:stream xmlns='jabber:client' \
                     xmlns:stream='http://etherx.jabber.org/streams' id='{}' from='{domain}' \
                     version='1.0'>{features}",
                    self.next_id
                )
            }
            "auth" => {
                let nonce = rand::random::<u64>();
                let challenge = format!(
                    "nonce=\"{nonce}\",qop=\"auth\",charset=utf-8,algorithm=md5-sess"
                );
                format!(
                    "<challenge xmlns='{SASL_NS}'>{}</challenge>",
                    BASE64_STANDARD.encode(challenge)
                )
            }
            "response" => {
                if stanza::element_text(unit, "response").is_some_and(|t| !t.is_empty()) {
                    format!(
                        "<challenge xmlns='{SASL_NS}'>{}</challenge>",
                        BASE64_STANDARD.encode("rspauth=")
                    )
                } else {
                    self.authenticated = true;
                    format!("<success xmlns='{SASL_NS}'/>")
                }
            }
            "iq" if matches!(stanza::root_attr(unit, "type"), Some("get" | "set")) => {
                let id = stanza::root_attr(unit, "id").unwrap_or("");
                match (stanza::contains_element(unit, "bind"), self.bunny()) {
                    (true, Some(bunny)) => {
                        let resource = stanza::resource(unit).unwrap_or("idle");
                        format!(
                            "<iq id='{id}' type='result'>\
                             <bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'>\
                             <jid>{}@{domain}/{resource}</jid></bind></iq>",
                            bunny.id()
                        )
                    }
                    _ => format!("<iq id='{id}' type='result'/>"),
                }
            }
            _ => return,
        };
        self.to_bunny.extend_from_slice(reply.as_bytes());
    }
}
