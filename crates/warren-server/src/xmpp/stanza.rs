//! Splitting an XMPP byte stream into units, and the few lookups the
//! session needs on them.
//!
//! A unit is one top-level element, a stream header or trailer, or an XML
//! declaration. Devices only ever send small flat stanzas, so the lookups
//! below work on the raw text instead of building a tree.

use base64::prelude::*;
use bytes::BytesMut;
use warren_db::EntityId;

/// Default cap on an incomplete unit.
pub const MAX_UNIT: usize = 64 * 1024;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("stanza exceeds {0} bytes")]
pub struct Overflow(pub usize);

pub struct StanzaSplitter {
    buf: BytesMut,
    limit: usize,
}

impl StanzaSplitter {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            limit,
        }
    }

    /// Feed bytes, returning every unit they complete.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<String>, Overflow> {
        self.buf.extend_from_slice(data);
        let mut units = Vec::new();
        loop {
            // Text between top-level units is whitespace keep-alive or noise.
            match self.buf.iter().position(|&b| b == b'<') {
                Some(0) => {}
                Some(lt) => {
                    let _ = self.buf.split_to(lt);
                }
                None => {
                    self.buf.clear();
                    break;
                }
            }
            let Some(end) = unit_end(&self.buf) else {
                break;
            };
            let unit = self.buf.split_to(end);
            units.push(String::from_utf8_lossy(&unit).into_owned());
        }
        if self.buf.len() > self.limit {
            self.buf.clear();
            return Err(Overflow(self.limit));
        }
        Ok(units)
    }
}

/// Index one past the `>` closing the tag that starts at `from`.
fn tag_end(buf: &[u8], from: usize) -> Option<usize> {
    let mut quote = None;
    for (i, &b) in buf[from..].iter().enumerate() {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return Some(from + i + 1),
            None => {}
        }
    }
    None
}

/// Length of the complete unit at the start of `buf`, which begins with `<`.
fn unit_end(buf: &[u8]) -> Option<usize> {
    let mut depth = 0usize;
    let mut pos = 0;
    loop {
        let lt = pos + buf[pos..].iter().position(|&b| b == b'<')?;
        let end = tag_end(buf, lt)?;
        let tag = &buf[lt..end];
        if tag.starts_with(b"<?") || tag.starts_with(b"<!") {
            if depth == 0 {
                return Some(end);
            }
        } else if tag.starts_with(b"</") {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return Some(end);
            }
        } else if tag.ends_with(b"/>") || tag.starts_with(b"<stream:stream") {
            if depth == 0 {
                return Some(end);
            }
        } else {
            depth += 1;
        }
        pos = end;
    }
}

// ─── Lookups ────────────────────────────────────────────────────────────

/// Name of the unit's root element, `stream:stream` included.
pub fn root_name(unit: &str) -> &str {
    let rest = unit.trim_start().trim_start_matches('<');
    let rest = rest.strip_prefix('/').unwrap_or(rest);
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .unwrap_or(rest.len());
    &rest[..end]
}

pub fn is_stream_close(unit: &str) -> bool {
    unit.trim_start().starts_with("</stream:stream")
}

/// Attribute of the root element.
pub fn root_attr<'a>(unit: &'a str, name: &str) -> Option<&'a str> {
    let open = &unit[..tag_end(unit.as_bytes(), 0)?];
    attr_in(open, name)
}

fn attr_in<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let mut search = 0;
    while let Some(found) = tag[search..].find(name) {
        let at = search + found;
        search = at + name.len();
        let preceded = tag[..at].ends_with(|c: char| c.is_whitespace() || c == ',');
        let rest = tag[search..].trim_start();
        let Some(rest) = rest.strip_prefix('=') else {
            continue;
        };
        let rest = rest.trim_start();
        let Some(quote) = rest.chars().next().filter(|c| *c == '"' || *c == '\'') else {
            continue;
        };
        if !preceded {
            continue;
        }
        let value = &rest[1..];
        return value.find(quote).map(|end| &value[..end]);
    }
    None
}

/// Text content of the first `<name>` element anywhere in the unit.
pub fn element_text<'a>(unit: &'a str, name: &str) -> Option<&'a str> {
    let open = format!("<{name}");
    let mut search = 0;
    while let Some(found) = unit[search..].find(&open) {
        let at = search + found;
        search = at + open.len();
        // `<name>` or `<name attr..>`, not `<namespace..>`.
        if !unit[search..].starts_with(|c: char| c == '>' || c.is_whitespace() || c == '/') {
            continue;
        }
        let body_start = tag_end(unit.as_bytes(), at)?;
        if unit[at..body_start].ends_with("/>") {
            return Some("");
        }
        let close = format!("</{name}>");
        let body_end = body_start + unit[body_start..].find(&close)?;
        return Some(unit[body_start..body_end].trim());
    }
    None
}

pub fn contains_element(unit: &str, name: &str) -> bool {
    element_text(unit, name).is_some()
}

/// `local@domain/resource` split into its parts.
fn split_jid(jid: &str) -> (Option<&str>, &str, Option<&str>) {
    let (bare, resource) = match jid.split_once('/') {
        Some((bare, resource)) => (bare, Some(resource)),
        None => (jid, None),
    };
    match bare.split_once('@') {
        Some((local, domain)) => (Some(local), domain, resource),
        None => (None, bare, resource),
    }
}

/// The device serial a unit identifies: the local part of its `from` JID,
/// or the username of a SASL digest response.
pub fn device_id(unit: &str) -> Option<EntityId> {
    let serial = match root_attr(unit, "from").and_then(|from| split_jid(from).0) {
        Some(local) => local.to_string(),
        None if root_name(unit) == "response" => {
            let decoded = BASE64_STANDARD.decode(element_text(unit, "response")?).ok()?;
            let digest = String::from_utf8(decoded).ok()?;
            attr_in(&format!(" {digest}"), "username")?.to_string()
        }
        None => return None,
    };
    EntityId::from_hex(&serial)
        .ok()
        .filter(|id| !id.is_empty())
}

/// Resource the device announced: from its `from` JID, or a bind request.
pub fn resource(unit: &str) -> Option<&str> {
    root_attr(unit, "from")
        .and_then(|from| split_jid(from).2)
        .or_else(|| element_text(unit, "resource"))
        .filter(|r| !r.is_empty())
}

/// Swap one XMPP domain for another in a relayed unit.
pub fn rewrite_domain(unit: &str, from: &str, to: &str) -> String {
    if from.is_empty() || from == to {
        unit.to_string()
    } else {
        unit.replace(&format!("@{from}"), &format!("@{to}"))
            .replace(&format!("'{from}'"), &format!("'{to}'"))
            .replace(&format!("\"{from}\""), &format!("\"{to}\""))
    }
}
