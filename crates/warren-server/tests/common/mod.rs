// Shared test utilities for integration tests
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tower::ServiceExt;
use warren_db::{Bunny, StoreConfig};
use warren_plugin::{ClickType, Plugin, PluginCatalog, PluginType};
use warren_server::{AppState, ServerConfig};

pub const SERIAL: &str = "0019db01a2b3";

/// Standalone configuration rooted in `dir`, with ephemeral ports.
pub fn test_config(dir: &Path) -> ServerConfig {
    ServerConfig {
        http_addr: "127.0.0.1:0".parse().unwrap(),
        xmpp_addr: "127.0.0.1:0".parse().unwrap(),
        http_listener: true,
        xmpp_listener: true,
        http_api: true,
        http_violet: true,
        standalone: true,
        violet_xmpp_addr: "127.0.0.1:1".to_string(),
        violet_http_url: "http://127.0.0.1:1/".to_string(),
        http_root: dir.join("www"),
        broadcast_url: "http://warren.test/".to_string(),
        plugins: Vec::new(),
        domain: "warren.test".to_string(),
        store: StoreConfig {
            data_dir: dir.join("data"),
            token_ttl_secs: 3600,
        },
    }
}

/// Server state with the built-in plugins plus `extra`.
pub async fn test_state(dir: &Path, extra: Option<Counter>) -> Arc<AppState> {
    let mut catalog = PluginCatalog::builtin();
    if let Some(counter) = extra {
        catalog.register("counter", move || Box::new(counter.clone()));
    }
    AppState::bootstrap(test_config(dir), catalog).await.unwrap()
}

/// GET `uri` against the router and parse the JSON answer.
pub async fn get_json(app: &Router, uri: &str) -> serde_json::Value {
    let (status, body) = get(app, uri, None).await;
    assert_eq!(status, StatusCode::OK, "{uri}");
    serde_json::from_slice(&body).unwrap()
}

pub async fn get(app: &Router, uri: &str, bearer: Option<&str>) -> (StatusCode, Vec<u8>) {
    let mut request = Request::builder().uri(uri);
    if let Some(token) = bearer {
        request = request.header("Authorization", format!("Bearer {token}"));
    }
    let response = app
        .clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

/// Log in through the API and return the token.
pub async fn login(app: &Router, login: &str, pass: &str) -> String {
    let answer = get_json(app, &format!("/ojn/api/accounts/auth?login={login}&pass={pass}")).await;
    answer["ok"].as_str().expect("auth failed").to_string()
}

/// Read until `needle` shows up in what the peer sent.
pub async fn read_until(stream: &mut TcpStream, needle: &str) -> String {
    let mut seen = String::new();
    let mut buf = [0u8; 4096];
    tokio::time::timeout(Duration::from_secs(5), async {
        while !seen.contains(needle) {
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed before {needle:?}, got {seen:?}");
            seen.push_str(&String::from_utf8_lossy(&buf[..n]));
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {needle:?}, got {seen:?}"));
    seen
}

pub async fn eventually(what: &str, check: impl Fn() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

/// System plugin counting the device events it sees.
#[derive(Clone, Default)]
pub struct Counter {
    pub connects: Arc<AtomicUsize>,
    pub disconnects: Arc<AtomicUsize>,
    pub clicks: Arc<AtomicUsize>,
    pub messages: Arc<AtomicUsize>,
}

impl Counter {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn clicks(&self) -> usize {
        self.clicks.load(Ordering::SeqCst)
    }

    pub fn messages(&self) -> usize {
        self.messages.load(Ordering::SeqCst)
    }
}

impl Plugin for Counter {
    fn name(&self) -> &str {
        "counter"
    }

    fn visual_name(&self) -> &str {
        "Counts device events"
    }

    fn plugin_type(&self) -> PluginType {
        PluginType::System
    }

    fn xmpp_bunny_message(&self, _bunny: &Arc<Bunny>, _stanza: &str) {
        self.messages.fetch_add(1, Ordering::SeqCst);
    }

    fn on_click(&self, _bunny: &Arc<Bunny>, _click: ClickType) -> bool {
        self.clicks.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn on_bunny_connect(&self, _bunny: &Arc<Bunny>) {
        self.connects.fetch_add(1, Ordering::SeqCst);
    }

    fn on_bunny_disconnect(&self, _bunny: &Arc<Bunny>) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}
