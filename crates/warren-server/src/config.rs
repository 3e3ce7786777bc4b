use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use warren_db::StoreConfig;

/// Server configuration, read from `WARREN_*` environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub http_addr: SocketAddr,
    pub xmpp_addr: SocketAddr,
    pub http_listener: bool,
    pub xmpp_listener: bool,
    /// Serve `/ojn/api/...`.
    pub http_api: bool,
    /// Serve the device endpoints under `/vl/`.
    pub http_violet: bool,
    /// Never talk to the Violet platform.
    pub standalone: bool,
    pub violet_xmpp_addr: String,
    pub violet_http_url: String,
    pub http_root: PathBuf,
    pub broadcast_url: String,
    /// Sources to load at startup. Empty means the whole catalog.
    pub plugins: Vec<String>,
    /// XMPP domain devices see.
    pub domain: String,
    pub store: StoreConfig,
}

const DEFAULT_VIOLET_HTTP: &str = "http://r.nabaztag.com/";

fn var_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            http_addr: var_or("WARREN_HTTP_ADDR", SocketAddr::from(([127, 0, 0, 1], 8080))),
            xmpp_addr: var_or("WARREN_XMPP_ADDR", SocketAddr::from(([0, 0, 0, 0], 5222))),
            http_listener: var_or("WARREN_HTTP_LISTENER", true),
            xmpp_listener: var_or("WARREN_XMPP_LISTENER", true),
            http_api: var_or("WARREN_HTTP_API", true),
            http_violet: var_or("WARREN_HTTP_VIOLET", true),
            standalone: var_or("WARREN_STANDALONE", true),
            violet_xmpp_addr: env::var("WARREN_VIOLET_XMPP_ADDR")
                .unwrap_or_else(|_| "xmpp.nabaztag.com:5222".to_string()),
            violet_http_url: env::var("WARREN_VIOLET_HTTP_URL")
                .unwrap_or_else(|_| DEFAULT_VIOLET_HTTP.to_string()),
            http_root: env::var("WARREN_HTTP_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("www")),
            broadcast_url: env::var("WARREN_BROADCAST_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8080/".to_string()),
            plugins: env::var("WARREN_PLUGINS")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            domain: env::var("WARREN_DOMAIN").unwrap_or_else(|_| "warren.local".to_string()),
            store: StoreConfig::from_env(),
        }
    }

    /// Host part of the Violet XMPP address, used when rewriting JIDs.
    pub fn violet_domain(&self) -> &str {
        self.violet_xmpp_addr
            .rsplit_once(':')
            .map_or(self.violet_xmpp_addr.as_str(), |(host, _)| host)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
