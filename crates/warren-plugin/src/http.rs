//! Protocol-neutral HTTP request/response values handed to plugins.

use std::collections::BTreeMap;

use crate::api::{ApiAnswer, ApiError};

#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    method: String,
    path: String,
    query: String,
    args: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
    body: Vec<u8>,
}

impl HttpRequest {
    /// Build a request; `query` is the raw query string without `?`.
    pub fn new(method: &str, path: &str, query: &str) -> Self {
        let args = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        Self {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
            query: query.to_string(),
            args,
            headers: BTreeMap::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args.get(name).map(String::as_str)
    }

    pub fn has_arg(&self, name: &str) -> bool {
        self.args.contains_key(name)
    }

    /// Argument that an API call cannot do without.
    pub fn require(&self, name: &str) -> Result<&str, ApiError> {
        self.arg(name)
            .ok_or_else(|| ApiError::new(format!("Missing argument '{name}'")))
    }

    /// Session token from `?token=` or an `Authorization: Bearer` header.
    pub fn token(&self) -> Option<&str> {
        self.arg("token").or_else(|| {
            self.header("authorization")
                .and_then(|h| h.strip_prefix("Bearer "))
                .map(str::trim)
        })
    }

    /// `path?query`, as it appeared on the wire.
    pub fn uri(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type: content_type.to_string(),
            body: body.into(),
        }
    }

    pub fn ok(content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, content_type, body)
    }

    pub fn empty() -> Self {
        Self::new(200, "text/plain", Vec::new())
    }

    pub fn not_found() -> Self {
        Self::new(404, "text/plain", "Not found")
    }

    pub fn api(answer: &ApiAnswer) -> Self {
        Self::ok("application/json", answer.to_json())
    }
}
