//! Administrative API answers and call declarations.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use warren_db::{Access, Category};

/// JSON answer of an API call: `{"ok": ..}`, `{"list": ..}`, `{"map": ..}`
/// or `{"error": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiAnswer {
    Ok(String),
    List(Vec<String>),
    Map(BTreeMap<String, String>),
    Error(String),
}

impl ApiAnswer {
    pub fn ok(msg: impl Into<String>) -> Self {
        ApiAnswer::Ok(msg.into())
    }

    pub fn error(msg: impl Into<String>) -> Self {
        ApiAnswer::Error(msg.into())
    }

    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ApiAnswer::List(items.into_iter().map(Into::into).collect())
    }

    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        ApiAnswer::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn access_denied() -> Self {
        ApiAnswer::error("Access denied")
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ApiAnswer::Error(_))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"error":"serialization failed"}"#.into())
    }
}

/// Failure of an API call, rendered as `{"error": msg}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError(String);

impl ApiError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ApiError {}

impl From<ApiError> for ApiAnswer {
    fn from(e: ApiError) -> Self {
        ApiAnswer::Error(e.0)
    }
}

pub type ApiResult = Result<ApiAnswer, ApiError>;

/// Fold an [`ApiResult`] into the answer sent back.
pub fn answer(result: ApiResult) -> ApiAnswer {
    result.unwrap_or_else(Into::into)
}

/// Declaration of one API call: its signature and the right it requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiCall {
    /// `name(arg1,arg2)`; the argument list is documentation only.
    pub signature: &'static str,
    pub category: Category,
    pub access: Access,
}

impl ApiCall {
    pub const fn new(signature: &'static str, category: Category, access: Access) -> Self {
        Self {
            signature,
            category,
            access,
        }
    }

    /// Callable by anyone, Guest included.
    pub const fn public(signature: &'static str) -> Self {
        Self::new(signature, Category::Global, Access::None)
    }

    pub fn name(&self) -> &'static str {
        self.signature
            .split_once('(')
            .map_or(self.signature, |(name, _)| name)
    }

    pub fn args(&self) -> Vec<&'static str> {
        self.signature
            .split_once('(')
            .map(|(_, rest)| rest.trim_end_matches(')'))
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .collect()
    }
}

pub fn find_call<'a>(calls: &'a [ApiCall], name: &str) -> Option<&'a ApiCall> {
    calls.iter().find(|c| c.name() == name)
}
