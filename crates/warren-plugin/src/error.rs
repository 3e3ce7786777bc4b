//! Plugin system error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("plugin not found: {0}")]
    NotFound(String),

    #[error("plugin already loaded: {0}")]
    AlreadyLoaded(String),

    #[error("plugin '{name}' is already {state}")]
    AlreadyInState { name: String, state: &'static str },

    #[error("plugin '{0}' is required and can't be deactivated")]
    ProtectedPlugin(String),

    #[error("plugin '{0}' failed to initialize")]
    InitFailed(String),

    #[error("not a plugin module: {0}")]
    NotAModule(String),

    #[error("plugin '{0}' is not a bunny plugin")]
    NotABunnyPlugin(String),

    #[error("storage error: {0}")]
    Storage(#[from] warren_db::DbError),
}

/// Malformed Violet packet data.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PacketError {
    #[error("packet is empty")]
    Empty,

    #[error("bad packet header: {0:#04x}")]
    BadHeader(u8),

    #[error("packet truncated at offset {0}")]
    Truncated(usize),

    #[error("trailing bytes after packet end")]
    TrailingData,
}
