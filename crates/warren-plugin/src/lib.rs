//! Warren plugin system.
//!
//! Plugins are compiled into the server and registered in a
//! [`PluginCatalog`] under a source reference. The [`PluginRegistry`] loads,
//! unloads and enables them at runtime; the [`Dispatcher`] routes every
//! device and HTTP event through the enabled ones.

pub mod api;
pub mod builtin;
pub mod catalog;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod host_functions;
pub mod http;
pub mod packet;
pub mod plugin;
pub mod registry;

#[cfg(test)]
mod testing;

pub use api::{answer, find_call, ApiAnswer, ApiCall, ApiError, ApiResult};
pub use catalog::{PluginCatalog, PluginFactory};
pub use dispatch::Dispatcher;
pub use error::{PacketError, PluginError};
pub use events::{Audience, Combine, Event};
pub use host_functions::{HostConfig, HostContext};
pub use http::{HttpRequest, HttpResponse};
pub use packet::Packet;
pub use plugin::{ClickType, Plugin, PluginType};
pub use registry::{PluginDescriptor, PluginHandle, PluginRegistry};
