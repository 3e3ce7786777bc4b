//! Plugin management API: `/ojn/api/plugins/<call>`.
//!
//! Listing needs plugin read rights, switching plugins on and off needs
//! write rights, and changing what is loaded is reserved to server
//! administrators.

use warren_db::{Access, Category};
use warren_plugin::{
    ApiAnswer, ApiCall, ApiError, ApiResult, HttpRequest, PluginError, PluginHandle,
};

use super::storage_error;
use crate::state::AppState;

pub const CALLS: &[ApiCall] = &[
    ApiCall::new("getListOfPlugins()", Category::Plugins, Access::Read),
    ApiCall::new("getListOfEnabledPlugins()", Category::Plugins, Access::Read),
    ApiCall::new("getListOfBunnyPlugins()", Category::Plugins, Access::Read),
    ApiCall::new("getListOfSystemPlugins()", Category::Plugins, Access::Read),
    ApiCall::new("getListOfRequiredPlugins()", Category::Plugins, Access::Read),
    ApiCall::new("getListOfBunnyEnabledPlugins()", Category::Plugins, Access::Read),
    ApiCall::new("activatePlugin(name)", Category::Plugins, Access::Write),
    ApiCall::new("deactivatePlugin(name)", Category::Plugins, Access::Write),
    ApiCall::new("loadPlugin(filename)", Category::Server, Access::Write),
    ApiCall::new("unloadPlugin(name)", Category::Server, Access::Write),
    ApiCall::new("reloadPlugin(name)", Category::Server, Access::Write),
];

// ─── Helpers ────────────────────────────────────────────────────────────

fn names(handles: Vec<PluginHandle>) -> ApiAnswer {
    ApiAnswer::list(handles.iter().map(|h| h.name().to_string()))
}

async fn persist(state: &AppState) -> Result<(), ApiError> {
    state.plugins.save_state().await.map_err(storage_error)
}

fn state_error(name: &str, err: PluginError) -> ApiError {
    match err {
        PluginError::NotFound(_) => ApiError::new(format!("Unknown plugin '{name}'")),
        PluginError::ProtectedPlugin(_) => {
            ApiError::new(format!("Plugin '{name}' can't be deactivated!"))
        }
        PluginError::AlreadyInState { state, .. } => {
            ApiError::new(format!("Plugin '{name}' is already {state}!"))
        }
        other => ApiError::new(other.to_string()),
    }
}

// ─── Calls ──────────────────────────────────────────────────────────────

pub async fn execute(state: &AppState, call: &str, req: &HttpRequest) -> ApiResult {
    let plugins = &state.plugins;
    match call {
        "getListOfPlugins" => Ok(ApiAnswer::map(
            plugins
                .list()
                .iter()
                .map(|h| (h.name().to_string(), h.visual_name().to_string())),
        )),
        "getListOfEnabledPlugins" => Ok(names(plugins.enabled())),
        "getListOfBunnyPlugins" => Ok(names(plugins.bunny_plugins())),
        "getListOfSystemPlugins" => Ok(names(plugins.system_plugins())),
        "getListOfRequiredPlugins" => Ok(names(plugins.required_plugins())),
        "getListOfBunnyEnabledPlugins" => Ok(names(plugins.bunny_enabled())),
        "activatePlugin" => {
            let name = req.require("name")?;
            plugins.enable(name).map_err(|e| state_error(name, e))?;
            persist(state).await?;
            Ok(ApiAnswer::ok(format!("'{name}' is now enabled")))
        }
        "deactivatePlugin" => {
            let name = req.require("name")?;
            plugins.disable(name).map_err(|e| state_error(name, e))?;
            persist(state).await?;
            Ok(ApiAnswer::ok(format!("'{name}' is now disabled")))
        }
        "loadPlugin" => {
            let filename = req.require("filename")?;
            match plugins.load(filename) {
                Ok(handle) => {
                    tracing::info!(plugin = %handle.name(), source = filename, "plugin loaded from api");
                    Ok(ApiAnswer::ok(format!("'{filename}' is now loaded")))
                }
                Err(e) => {
                    tracing::warn!(source = filename, error = %e, "api load failed");
                    Err(ApiError::new(format!("Can't load '{filename}'!")))
                }
            }
        }
        "unloadPlugin" => {
            let name = req.require("name")?;
            if plugins.unload(name) {
                Ok(ApiAnswer::ok(format!("'{name}' is now unloaded")))
            } else {
                Err(ApiError::new(format!("Can't unload '{name}'!")))
            }
        }
        "reloadPlugin" => {
            let name = req.require("name")?;
            if plugins.reload(name) {
                Ok(ApiAnswer::ok(format!("'{name}' is now reloaded")))
            } else {
                Err(ApiError::new(format!("Can't reload '{name}'!")))
            }
        }
        _ => Err(ApiError::new(format!("Unknown api call : {call}"))),
    }
}
