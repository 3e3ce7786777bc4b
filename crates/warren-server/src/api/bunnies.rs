//! `/ojn/api/bunnies/<call>` and the device calls at
//! `/ojn/api/bunny/<serial>/<call>`.

use std::sync::Arc;

use warren_db::{Access, Account, Bunny, Category};
use warren_plugin::{ApiAnswer, ApiCall, ApiError, ApiResult, HttpRequest, PluginError};

use super::storage_error;
use crate::state::AppState;

pub const CALLS: &[ApiCall] = &[
    ApiCall::new("getListOfConnectedBunnies()", Category::Bunnies, Access::Read),
    ApiCall::new("getListOfBunnies()", Category::Bunnies, Access::Read),
];

pub const DEVICE_CALLS: &[ApiCall] = &[
    ApiCall::new("registerPlugin(name)", Category::Bunnies, Access::Write),
    ApiCall::new("unregisterPlugin(name)", Category::Bunnies, Access::Write),
    ApiCall::new("getListOfActivePlugins()", Category::Bunnies, Access::Read),
    ApiCall::new("setBunnyName(name)", Category::Bunnies, Access::Write),
];

pub fn execute(state: &AppState, account: &Account, call: &str) -> ApiResult {
    let bunnies = &state.entities.bunnies;
    match call {
        "getListOfConnectedBunnies" => Ok(ApiAnswer::list(
            bunnies
                .list()
                .iter()
                .filter(|b| b.is_connected())
                .map(|b| b.id().to_hex()),
        )),
        // Administrators see every device, everyone else their own.
        "getListOfBunnies" => Ok(ApiAnswer::map(
            bunnies
                .list()
                .iter()
                .filter(|b| account.is_admin() || account.owns_bunny(b.id()))
                .map(|b| (b.id().to_hex(), b.name())),
        )),
        _ => Err(ApiError::new(format!("Unknown api call : {call}"))),
    }
}

pub async fn execute_device(
    state: &AppState,
    bunny: &Arc<Bunny>,
    call: &str,
    req: &HttpRequest,
) -> ApiResult {
    match call {
        "registerPlugin" => {
            let name = req.require("name")?;
            state
                .plugins
                .attach_to_bunny(name, bunny)
                .map_err(|e| plugin_error(name, e))?;
            save(state, bunny).await?;
            Ok(ApiAnswer::ok(format!("Plugin '{name}' is now activated")))
        }
        "unregisterPlugin" => {
            let name = req.require("name")?;
            state
                .plugins
                .detach_from_bunny(name, bunny)
                .map_err(|e| plugin_error(name, e))?;
            save(state, bunny).await?;
            Ok(ApiAnswer::ok(format!("Plugin '{name}' is now deactivated")))
        }
        "getListOfActivePlugins" => Ok(ApiAnswer::list(bunny.activated_plugins())),
        "setBunnyName" => {
            let name = req.require("name")?.trim();
            if name.is_empty() {
                return Err(ApiError::new("Bunny name can't be empty"));
            }
            bunny.set_name(name);
            save(state, bunny).await?;
            Ok(ApiAnswer::ok(format!("Bunny is now named '{name}'")))
        }
        _ => Err(ApiError::new(format!("Unknown api call : {call}"))),
    }
}

async fn save(state: &AppState, bunny: &Bunny) -> Result<(), ApiError> {
    state.entities.bunnies.save(bunny).await.map_err(storage_error)
}

fn plugin_error(name: &str, err: PluginError) -> ApiError {
    match err {
        PluginError::NotFound(_) => ApiError::new(format!("Unknown plugin '{name}'")),
        PluginError::NotABunnyPlugin(_) => {
            ApiError::new(format!("Plugin '{name}' is not a bunny plugin"))
        }
        PluginError::AlreadyInState { state, .. } => {
            ApiError::new(format!("Plugin '{name}' is already {state}"))
        }
        other => ApiError::new(other.to_string()),
    }
}
