//! `/ojn/api/ztamps/<call>`: RFID tags and the plugins that claim them.

use std::sync::Arc;

use warren_db::{Access, Account, Category, EntityId, Ztamp};
use warren_plugin::{ApiAnswer, ApiCall, ApiError, ApiResult, HttpRequest, PluginType};

use super::{access_denied, storage_error};
use crate::state::AppState;

pub const CALLS: &[ApiCall] = &[
    ApiCall::new("getListOfZtamps()", Category::Ztamps, Access::Read),
    ApiCall::new("getListOfAllZtamps()", Category::Server, Access::Read),
    ApiCall::new("getListOfAllZtampsOwners()", Category::Server, Access::Read),
    ApiCall::new("removeZtamp(serial)", Category::Ztamps, Access::Write),
    ApiCall::new("addPluginToZtamp(serial,plugin)", Category::Ztamps, Access::Write),
    ApiCall::new("removePluginFromZtamp(serial,plugin)", Category::Ztamps, Access::Write),
];

pub async fn execute(
    state: &AppState,
    account: &Arc<Account>,
    call: &str,
    req: &HttpRequest,
) -> ApiResult {
    let ztamps = &state.entities.ztamps;
    match call {
        "getListOfZtamps" => Ok(ApiAnswer::map(
            ztamps
                .list()
                .iter()
                .filter(|z| account.owns_ztamp(z.id()))
                .map(|z| (z.id().to_hex(), z.name())),
        )),
        "getListOfAllZtamps" => Ok(ApiAnswer::map(
            ztamps.list().iter().map(|z| (z.id().to_hex(), z.name())),
        )),
        "getListOfAllZtampsOwners" => Ok(ApiAnswer::map(
            ztamps
                .list()
                .iter()
                .map(|z| (z.id().to_hex(), z.owner().unwrap_or_default())),
        )),
        "removeZtamp" => {
            let tag = editable(state, account, req.require("serial")?)?;
            if !ztamps.delete(tag.id()).await.map_err(storage_error)? {
                return Err(unknown_ztamp(&tag.id().to_hex()));
            }
            if let Some(owner) = tag.owner() {
                if let Some(owner) = state.entities.accounts.find_by_login(&owner) {
                    owner.remove_ztamp(tag.id());
                    state.entities.accounts.save(&owner).await.map_err(storage_error)?;
                }
            }
            tracing::info!(ztamp = %tag.id(), login = account.login(), "ztamp deleted");
            Ok(ApiAnswer::ok("Ztamp successfully deleted"))
        }
        "addPluginToZtamp" => {
            let tag = editable(state, account, req.require("serial")?)?;
            let name = req.require("plugin")?;
            let handle = state
                .plugins
                .get(name)
                .ok_or_else(|| ApiError::new(format!("Unknown plugin '{name}'")))?;
            if handle.plugin_type() != PluginType::ZtampPlugin {
                return Err(ApiError::new(format!(
                    "Plugin '{name}' is not a ztamp plugin"
                )));
            }
            if !tag.add_plugin(name) {
                return Err(ApiError::new(format!(
                    "Plugin '{name}' already handles this ztamp"
                )));
            }
            ztamps.save(&tag).await.map_err(storage_error)?;
            Ok(ApiAnswer::ok(format!("Plugin '{name}' now handles this ztamp")))
        }
        // Claims outlive the plugin, so this works for unloaded plugins too.
        "removePluginFromZtamp" => {
            let tag = editable(state, account, req.require("serial")?)?;
            let name = req.require("plugin")?;
            if !tag.remove_plugin(name) {
                return Err(ApiError::new(format!(
                    "Plugin '{name}' doesn't handle this ztamp"
                )));
            }
            ztamps.save(&tag).await.map_err(storage_error)?;
            Ok(ApiAnswer::ok(format!(
                "Plugin '{name}' no longer handles this ztamp"
            )))
        }
        _ => Err(ApiError::new(format!("Unknown api call : {call}"))),
    }
}

/// An existing tag the caller may modify: unowned, theirs, or any tag for
/// an administrator.
fn editable(state: &AppState, account: &Account, serial: &str) -> Result<Arc<Ztamp>, ApiError> {
    let id = EntityId::from_hex(serial).map_err(|_| unknown_ztamp(serial))?;
    let tag = state
        .entities
        .ztamps
        .find(&id)
        .ok_or_else(|| unknown_ztamp(serial))?;
    match tag.owner() {
        Some(owner) if owner != account.login() && !account.is_admin() => Err(access_denied()),
        _ => Ok(tag),
    }
}

fn unknown_ztamp(serial: &str) -> ApiError {
    ApiError::new(format!("Unknown ztamp '{serial}'"))
}
