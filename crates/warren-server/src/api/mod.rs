//! Administrative API under `/ojn/api/`.
//!
//! [`process`] is the single place calls run: it resolves the caller's
//! token, finds the call in the component's table, checks the declared
//! `(category, access)` and only then executes it.

pub mod accounts;
pub mod bunnies;
pub mod plugins;
pub mod ztamps;

use std::fmt::Display;
use std::sync::Arc;

use warren_db::{Account, Bunny};
use warren_plugin::{answer, find_call, ApiAnswer, ApiCall, ApiError, ApiResult, HttpRequest};

use crate::state::AppState;

pub const PREFIX: &str = "/ojn/api/";

/// Answer the API request whose path follows [`PREFIX`].
pub async fn process(state: &AppState, request: &str, req: &HttpRequest) -> ApiAnswer {
    let account = state.entities.accounts.resolve(req.token());
    let answer = answer(route(state, &account, request, req).await);
    if answer.is_error() {
        tracing::debug!(path = req.path(), login = account.login(), "api call refused");
    }
    answer
}

async fn route(
    state: &AppState,
    account: &Arc<Account>,
    request: &str,
    req: &HttpRequest,
) -> ApiResult {
    let segments: Vec<&str> = request.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        ["accounts", call] => {
            authorize(accounts::CALLS, call, account, req)?;
            accounts::execute(state, account, call, req).await
        }
        ["bunnies", call] => {
            authorize(bunnies::CALLS, call, account, req)?;
            bunnies::execute(state, account, call)
        }
        ["ztamps", call] => {
            authorize(ztamps::CALLS, call, account, req)?;
            ztamps::execute(state, account, call, req).await
        }
        ["plugins", call] => {
            authorize(plugins::CALLS, call, account, req)?;
            plugins::execute(state, call, req).await
        }
        ["plugin", name, call] => plugin_call(state, account, name, call, req),
        ["bunny", serial, call] => {
            authorize(bunnies::DEVICE_CALLS, call, account, req)?;
            let bunny = owned_bunny(state, account, serial)?;
            bunnies::execute_device(state, &bunny, call, req).await
        }
        ["bunny", serial, plugin, call] => {
            bunny_plugin_call(state, account, serial, plugin, call, req)
        }
        _ => Err(unknown_call(req)),
    }
}

/// Look `name` up in `calls` and check the caller may run it.
fn authorize<'a>(
    calls: &'a [ApiCall],
    name: &str,
    account: &Account,
    req: &HttpRequest,
) -> Result<&'a ApiCall, ApiError> {
    let call = find_call(calls, name).ok_or_else(|| unknown_call(req))?;
    if !account.authorize(call.category, call.access) {
        return Err(access_denied());
    }
    Ok(call)
}

fn plugin_call(
    state: &AppState,
    account: &Account,
    name: &str,
    call: &str,
    req: &HttpRequest,
) -> ApiResult {
    let handle = state
        .plugins
        .get(name)
        .ok_or_else(|| ApiError::new(format!("Unknown plugin '{name}'")))?;
    authorize(handle.api_calls(), call, account, req)?;
    if !handle.is_enabled() {
        return Err(ApiError::new(format!("Plugin '{name}' is disabled")));
    }
    handle.api_call(call, account, req)
}

/// Checks run in order: the call is authorized, then the device must be
/// the caller's, then the plugin must be active on it and enabled.
fn bunny_plugin_call(
    state: &AppState,
    account: &Account,
    serial: &str,
    name: &str,
    call: &str,
    req: &HttpRequest,
) -> ApiResult {
    let handle = state
        .plugins
        .get(name)
        .ok_or_else(|| ApiError::new(format!("Unknown plugin '{name}'")))?;
    authorize(handle.bunny_api_calls(), call, account, req)?;
    let bunny = owned_bunny(state, account, serial)?;
    if !bunny.has_plugin(name) {
        return Err(ApiError::new(format!(
            "Plugin '{name}' is not activated for this bunny"
        )));
    }
    if !handle.is_enabled() {
        return Err(ApiError::new(format!("Plugin '{name}' is disabled")));
    }
    handle.bunny_api_call(call, account, &bunny, req)
}

/// The device behind `serial`, if the caller owns it or is an administrator.
fn owned_bunny(state: &AppState, account: &Account, serial: &str) -> Result<Arc<Bunny>, ApiError> {
    let bunny = state
        .entities
        .bunnies
        .find_hex(serial)
        .ok_or_else(|| ApiError::new(format!("Unknown bunny '{serial}'")))?;
    if account.is_admin() || account.owns_bunny(bunny.id()) {
        Ok(bunny)
    } else {
        Err(access_denied())
    }
}

pub(crate) fn access_denied() -> ApiError {
    ApiError::new("Access denied")
}

fn unknown_call(req: &HttpRequest) -> ApiError {
    ApiError::new(format!("Unknown api call : {}", req.path()))
}

/// Log a persistence failure and hide its details from the caller.
pub(crate) fn storage_error(err: impl Display) -> ApiError {
    tracing::error!(error = %err, "failed to persist api change");
    ApiError::new("Storage error")
}
