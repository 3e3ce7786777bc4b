//! `/ojn/api/accounts/<call>`: authentication, registration and ownership.

use std::sync::Arc;

use warren_db::{Access, Account, AuthError, Category, DbError, EntityId};
use warren_plugin::{ApiAnswer, ApiCall, ApiError, ApiResult, HttpRequest};

use super::storage_error;
use crate::state::AppState;

pub const CALLS: &[ApiCall] = &[
    ApiCall::public("auth(login,pass)"),
    ApiCall::public("registerNewAccount(login,username,pass)"),
    ApiCall::public("whoAmI()"),
    ApiCall::new("changePassword(pass)", Category::Accounts, Access::Read),
    ApiCall::new("addBunny(serial)", Category::Bunnies, Access::Write),
    ApiCall::new("removeBunny(serial)", Category::Bunnies, Access::Write),
    ApiCall::new("addZtamp(serial)", Category::Ztamps, Access::Write),
    ApiCall::new("removeZtamp(serial)", Category::Ztamps, Access::Write),
    ApiCall::new("getListOfAccounts()", Category::Server, Access::Read),
    ApiCall::new("removeAccount(login)", Category::Server, Access::Write),
    ApiCall::new("setAccess(login,category,level)", Category::Server, Access::Write),
    ApiCall::new("setAdmin(login,admin)", Category::Server, Access::Write),
];

pub async fn execute(
    state: &AppState,
    account: &Arc<Account>,
    call: &str,
    req: &HttpRequest,
) -> ApiResult {
    let accounts = &state.entities.accounts;
    match call {
        "auth" => {
            let token = accounts
                .authenticate(req.require("login")?, req.require("pass")?)
                .map_err(auth_error)?;
            Ok(ApiAnswer::ok(token.as_str()))
        }
        "registerNewAccount" => {
            let login = req.require("login")?;
            let created = accounts
                .register(login, req.require("username")?, req.require("pass")?)
                .map_err(auth_error)?;
            accounts.save(&created).await.map_err(storage_error)?;
            Ok(ApiAnswer::ok(format!("Account '{login}' created")))
        }
        "whoAmI" => Ok(ApiAnswer::map([
            ("login", account.login().to_string()),
            ("username", account.username()),
            ("admin", account.is_admin().to_string()),
        ])),
        "changePassword" => {
            accounts
                .change_password(account, req.require("pass")?)
                .map_err(auth_error)?;
            accounts.save(account).await.map_err(storage_error)?;
            Ok(ApiAnswer::ok("Password changed"))
        }
        "addBunny" => {
            let serial = req.require("serial")?;
            let bunny = state
                .entities
                .bunnies
                .get_hex(serial)
                .ok_or_else(|| invalid_serial(serial))?;
            let taken = accounts
                .list()
                .iter()
                .any(|other| other.login() != account.login() && other.owns_bunny(bunny.id()));
            if taken && !account.is_admin() {
                return Err(ApiError::new(format!(
                    "Bunny '{serial}' belongs to another account"
                )));
            }
            if !account.add_bunny(bunny.id()) {
                return Err(ApiError::new(format!("Bunny '{serial}' is already yours")));
            }
            accounts.save(account).await.map_err(storage_error)?;
            Ok(ApiAnswer::ok(format!("Bunny '{serial}' added")))
        }
        "removeBunny" => {
            let serial = req.require("serial")?;
            let id = EntityId::from_hex(serial).map_err(|_| invalid_serial(serial))?;
            if !account.remove_bunny(&id) {
                return Err(ApiError::new(format!("Bunny '{serial}' is not yours")));
            }
            accounts.save(account).await.map_err(storage_error)?;
            Ok(ApiAnswer::ok(format!("Bunny '{serial}' removed")))
        }
        "addZtamp" => {
            let serial = req.require("serial")?;
            let ztamps = &state.entities.ztamps;
            let tag = ztamps.get_hex(serial).ok_or_else(|| invalid_serial(serial))?;
            match tag.owner() {
                Some(owner) if owner == account.login() => {
                    return Err(ApiError::new(format!("Ztamp '{serial}' is already yours")));
                }
                Some(_) if !account.is_admin() => {
                    return Err(ApiError::new(format!(
                        "Ztamp '{serial}' belongs to another account"
                    )));
                }
                Some(previous) => {
                    if let Some(previous) = accounts.find_by_login(&previous) {
                        previous.remove_ztamp(tag.id());
                        accounts.save(&previous).await.map_err(storage_error)?;
                    }
                }
                None => {}
            }
            tag.set_owner(Some(account.login()));
            account.add_ztamp(tag.id());
            ztamps.save(&tag).await.map_err(storage_error)?;
            accounts.save(account).await.map_err(storage_error)?;
            Ok(ApiAnswer::ok(format!("Ztamp '{serial}' added")))
        }
        "removeZtamp" => {
            let serial = req.require("serial")?;
            let id = EntityId::from_hex(serial).map_err(|_| invalid_serial(serial))?;
            if !account.remove_ztamp(&id) {
                return Err(ApiError::new(format!("Ztamp '{serial}' is not yours")));
            }
            if let Some(tag) = state.entities.ztamps.find(&id) {
                if tag.owner().as_deref() == Some(account.login()) {
                    tag.set_owner(None);
                    state.entities.ztamps.save(&tag).await.map_err(storage_error)?;
                }
            }
            accounts.save(account).await.map_err(storage_error)?;
            Ok(ApiAnswer::ok(format!("Ztamp '{serial}' removed")))
        }
        "getListOfAccounts" => Ok(ApiAnswer::map(
            accounts
                .list()
                .iter()
                .map(|a| (a.login().to_string(), a.username())),
        )),
        "removeAccount" => {
            let login = req.require("login")?;
            if login == account.login() {
                return Err(ApiError::new("You can't remove your own account"));
            }
            let target = find_account(state, login)?;
            if !accounts.delete(login).await.map_err(storage_error)? {
                return Err(unknown_account(login));
            }
            // A later account registered under the same login must not inherit these.
            let ztamps = &state.entities.ztamps;
            for id in target.ztamps() {
                let Some(tag) = ztamps.find(&id) else { continue };
                if tag.owner().as_deref() == Some(login) {
                    tag.set_owner(None);
                    ztamps.save(&tag).await.map_err(storage_error)?;
                }
            }
            Ok(ApiAnswer::ok(format!("Account '{login}' removed")))
        }
        "setAccess" => {
            let target = find_account(state, req.require("login")?)?;
            let category: Category = req
                .require("category")?
                .parse()
                .map_err(ApiError::new)?;
            let level: Access = req.require("level")?.parse().map_err(ApiError::new)?;
            target.set_access(category, level);
            accounts.save(&target).await.map_err(storage_error)?;
            Ok(ApiAnswer::ok(format!(
                "Access to '{}' is now {level:?} for '{}'",
                category.as_str(),
                target.login()
            )))
        }
        "setAdmin" => {
            let target = find_account(state, req.require("login")?)?;
            let admin = parse_flag(req.require("admin")?)?;
            if !admin && target.login() == account.login() {
                return Err(ApiError::new("You can't revoke your own admin rights"));
            }
            target.set_admin(admin);
            accounts.save(&target).await.map_err(storage_error)?;
            Ok(ApiAnswer::ok(format!(
                "'{}' is {} an administrator",
                target.login(),
                if admin { "now" } else { "no longer" }
            )))
        }
        _ => Err(ApiError::new(format!("Unknown api call : {call}"))),
    }
}

fn find_account(state: &AppState, login: &str) -> Result<Arc<Account>, ApiError> {
    state
        .entities
        .accounts
        .find_by_login(login)
        .ok_or_else(|| unknown_account(login))
}

fn auth_error(err: AuthError) -> ApiError {
    match err {
        AuthError::InvalidCredentials => ApiError::new("Bad login or password"),
        AuthError::Db(DbError::AlreadyExists { key, .. }) => {
            ApiError::new(format!("Login '{key}' is already taken"))
        }
        other => storage_error(other),
    }
}

fn parse_flag(value: &str) -> Result<bool, ApiError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ApiError::new(format!("Invalid flag '{value}'"))),
    }
}

fn invalid_serial(serial: &str) -> ApiError {
    ApiError::new(format!("Invalid serial '{serial}'"))
}

fn unknown_account(login: &str) -> ApiError {
    ApiError::new(format!("Unknown account '{login}'"))
}
