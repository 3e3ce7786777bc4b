//! Account lookup, registration and the token-based login flow.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;

use crate::entity::Account;
use crate::password::{hash_password, verify_password};
use crate::registry::{Entity, Registry};
use crate::token::{Token, TokenStore};
use crate::{AuthError, DbError, EntityId, JsonStore};

/// Owns the account registry, its login index and the token store.
///
/// Lock order is `logins -> tokens -> registry`; no path acquires them in
/// another order.
pub struct AccountManager {
    accounts: Registry<Account>,
    logins: RwLock<HashMap<String, EntityId>>,
    tokens: TokenStore,
    guest: Arc<Account>,
}

impl AccountManager {
    pub fn new(store: JsonStore, token_ttl: TimeDelta) -> Self {
        Self {
            accounts: Registry::new(store),
            logins: RwLock::new(HashMap::new()),
            tokens: TokenStore::new(token_ttl),
            guest: Arc::new(Account::guest()),
        }
    }

    pub fn guest(&self) -> Arc<Account> {
        self.guest.clone()
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn find(&self, id: &EntityId) -> Option<Arc<Account>> {
        self.accounts.find(id)
    }

    pub fn find_by_login(&self, login: &str) -> Option<Arc<Account>> {
        let id = self.logins.read().get(login).cloned()?;
        self.accounts.find(&id)
    }

    pub fn list(&self) -> Vec<Arc<Account>> {
        self.accounts.list()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Create an account. The first account ever registered is an administrator.
    pub fn register(
        &self,
        login: &str,
        username: &str,
        password: &str,
    ) -> Result<Arc<Account>, AuthError> {
        let hash = hash_password(password)?;
        let mut logins = self.logins.write();
        if logins.contains_key(login) {
            return Err(DbError::AlreadyExists {
                kind: Account::KIND,
                key: login.to_string(),
            }
            .into());
        }
        let account = Account::new(login, username, hash);
        if self.accounts.is_empty() {
            account.set_admin(true);
        }
        let account = self.accounts.insert(account)?;
        logins.insert(login.to_string(), account.id().clone());
        tracing::info!(login, admin = account.is_admin(), "account registered");
        Ok(account)
    }

    pub fn authenticate(&self, login: &str, password: &str) -> Result<Token, AuthError> {
        self.authenticate_at(login, password, Utc::now())
    }

    pub fn authenticate_at(
        &self,
        login: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<Token, AuthError> {
        let account = self
            .find_by_login(login)
            .ok_or(AuthError::InvalidCredentials)?;
        if !verify_password(password, &account.password_hash()) {
            tracing::debug!(login, "authentication failed");
            return Err(AuthError::InvalidCredentials);
        }
        Ok(self.tokens.issue(account.id(), now))
    }

    pub fn change_password(&self, account: &Account, password: &str) -> Result<(), AuthError> {
        if account.is_guest() {
            return Err(AuthError::InvalidCredentials);
        }
        account.set_password_hash(hash_password(password)?);
        Ok(())
    }

    /// Account bound to a token, or Guest.
    pub fn resolve(&self, token: Option<&str>) -> Arc<Account> {
        self.resolve_at(token, Utc::now())
    }

    pub fn resolve_at(&self, token: Option<&str>, now: DateTime<Utc>) -> Arc<Account> {
        token
            .and_then(|t| {
                self.tokens
                    .resolve_with(t, now, |id| self.accounts.find(id))
            })
            .unwrap_or_else(|| self.guest())
    }

    /// Delete an account together with every token bound to it.
    pub async fn delete(&self, login: &str) -> Result<bool, DbError> {
        let removed = {
            let mut logins = self.logins.write();
            let Some(id) = logins.remove(login) else {
                return Ok(false);
            };
            self.tokens
                .revoke_account_with(&id, || self.accounts.evict(&id))
        };
        match removed {
            Some(account) => {
                self.accounts.purge(account.id()).await?;
                tracing::info!(login, "account deleted");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn save(&self, account: &Account) -> Result<(), DbError> {
        if account.is_guest() {
            return Ok(());
        }
        self.accounts.save(account).await
    }

    pub async fn load_all(&self) -> Result<usize, DbError> {
        let loaded = self.accounts.load_all().await?;
        let mut logins = self.logins.write();
        for account in self.accounts.list() {
            logins.insert(account.login().to_string(), account.id().clone());
        }
        Ok(loaded)
    }

    pub async fn save_all(&self) -> Result<usize, DbError> {
        self.accounts.save_all().await
    }
}
