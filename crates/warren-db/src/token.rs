use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;

use crate::EntityId;

/// Opaque bearer credential handed out after a successful login.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Token(String);

impl Token {
    fn generate() -> Self {
        Token(hex::encode(rand::random::<[u8; 32]>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(..)")
    }
}

struct Grant {
    account: EntityId,
    expires_at: DateTime<Utc>,
}

/// Token -> (account, expiry). Tokens are never renewed.
pub struct TokenStore {
    ttl: TimeDelta,
    grants: RwLock<HashMap<String, Grant>>,
}

impl TokenStore {
    pub fn new(ttl: TimeDelta) -> Self {
        Self {
            ttl,
            grants: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    pub fn issue(&self, account: &EntityId, now: DateTime<Utc>) -> Token {
        let token = Token::generate();
        self.grants.write().insert(
            token.0.clone(),
            Grant {
                account: account.clone(),
                expires_at: now + self.ttl,
            },
        );
        token
    }

    /// Account bound to `token`, if the token exists and `now < expiry`.
    /// An expired token is removed on the way out.
    pub fn lookup(&self, token: &str, now: DateTime<Utc>) -> Option<EntityId> {
        self.resolve_with(token, now, |id| Some(id.clone()))
    }

    /// Like [`TokenStore::lookup`], but `f` runs while the grant is still
    /// read-locked, so a concurrent revocation cannot interleave.
    pub(crate) fn resolve_with<R>(
        &self,
        token: &str,
        now: DateTime<Utc>,
        f: impl FnOnce(&EntityId) -> Option<R>,
    ) -> Option<R> {
        {
            let grants = self.grants.read();
            match grants.get(token) {
                None => return None,
                Some(grant) if now < grant.expires_at => return f(&grant.account),
                Some(_) => {}
            }
        }
        let mut grants = self.grants.write();
        if grants.get(token).is_some_and(|g| now >= g.expires_at) {
            grants.remove(token);
            tracing::debug!("expired token purged");
        }
        None
    }

    /// Drop every token of an account.
    pub fn revoke_account(&self, account: &EntityId) -> usize {
        let mut grants = self.grants.write();
        let before = grants.len();
        grants.retain(|_, g| &g.account != account);
        before - grants.len()
    }

    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut grants = self.grants.write();
        let before = grants.len();
        grants.retain(|_, g| now < g.expires_at);
        before - grants.len()
    }

    pub fn len(&self) -> usize {
        self.grants.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.read().is_empty()
    }

    /// Revoke every token of `account`, then run `f` before releasing the
    /// grant table.
    pub(crate) fn revoke_account_with<R>(&self, account: &EntityId, f: impl FnOnce() -> R) -> R {
        let mut grants = self.grants.write();
        grants.retain(|_, g| &g.account != account);
        f()
    }
}
