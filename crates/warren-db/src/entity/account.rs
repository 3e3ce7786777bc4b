use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::access::{Access, Category};
use crate::registry::Entity;
use crate::settings::{Settings, SettingsMap};
use crate::EntityId;

/// Rights granted to freshly registered accounts.
pub const DEFAULT_ACCESS: [(Category, Access); 4] = [
    (Category::Accounts, Access::Read),
    (Category::Bunnies, Access::Write),
    (Category::Ztamps, Access::Write),
    (Category::Plugins, Access::Read),
];

pub struct Account {
    id: EntityId,
    login: String,
    profile: RwLock<Profile>,
    settings: Settings,
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("login", &self.login)
            .finish_non_exhaustive()
    }
}

struct Profile {
    username: String,
    password_hash: String,
    admin: bool,
    access: BTreeMap<Category, Access>,
    bunnies: Vec<EntityId>,
    ztamps: Vec<EntityId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountRecord {
    pub login: String,
    pub username: String,
    pub password_hash: String,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub access: BTreeMap<Category, Access>,
    #[serde(default)]
    pub bunnies: Vec<EntityId>,
    #[serde(default)]
    pub ztamps: Vec<EntityId>,
    #[serde(default)]
    pub settings: SettingsMap,
}

impl Account {
    pub fn new(login: &str, username: &str, password_hash: String) -> Self {
        Self::from_record(
            EntityId::new(Uuid::new_v4().as_bytes().to_vec()),
            AccountRecord {
                login: login.to_string(),
                username: username.to_string(),
                password_hash,
                admin: false,
                access: DEFAULT_ACCESS.into_iter().collect(),
                bunnies: Vec::new(),
                ztamps: Vec::new(),
                settings: SettingsMap::new(),
            },
        )
    }

    /// The unauthenticated account. It holds no rights and is never stored.
    pub fn guest() -> Self {
        Self::from_record(
            EntityId::new(Vec::new()),
            AccountRecord {
                login: "guest".into(),
                username: "Guest".into(),
                password_hash: String::new(),
                admin: false,
                access: BTreeMap::new(),
                bunnies: Vec::new(),
                ztamps: Vec::new(),
                settings: SettingsMap::new(),
            },
        )
    }

    pub fn is_guest(&self) -> bool {
        self.id.is_empty()
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    pub fn username(&self) -> String {
        self.profile.read().username.clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub(crate) fn password_hash(&self) -> String {
        self.profile.read().password_hash.clone()
    }

    pub(crate) fn set_password_hash(&self, hash: String) {
        self.profile.write().password_hash = hash;
    }

    pub fn is_admin(&self) -> bool {
        self.profile.read().admin
    }

    pub fn set_admin(&self, admin: bool) {
        if !self.is_guest() {
            self.profile.write().admin = admin;
        }
    }

    pub fn access(&self, category: Category) -> Access {
        self.profile
            .read()
            .access
            .get(&category)
            .copied()
            .unwrap_or_default()
    }

    pub fn set_access(&self, category: Category, access: Access) {
        if !self.is_guest() {
            self.profile.write().access.insert(category, access);
        }
    }

    /// Admins pass every check; everyone else needs at least `required`.
    pub fn authorize(&self, category: Category, required: Access) -> bool {
        let profile = self.profile.read();
        if profile.admin || required == Access::None {
            return true;
        }
        profile.access.get(&category).copied().unwrap_or_default() >= required
    }

    pub fn bunnies(&self) -> Vec<EntityId> {
        self.profile.read().bunnies.clone()
    }

    pub fn owns_bunny(&self, id: &EntityId) -> bool {
        self.profile.read().bunnies.contains(id)
    }

    pub fn add_bunny(&self, id: &EntityId) -> bool {
        if self.is_guest() {
            return false;
        }
        push_unique(&mut self.profile.write().bunnies, id)
    }

    pub fn remove_bunny(&self, id: &EntityId) -> bool {
        remove_from(&mut self.profile.write().bunnies, id)
    }

    pub fn ztamps(&self) -> Vec<EntityId> {
        self.profile.read().ztamps.clone()
    }

    pub fn owns_ztamp(&self, id: &EntityId) -> bool {
        self.profile.read().ztamps.contains(id)
    }

    pub fn add_ztamp(&self, id: &EntityId) -> bool {
        if self.is_guest() {
            return false;
        }
        push_unique(&mut self.profile.write().ztamps, id)
    }

    pub fn remove_ztamp(&self, id: &EntityId) -> bool {
        remove_from(&mut self.profile.write().ztamps, id)
    }
}

fn push_unique(list: &mut Vec<EntityId>, id: &EntityId) -> bool {
    if list.contains(id) {
        return false;
    }
    list.push(id.clone());
    true
}

fn remove_from(list: &mut Vec<EntityId>, id: &EntityId) -> bool {
    let before = list.len();
    list.retain(|x| x != id);
    list.len() != before
}

impl Entity for Account {
    const KIND: &'static str = "account";
    type Record = AccountRecord;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn to_record(&self) -> AccountRecord {
        let profile = self.profile.read();
        AccountRecord {
            login: self.login.clone(),
            username: profile.username.clone(),
            password_hash: profile.password_hash.clone(),
            admin: profile.admin,
            access: profile.access.clone(),
            bunnies: profile.bunnies.clone(),
            ztamps: profile.ztamps.clone(),
            settings: self.settings.snapshot(),
        }
    }

    fn from_record(id: EntityId, record: AccountRecord) -> Self {
        Self {
            id,
            login: record.login,
            profile: RwLock::new(Profile {
                username: record.username,
                password_hash: record.password_hash,
                admin: record.admin,
                access: record.access,
                bunnies: record.bunnies,
                ztamps: record.ztamps,
            }),
            settings: Settings::from_map(record.settings),
        }
    }
}
