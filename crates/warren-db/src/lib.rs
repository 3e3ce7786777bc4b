use std::env;
use std::path::PathBuf;

use chrono::TimeDelta;

pub mod access;
pub mod accounts;
pub mod entity;
pub mod error;
pub mod id;
pub mod password;
pub mod registry;
pub mod settings;
pub mod store;
pub mod token;

pub use access::{Access, Category};
pub use accounts::AccountManager;
pub use entity::{Account, Bunny, Ztamp};
pub use error::{AuthError, DbError};
pub use id::EntityId;
pub use registry::{Capability, Entity, LazyEntity, Registry};
pub use settings::{Settings, GLOBAL};
pub use store::JsonStore;
pub use token::{Token, TokenStore};

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub token_ttl_secs: i64,
}

impl StoreConfig {
    pub fn from_env() -> Self {
        Self {
            data_dir: env::var("WARREN_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
            token_ttl_secs: env::var("WARREN_TOKEN_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3600),
        }
    }
}

/// Every entity registry of the server.
pub struct Entities {
    pub bunnies: Registry<Bunny>,
    pub ztamps: Registry<Ztamp>,
    pub accounts: AccountManager,
}

impl Entities {
    pub const KINDS: [&'static str; 3] = [Bunny::KIND, Ztamp::KIND, Account::KIND];

    pub fn new(store: &JsonStore, token_ttl: TimeDelta) -> Self {
        Self {
            bunnies: Registry::new(store.clone()),
            ztamps: Registry::new(store.clone()),
            accounts: AccountManager::new(store.clone(), token_ttl),
        }
    }

    pub async fn load_all(&self) -> Result<(), DbError> {
        self.bunnies.load_all().await?;
        self.ztamps.load_all().await?;
        self.accounts.load_all().await?;
        Ok(())
    }

    pub async fn save_all(&self) -> Result<(), DbError> {
        self.bunnies.save_all().await?;
        self.ztamps.save_all().await?;
        self.accounts.save_all().await?;
        Ok(())
    }
}

/// Open the data directory, creating it if needed.
pub fn open(config: &StoreConfig) -> Result<(JsonStore, Entities), DbError> {
    let store = JsonStore::open(&config.data_dir, &Entities::KINDS)?;
    let entities = Entities::new(&store, TimeDelta::seconds(config.token_ttl_secs));
    Ok((store, entities))
}
