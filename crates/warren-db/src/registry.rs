//! Generic in-memory entity registry with write-back persistence.
//!
//! A registry owns its entities and hands out `Arc` clones. Lookups by key are
//! lazy for kinds implementing [`LazyEntity`]: the first reference to a key
//! creates the entity under the registry write lock, so concurrent callers
//! always observe the same instance.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};

use crate::{DbError, EntityId, JsonStore};

/// A persisted entity kind.
pub trait Entity: Send + Sync + Sized + 'static {
    /// Directory name in the store and label in logs.
    const KIND: &'static str;

    type Record: Serialize + DeserializeOwned + Send + Sync;

    fn id(&self) -> &EntityId;

    fn to_record(&self) -> Self::Record;

    fn from_record(id: EntityId, record: Self::Record) -> Self;

    /// Whether a capability holder may obtain this entity through
    /// [`Registry::get_if_owned`].
    fn admits(&self, _holder: &Capability<'_>) -> bool {
        true
    }
}

/// Entity kinds that are created on first reference.
pub trait LazyEntity: Entity {
    fn create(id: EntityId) -> Self;
}

/// Identity of a plugin asking for an entity.
#[derive(Debug, Clone, Copy)]
pub struct Capability<'a> {
    pub holder: &'a str,
    /// Scoped holders only see entities that explicitly granted them access.
    pub scoped: bool,
}

pub struct Registry<K: Entity> {
    entries: RwLock<IndexMap<EntityId, Arc<K>>>,
    store: JsonStore,
}

impl<K: Entity> Registry<K> {
    pub fn new(store: JsonStore) -> Self {
        Self {
            entries: RwLock::new(IndexMap::new()),
            store,
        }
    }

    pub fn find(&self, id: &EntityId) -> Option<Arc<K>> {
        self.entries.read().get(id).cloned()
    }

    pub fn find_hex(&self, hex: &str) -> Option<Arc<K>> {
        EntityId::from_hex(hex).ok().and_then(|id| self.find(&id))
    }

    /// Register an explicitly constructed entity.
    pub fn insert(&self, entity: K) -> Result<Arc<K>, DbError> {
        let mut entries = self.entries.write();
        if entries.contains_key(entity.id()) {
            return Err(DbError::AlreadyExists {
                kind: K::KIND,
                key: entity.id().to_hex(),
            });
        }
        let entity = Arc::new(entity);
        entries.insert(entity.id().clone(), entity.clone());
        Ok(entity)
    }

    /// Drop an entity from the in-memory index only.
    pub fn evict(&self, id: &EntityId) -> Option<Arc<K>> {
        self.entries.write().shift_remove(id)
    }

    /// Remove an entity's document from storage.
    pub async fn purge(&self, id: &EntityId) -> Result<(), DbError> {
        self.store.remove(K::KIND, id).await
    }

    /// Remove from index and storage. Deleting an absent key is not an error;
    /// the return value tells whether the entity was indexed.
    pub async fn delete(&self, id: &EntityId) -> Result<bool, DbError> {
        let removed = self.evict(id);
        self.purge(id).await?;
        if removed.is_some() {
            tracing::debug!(kind = K::KIND, id = %id, "entity deleted");
        }
        Ok(removed.is_some())
    }

    /// Snapshot of every entity, in insertion order.
    pub fn list(&self) -> Vec<Arc<K>> {
        self.entries.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub async fn save(&self, entity: &K) -> Result<(), DbError> {
        self.store
            .write(K::KIND, entity.id(), &entity.to_record())
            .await
    }

    /// Hydrate the registry from storage. Entities already indexed are kept.
    pub async fn load_all(&self) -> Result<usize, DbError> {
        let records = self.store.read_all::<K::Record>(K::KIND).await?;
        let mut entries = self.entries.write();
        let mut loaded = 0;
        for (id, record) in records {
            if entries.contains_key(&id) {
                continue;
            }
            entries.insert(id.clone(), Arc::new(K::from_record(id, record)));
            loaded += 1;
        }
        tracing::info!(kind = K::KIND, count = loaded, "entities loaded");
        Ok(loaded)
    }

    /// Flush every entity to storage.
    pub async fn save_all(&self) -> Result<usize, DbError> {
        let snapshot = self.list();
        for entity in &snapshot {
            self.save(entity).await?;
        }
        tracing::info!(kind = K::KIND, count = snapshot.len(), "entities saved");
        Ok(snapshot.len())
    }
}

impl<K: LazyEntity> Registry<K> {
    /// Return the entity for `id`, creating it on first reference.
    /// An empty key never creates anything.
    pub fn get(&self, id: &EntityId) -> Option<Arc<K>> {
        if id.is_empty() {
            return None;
        }
        if let Some(entity) = self.find(id) {
            return Some(entity);
        }
        let mut entries = self.entries.write();
        let entity = entries
            .entry(id.clone())
            .or_insert_with(|| {
                tracing::debug!(kind = K::KIND, id = %id, "entity created");
                Arc::new(K::create(id.clone()))
            })
            .clone();
        Some(entity)
    }

    pub fn get_hex(&self, hex: &str) -> Option<Arc<K>> {
        let id = EntityId::from_hex(hex).ok()?;
        self.get(&id)
    }

    /// Like [`Registry::get`], but the entity may refuse the capability holder.
    pub fn get_if_owned(&self, id: &EntityId, holder: &Capability<'_>) -> Option<Arc<K>> {
        let entity = self.get(id)?;
        if entity.admits(holder) {
            Some(entity)
        } else {
            tracing::warn!(
                kind = K::KIND,
                id = %id,
                plugin = holder.holder,
                "entity refused access to plugin"
            );
            None
        }
    }
}
