use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::{DbError, EntityId};

/// One JSON document per entity at `<root>/<kind>/<hex id>.json`, plus
/// free-standing documents at `<root>/<name>.json`.
#[derive(Debug, Clone)]
pub struct JsonStore {
    root: PathBuf,
}

impl JsonStore {
    /// Open the store, creating the root and one directory per entity kind.
    pub fn open(root: impl Into<PathBuf>, kinds: &[&str]) -> Result<Self, DbError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        for kind in kinds {
            std::fs::create_dir_all(root.join(kind))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entity_path(&self, kind: &str, id: &EntityId) -> PathBuf {
        self.root.join(kind).join(format!("{}.json", id.to_hex()))
    }

    /// Read every document of a kind. Undecodable files are skipped with a warning.
    pub async fn read_all<R: DeserializeOwned>(
        &self,
        kind: &str,
    ) -> Result<Vec<(EntityId, R)>, DbError> {
        let dir = self.root.join(kind);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let id = match EntityId::from_hex(stem) {
                Ok(id) if !id.is_empty() => id,
                _ => {
                    tracing::warn!(path = %path.display(), "skipping file with malformed key");
                    continue;
                }
            };
            let bytes = tokio::fs::read(&path).await?;
            match serde_json::from_slice(&bytes) {
                Ok(record) => records.push((id, record)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable record");
                }
            }
        }
        Ok(records)
    }

    pub async fn write<R: Serialize>(
        &self,
        kind: &str,
        id: &EntityId,
        record: &R,
    ) -> Result<(), DbError> {
        let path = self.entity_path(kind, id);
        write_atomic(&path, record).await
    }

    /// Remove an entity document. Missing files are not an error.
    pub async fn remove(&self, kind: &str, id: &EntityId) -> Result<(), DbError> {
        match tokio::fs::remove_file(self.entity_path(kind, id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn read_doc<R: DeserializeOwned>(&self, name: &str) -> Result<Option<R>, DbError> {
        let path = self.root.join(format!("{name}.json"));
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn write_doc<R: Serialize>(&self, name: &str, doc: &R) -> Result<(), DbError> {
        write_atomic(&self.root.join(format!("{name}.json")), doc).await
    }
}

async fn write_atomic<R: Serialize>(path: &Path, record: &R) -> Result<(), DbError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let bytes = serde_json::to_vec_pretty(record)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
