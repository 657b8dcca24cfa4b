// src/storage/file.rs

//! Versioned JSON document store.
//!
//! Layout on disk:
//!
//! ```json
//! { "version": 1, "key": "universal_controller_entities", "data": { "<id>": { ... } } }
//! ```
//!
//! The document is read lazily on first access and cached; every mutation
//! rewrites the whole file through [`FileSystem::write`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{ConfigStore, EntityConfig, StoreFuture};
use crate::errors::{ControllerError, Result};
use crate::fs::{FileSystem, RealFileSystem};

pub const STORAGE_VERSION: u32 = 1;
pub const STORAGE_KEY: &str = "universal_controller_entities";

#[derive(Debug, Serialize, Deserialize)]
struct Document {
    version: u32,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    data: IndexMap<String, EntityConfig>,
}

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
    cache: Mutex<Option<IndexMap<String, EntityConfig>>>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_fs(path, Arc::new(RealFileSystem))
    }

    pub fn with_fs(path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            path: path.into(),
            fs,
            cache: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<IndexMap<String, EntityConfig>> {
        if !self.fs.exists(&self.path) {
            debug!(path = ?self.path, "no stored configuration yet");
            return Ok(IndexMap::new());
        }
        let text = self
            .fs
            .read_to_string(&self.path)
            .map_err(|e| ControllerError::PersistenceError(format!("{e:#}")))?;
        let doc: Document = serde_json::from_str(&text).map_err(|e| {
            ControllerError::PersistenceError(format!("parsing {:?}: {e}", self.path))
        })?;
        if doc.version != STORAGE_VERSION {
            return Err(ControllerError::PersistenceError(format!(
                "unsupported storage version {} in {:?} (expected {STORAGE_VERSION})",
                doc.version, self.path
            )));
        }
        Ok(doc.data)
    }

    fn write_document(&self, data: &IndexMap<String, EntityConfig>) -> Result<()> {
        let doc = serde_json::json!({
            "version": STORAGE_VERSION,
            "key": STORAGE_KEY,
            "data": data,
        });
        let bytes = serde_json::to_vec_pretty(&doc)?;
        self.fs
            .write(&self.path, &bytes)
            .map_err(|e| ControllerError::PersistenceError(format!("{e:#}")))
    }

    /// Run `f` on the cached map (loading it first), then persist when `f`
    /// reports a change.
    async fn with_data<T>(
        &self,
        f: impl FnOnce(&mut IndexMap<String, EntityConfig>) -> (T, bool),
    ) -> Result<T> {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            *cache = Some(self.read_document()?);
        }
        let Some(data) = cache.as_mut() else {
            return Err(ControllerError::PersistenceError("store cache unavailable".into()));
        };
        let (out, changed) = f(data);
        if changed {
            self.write_document(data)?;
        }
        Ok(out)
    }
}

impl ConfigStore for JsonFileStore {
    fn load(&self, entity_id: &str) -> StoreFuture<'_, Option<EntityConfig>> {
        let id = entity_id.to_string();
        Box::pin(async move { self.with_data(|data| (data.get(&id).cloned(), false)).await })
    }

    fn save(&self, entity_id: &str, config: EntityConfig) -> StoreFuture<'_, ()> {
        let id = entity_id.to_string();
        Box::pin(async move {
            self.with_data(|data| {
                data.insert(id.clone(), config);
                ((), true)
            })
            .await?;
            info!(entity = %id, "saved configuration");
            Ok(())
        })
    }

    fn remove(&self, entity_id: &str) -> StoreFuture<'_, ()> {
        let id = entity_id.to_string();
        Box::pin(async move {
            let removed = self
                .with_data(|data| {
                    let removed = data.shift_remove(&id).is_some();
                    (removed, removed)
                })
                .await?;
            if removed {
                info!(entity = %id, "removed configuration");
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn store(fs: &MockFileSystem) -> JsonFileStore {
        JsonFileStore::with_fs("/data/entities.json", Arc::new(fs.clone()))
    }

    #[tokio::test]
    async fn writes_versioned_document() {
        let fs = MockFileSystem::new();
        store(&fs).save("kitchen", EntityConfig::default()).await.unwrap();

        let doc: serde_json::Value =
            serde_json::from_str(&fs.contents("/data/entities.json").unwrap()).unwrap();
        assert_eq!(doc["version"], 1);
        assert_eq!(doc["key"], STORAGE_KEY);
        assert_eq!(doc["data"]["kitchen"]["interval"], 30);
    }

    #[tokio::test]
    async fn reads_what_a_previous_process_wrote() {
        let fs = MockFileSystem::new();
        fs.add_file(
            "/data/entities.json",
            r#"{ "version": 1, "key": "universal_controller_entities",
                 "data": { "hall": { "html_template": "", "css_styles": "",
                                     "typescript_code": "return 1", "interval": 12 } } }"#,
        );
        let cfg = store(&fs).load("hall").await.unwrap().unwrap();
        assert_eq!(cfg.interval_seconds, 12);
        assert_eq!(cfg.script_source, "return 1");
    }

    #[tokio::test]
    async fn version_mismatch_is_a_persistence_error() {
        let fs = MockFileSystem::new();
        fs.add_file("/data/entities.json", r#"{ "version": 2, "data": {} }"#);
        let err = store(&fs).load("x").await.unwrap_err();
        assert!(matches!(err, ControllerError::PersistenceError(_)));
    }

    #[tokio::test]
    async fn failed_write_surfaces_as_persistence_error() {
        let fs = MockFileSystem::new();
        fs.set_fail_writes(true);
        let err = store(&fs).save("x", EntityConfig::default()).await.unwrap_err();
        assert!(matches!(err, ControllerError::PersistenceError(_)));
    }

    #[tokio::test]
    async fn remove_drops_the_record() {
        let fs = MockFileSystem::new();
        let store = store(&fs);
        store.save("a", EntityConfig::default()).await.unwrap();
        store.remove("a").await.unwrap();
        assert_eq!(store.load("a").await.unwrap(), None);
        assert!(!fs.contents("/data/entities.json").unwrap().contains("\"a\""));
    }
}
