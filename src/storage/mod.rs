// src/storage/mod.rs

//! Per-entity configuration persistence.
//!
//! The scheduler treats the store as an opaque async key-value collaborator:
//! it loads an entity's configuration on register and saves it after every
//! effective configuration change. Save failures are the caller's to log;
//! durability is best-effort.

pub mod file;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::errors::Result;

pub use file::JsonFileStore;

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

pub const DEFAULT_HTML_TEMPLATE: &str = "<div>Hello from Universal Controller!</div>";
pub const DEFAULT_CSS_STYLES: &str = "div { padding: 16px; background: #f0f0f0; }";
pub const DEFAULT_SCRIPT: &str = "return { message: 'Hello World', timestamp: new Date() };";
pub const DEFAULT_INTERVAL_SECONDS: i64 = 30;

/// Persisted entity configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityConfig {
    #[serde(default = "default_html")]
    pub html_template: String,
    #[serde(default = "default_css")]
    pub css_styles: String,
    #[serde(rename = "typescript_code", alias = "script", default = "default_script")]
    pub script_source: String,
    #[serde(rename = "interval", default = "default_interval")]
    pub interval_seconds: i64,
}

fn default_html() -> String {
    DEFAULT_HTML_TEMPLATE.to_string()
}

fn default_css() -> String {
    DEFAULT_CSS_STYLES.to_string()
}

fn default_script() -> String {
    DEFAULT_SCRIPT.to_string()
}

fn default_interval() -> i64 {
    DEFAULT_INTERVAL_SECONDS
}

impl Default for EntityConfig {
    fn default() -> Self {
        Self {
            html_template: default_html(),
            css_styles: default_css(),
            script_source: default_script(),
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
        }
    }
}

/// Async load/save store for entity configuration.
pub trait ConfigStore: Send + Sync {
    fn load(&self, entity_id: &str) -> StoreFuture<'_, Option<EntityConfig>>;

    fn save(&self, entity_id: &str, config: EntityConfig) -> StoreFuture<'_, ()>;

    fn remove(&self, entity_id: &str) -> StoreFuture<'_, ()>;
}

/// Non-durable store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, EntityConfig>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryStore {
    fn load(&self, entity_id: &str) -> StoreFuture<'_, Option<EntityConfig>> {
        let id = entity_id.to_string();
        Box::pin(async move { Ok(self.entries.read().await.get(&id).cloned()) })
    }

    fn save(&self, entity_id: &str, config: EntityConfig) -> StoreFuture<'_, ()> {
        let id = entity_id.to_string();
        Box::pin(async move {
            self.entries.write().await.insert(id, config);
            Ok(())
        })
    }

    fn remove(&self, entity_id: &str) -> StoreFuture<'_, ()> {
        let id = entity_id.to_string();
        Box::pin(async move {
            self.entries.write().await.remove(&id);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: EntityConfig = serde_json::from_str(r#"{ "interval": 5 }"#).unwrap();
        assert_eq!(cfg.interval_seconds, 5);
        assert_eq!(cfg.html_template, DEFAULT_HTML_TEMPLATE);
        assert_eq!(cfg.script_source, DEFAULT_SCRIPT);
    }

    #[test]
    fn serialises_with_stored_field_names() {
        let value = serde_json::to_value(EntityConfig::default()).unwrap();
        assert_eq!(value["interval"], 30);
        assert!(value.get("typescript_code").is_some());
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.load("a").await.unwrap(), None);

        let cfg = EntityConfig {
            interval_seconds: 7,
            ..EntityConfig::default()
        };
        store.save("a", cfg.clone()).await.unwrap();
        assert_eq!(store.load("a").await.unwrap(), Some(cfg));

        store.remove("a").await.unwrap();
        assert_eq!(store.load("a").await.unwrap(), None);
    }
}
