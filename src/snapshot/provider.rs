// src/snapshot/provider.rs

//! Snapshot sources.
//!
//! The scheduler pulls a fresh snapshot through [`SnapshotProvider::read_all`]
//! right before every execution. Providers own the raw host records and run
//! them through [`build_snapshot`] each time, so no snapshot is ever shared
//! between executions.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use chrono::Utc;
use indexmap::IndexMap;
use serde::Deserialize;
use tracing::warn;

use crate::fs::{FileSystem, RealFileSystem};

use super::{build_snapshot, HostRepository, HostState, Snapshot};

/// Read-only source of host state.
pub trait SnapshotProvider: Send + Sync {
    fn read_all(&self) -> Snapshot;
}

/// In-memory provider. Records can be replaced between executions.
#[derive(Debug, Default)]
pub struct StaticSnapshotProvider {
    inner: RwLock<(Vec<HostState>, Option<Vec<HostRepository>>)>,
}

impl StaticSnapshotProvider {
    pub fn new(states: Vec<HostState>) -> Self {
        Self {
            inner: RwLock::new((states, None)),
        }
    }

    pub fn with_catalog(self, catalog: Vec<HostRepository>) -> Self {
        let (states, _) = self.inner.into_inner().unwrap_or_else(|e| e.into_inner());
        Self {
            inner: RwLock::new((states, Some(catalog))),
        }
    }

    /// Convenience: build from `(entity_id, state)` pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let states = pairs
            .into_iter()
            .map(|(id, state)| HostState {
                entity_id: Some(id.to_string()),
                state: Some(state.to_string()),
                ..HostState::default()
            })
            .collect();
        Self::new(states)
    }

    /// Insert or replace a single record.
    pub fn set(&self, record: HostState) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let id = record.entity_id.clone();
        guard.0.retain(|s| s.entity_id != id);
        guard.0.push(record);
    }
}

impl SnapshotProvider for StaticSnapshotProvider {
    fn read_all(&self) -> Snapshot {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        build_snapshot(guard.0.iter().cloned(), guard.1.clone(), Utc::now())
    }
}

/// Provider that re-reads a JSON document on every call.
///
/// Accepted layouts:
///
/// ```json
/// { "light.kitchen": { "state": "on", "attributes": { "brightness": 200 } } }
/// ```
///
/// ```json
/// [ { "entity_id": "light.kitchen", "state": "on" } ]
/// ```
///
/// ```json
/// { "states": { ... } , "catalog": [ { "full_name": "org/card", "installed": true } ] }
/// ```
///
/// A missing or malformed file yields an empty snapshot and a warning.
#[derive(Debug, Clone)]
pub struct JsonFileSnapshotProvider {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl JsonFileSnapshotProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_fs(path, Arc::new(RealFileSystem))
    }

    pub fn with_fs(path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            path: path.into(),
            fs,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<(Vec<HostState>, Option<Vec<HostRepository>>)> {
        let text = self.fs.read_to_string(&self.path)?;
        parse_states_document(&text)
            .with_context(|| format!("parsing states document {:?}", self.path))
    }
}

impl SnapshotProvider for JsonFileSnapshotProvider {
    fn read_all(&self) -> Snapshot {
        match self.load() {
            Ok((states, catalog)) => build_snapshot(states, catalog, Utc::now()),
            Err(err) => {
                warn!(path = ?self.path, error = %err, "failed to read states; using empty snapshot");
                build_snapshot(Vec::new(), None, Utc::now())
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StatesList {
    Keyed(IndexMap<String, HostState>),
    List(Vec<HostState>),
}

impl StatesList {
    fn into_records(self) -> Vec<HostState> {
        match self {
            StatesList::Keyed(map) => map
                .into_iter()
                .map(|(id, mut st)| {
                    st.entity_id = Some(id);
                    st
                })
                .collect(),
            StatesList::List(list) => list,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StatesDocument {
    Full {
        states: StatesList,
        #[serde(default, alias = "hacs")]
        catalog: Option<Vec<HostRepository>>,
    },
    Bare(StatesList),
}

/// Parse any of the accepted states layouts.
pub fn parse_states_document(text: &str) -> Result<(Vec<HostState>, Option<Vec<HostRepository>>)> {
    let doc: StatesDocument = serde_json::from_str(text)?;
    Ok(match doc {
        StatesDocument::Full { states, catalog } => (states.into_records(), catalog),
        StatesDocument::Bare(states) => (states.into_records(), None),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn keyed_document_takes_ids_from_keys() {
        let (states, catalog) =
            parse_states_document(r#"{ "light.kitchen": { "state": "on" } }"#).unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].entity_id.as_deref(), Some("light.kitchen"));
        assert!(catalog.is_none());
    }

    #[test]
    fn full_document_carries_catalog() {
        let (states, catalog) = parse_states_document(
            r#"{ "states": [ { "entity_id": "switch.fan", "state": "off" } ],
                 "catalog": [ { "full_name": "org/card", "installed": true } ] }"#,
        )
        .unwrap();
        assert_eq!(states[0].state.as_deref(), Some("off"));
        assert_eq!(catalog.unwrap()[0].installed, Some(true));
    }

    #[test]
    fn missing_file_yields_empty_snapshot() {
        let fs = Arc::new(MockFileSystem::new());
        let provider = JsonFileSnapshotProvider::with_fs("nope.json", fs);
        assert!(provider.read_all().is_empty());
    }

    #[test]
    fn file_is_reread_each_time() {
        let fs = Arc::new(MockFileSystem::new());
        fs.add_file("states.json", r#"{ "light.a": { "state": "on" } }"#);
        let provider = JsonFileSnapshotProvider::with_fs("states.json", fs.clone());
        assert_eq!(provider.read_all().get("light.a").unwrap().state, "on");

        fs.add_file("states.json", r#"{ "light.a": { "state": "off" } }"#);
        assert_eq!(provider.read_all().get("light.a").unwrap().state, "off");
    }
}
