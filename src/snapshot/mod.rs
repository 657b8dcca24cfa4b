// src/snapshot/mod.rs

//! Capability snapshot builder.
//!
//! Every execution gets a fresh, immutable [`Snapshot`] of the host's entity
//! states. Host records arrive as [`HostState`] values where every field is
//! optional; [`build_snapshot`] resolves each missing field to a documented
//! default so the evaluator never has to probe for field existence:
//!
//! | field          | default                                   |
//! |----------------|-------------------------------------------|
//! | `state`        | `"unknown"`                               |
//! | `attributes`   | empty map                                 |
//! | `domain`       | prefix of the entity id before the first `.` |
//! | `last_changed` | build time of the snapshot                |
//! | `last_updated` | `last_changed`                            |
//!
//! The builder is a pure function of its inputs plus the build timestamp.

pub mod provider;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use provider::{JsonFileSnapshotProvider, SnapshotProvider, StaticSnapshotProvider};

/// State string used when the host record carries none.
pub const UNKNOWN_STATE: &str = "unknown";

/// One entity as seen by a script.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityState {
    pub state: String,
    pub attributes: IndexMap<String, Value>,
    pub domain: String,
    pub last_changed: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Entry of the optional third-party catalog (`HACS.repositories`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogRepository {
    pub name: String,
    pub installed: bool,
    pub category: String,
}

/// Raw host-side state record. All fields are optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostState {
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub attributes: Option<IndexMap<String, Value>>,
    #[serde(default)]
    pub last_changed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Raw catalog record as the host exposes it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostRepository {
    #[serde(default, alias = "name")]
    pub full_name: Option<String>,
    #[serde(default)]
    pub installed: Option<bool>,
    #[serde(default)]
    pub category: Option<String>,
}

/// Immutable view of all known entities at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    entities: BTreeMap<String, EntityState>,
    catalog: Vec<CatalogRepository>,
    taken_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn get(&self, entity_id: &str) -> Option<&EntityState> {
        self.entities.get(entity_id)
    }

    pub fn entities(&self) -> impl Iterator<Item = (&str, &EntityState)> {
        self.entities.iter().map(|(id, st)| (id.as_str(), st))
    }

    pub fn catalog(&self) -> &[CatalogRepository] {
        &self.catalog
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn taken_at(&self) -> Option<DateTime<Utc>> {
        self.taken_at
    }

    /// Entity ids whose domain prefix equals `domain`.
    pub fn ids_in_domain<'a>(&'a self, domain: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entities
            .iter()
            .filter(move |(_, st)| st.domain == domain)
            .map(|(id, _)| id.as_str())
    }

    /// JSON form handed to the JavaScript backends:
    /// `{ "<id>": { state, attributes, domain, last_changed, last_updated } }`.
    pub fn states_json(&self) -> Value {
        let mut map = Map::new();
        for (id, st) in &self.entities {
            map.insert(id.clone(), entity_json(st));
        }
        Value::Object(map)
    }

    /// JSON form of the catalog (`[{ name, installed, category }]`).
    pub fn catalog_json(&self) -> Value {
        serde_json::to_value(&self.catalog).unwrap_or(Value::Array(Vec::new()))
    }
}

pub(crate) fn entity_json(st: &EntityState) -> Value {
    let mut obj = Map::new();
    obj.insert("state".into(), Value::String(st.state.clone()));
    obj.insert(
        "attributes".into(),
        Value::Object(st.attributes.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
    );
    obj.insert("domain".into(), Value::String(st.domain.clone()));
    obj.insert("last_changed".into(), Value::String(st.last_changed.to_rfc3339()));
    obj.insert("last_updated".into(), Value::String(st.last_updated.to_rfc3339()));
    Value::Object(obj)
}

/// Domain prefix of an entity id (`"light.kitchen"` -> `"light"`).
pub fn domain_of(entity_id: &str) -> &str {
    entity_id.split_once('.').map(|(d, _)| d).unwrap_or(entity_id)
}

/// Build a snapshot from host records, using `now` for missing timestamps.
///
/// Records without an entity id are skipped. If two records share an id the
/// later one wins.
pub fn build_snapshot<I>(states: I, catalog: Option<Vec<HostRepository>>, now: DateTime<Utc>) -> Snapshot
where
    I: IntoIterator<Item = HostState>,
{
    let mut entities = BTreeMap::new();

    for raw in states {
        let Some(entity_id) = raw.entity_id.filter(|id| !id.trim().is_empty()) else {
            continue;
        };
        let last_changed = raw.last_changed.unwrap_or(now);
        let entity = EntityState {
            state: raw.state.unwrap_or_else(|| UNKNOWN_STATE.to_string()),
            attributes: raw.attributes.unwrap_or_default(),
            domain: domain_of(&entity_id).to_string(),
            last_changed,
            last_updated: raw.last_updated.unwrap_or(last_changed),
        };
        entities.insert(entity_id, entity);
    }

    let catalog = catalog
        .unwrap_or_default()
        .into_iter()
        .map(|repo| CatalogRepository {
            name: repo.full_name.unwrap_or_else(|| UNKNOWN_STATE.to_string()),
            installed: repo.installed.unwrap_or(false),
            category: repo.category.unwrap_or_else(|| UNKNOWN_STATE.to_string()),
        })
        .collect();

    Snapshot {
        entities,
        catalog,
        taken_at: Some(now),
    }
}
