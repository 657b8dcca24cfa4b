// src/config/model.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::engine::{EngineOptions, DEFAULT_TIMEOUT_MS};
use crate::scheduler::DEFAULT_INTERVAL_SECONDS;
use crate::types::BackendPreference;

/// Configuration exactly as deserialized from TOML, before validation.
///
/// ```toml
/// [engine]
/// backend = "auto"
/// timeout_ms = 10000
///
/// [storage]
/// path = ".tickscript/entities.json"
///
/// [host]
/// states = "states.json"
///
/// [entity.kitchen]
/// interval = 30
/// script = "return states['light.kitchen'].state"
/// ```
///
/// All sections are optional at this stage; [`ConfigFile`] is only built
/// from a raw file that passes validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub host: HostSection,

    /// All entities from `[entity.<id>]`, keyed by entity id.
    #[serde(default)]
    pub entity: BTreeMap<String, EntitySection>,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub engine: EngineSection,
    pub storage: StorageSection,
    pub host: HostSection,
    pub entity: BTreeMap<String, EntitySection>,
    /// Directory relative paths are resolved against; the config file's
    /// own directory when loaded from disk.
    pub base_dir: PathBuf,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            engine: raw.engine,
            storage: raw.storage,
            host: raw.host,
            entity: raw.entity,
            base_dir: PathBuf::from("."),
        }
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    /// Resolve a configured path against [`base_dir`](Self::base_dir).
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// `"auto"`, `"external"`, `"embedded"` or `"native"`.
    #[serde(default)]
    pub backend: BackendPreference,

    /// Per-execution budget in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Interpreter used by the external backend. Looked up on `PATH`, not
    /// resolved against the config directory.
    #[serde(default = "default_node_path")]
    pub node_path: PathBuf,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_node_path() -> PathBuf {
    PathBuf::from("node")
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            backend: BackendPreference::default(),
            timeout_ms: default_timeout_ms(),
            node_path: default_node_path(),
        }
    }
}

impl EngineSection {
    pub fn options(&self) -> EngineOptions {
        EngineOptions {
            backend: self.backend,
            timeout_ms: self.timeout_ms,
            node_path: self.node_path.clone(),
        }
    }
}

/// `[storage]` section. Without a `path`, configuration lives in memory
/// only.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageSection {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// `[host]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostSection {
    /// JSON document with the entity states scripts read.
    #[serde(default)]
    pub states: Option<PathBuf>,

    /// JSON-lines file dispatched service calls are appended to. Calls are
    /// only logged when absent.
    #[serde(default)]
    pub service_log: Option<PathBuf>,
}

/// `[entity.<id>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EntitySection {
    /// Ticker interval in seconds.
    #[serde(default = "default_interval")]
    pub interval: i64,

    /// Inline script source.
    #[serde(default)]
    pub script: Option<String>,

    /// Script read from a file; mutually exclusive with `script`.
    #[serde(default)]
    pub script_file: Option<PathBuf>,

    #[serde(default)]
    pub html_template: Option<String>,

    #[serde(default)]
    pub css_styles: Option<String>,
}

fn default_interval() -> i64 {
    DEFAULT_INTERVAL_SECONDS
}
