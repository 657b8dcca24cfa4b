#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use tickscript::config::{
    ConfigFile, EngineSection, EntitySection, HostSection, RawConfigFile, StorageSection,
};
use tickscript::types::BackendPreference;

/// Builder for `ConfigFile` to simplify test setup. Defaults to the native
/// backend so tests never depend on an installed interpreter.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
    base_dir: Option<PathBuf>,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                engine: EngineSection {
                    backend: BackendPreference::Native,
                    ..EngineSection::default()
                },
                storage: StorageSection::default(),
                host: HostSection::default(),
                entity: BTreeMap::new(),
            },
            base_dir: None,
        }
    }

    pub fn with_entity(mut self, id: &str, entity: EntitySection) -> Self {
        self.config.entity.insert(id.to_string(), entity);
        self
    }

    pub fn backend(mut self, backend: BackendPreference) -> Self {
        self.config.engine.backend = backend;
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.engine.timeout_ms = timeout_ms;
        self
    }

    pub fn storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.storage.path = Some(path.into());
        self
    }

    pub fn states(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.host.states = Some(path.into());
        self
    }

    pub fn service_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.host.service_log = Some(path.into());
        self
    }

    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        let cfg = ConfigFile::try_from(self.config).expect("Failed to build valid config from builder");
        match self.base_dir {
            Some(dir) => cfg.with_base_dir(dir),
            None => cfg,
        }
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `EntitySection`.
pub struct EntityBuilder {
    entity: EntitySection,
}

impl EntityBuilder {
    /// Entity with an inline script and the default interval.
    pub fn script(source: &str) -> Self {
        Self {
            entity: EntitySection {
                interval: tickscript::scheduler::DEFAULT_INTERVAL_SECONDS,
                script: Some(source.to_string()),
                script_file: None,
                html_template: None,
                css_styles: None,
            },
        }
    }

    /// Entity whose script is read from `path`.
    pub fn script_file(path: impl Into<PathBuf>) -> Self {
        let mut builder = Self::script("");
        builder.entity.script = None;
        builder.entity.script_file = Some(path.into());
        builder
    }

    pub fn interval(mut self, seconds: i64) -> Self {
        self.entity.interval = seconds;
        self
    }

    pub fn html_template(mut self, template: &str) -> Self {
        self.entity.html_template = Some(template.to_string());
        self
    }

    pub fn css_styles(mut self, css: &str) -> Self {
        self.entity.css_styles = Some(css.to_string());
        self
    }

    pub fn build(self) -> EntitySection {
        self.entity
    }
}
