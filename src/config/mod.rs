// src/config/mod.rs

//! Configuration loading and validation for tickscript.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file and entity scripts (`loader.rs`).
//! - Validate entity and engine settings (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, entity_update, load_and_validate, load_from_path, read_script};
pub use model::{ConfigFile, EngineSection, EntitySection, HostSection, RawConfigFile, StorageSection};
pub use validate::validate_raw_config;
