// src/config/loader.rs

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::config::model::{ConfigFile, EntitySection, RawConfigFile};
use crate::errors::Result;
use crate::fs::FileSystem;
use crate::scheduler::ConfigUpdate;

/// Load a configuration file and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; use [`load_and_validate`] for
/// the checked form.
pub fn load_from_path(fs: &dyn FileSystem, path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs
        .read_to_string(path)
        .with_context(|| format!("loading config {:?}", path))?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load and validate. Relative paths in the result resolve against the
/// config file's directory.
pub fn load_and_validate(fs: &dyn FileSystem, path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let raw_config = load_from_path(fs, path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config.with_base_dir(config_dir(path)))
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("Tickscript.toml")
}

/// Directory holding `config_path`; `.` for a bare file name.
pub fn config_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Script source for an entity: the inline `script`, or the contents of
/// `script_file`.
pub fn read_script(fs: &dyn FileSystem, cfg: &ConfigFile, entity: &EntitySection) -> Result<String> {
    if let Some(script) = &entity.script {
        return Ok(script.clone());
    }
    match &entity.script_file {
        Some(file) => {
            let path = cfg.resolve(file);
            let text = fs
                .read_to_string(&path)
                .with_context(|| format!("reading script_file {:?}", path))?;
            Ok(text)
        }
        None => Ok(String::new()),
    }
}

/// The configuration update that brings a registered entity in line with
/// its `[entity.<id>]` section.
pub fn entity_update(fs: &dyn FileSystem, cfg: &ConfigFile, entity: &EntitySection) -> Result<ConfigUpdate> {
    Ok(ConfigUpdate {
        html_template: entity.html_template.clone(),
        css_styles: entity.css_styles.clone(),
        script_source: Some(read_script(fs, cfg, entity)?),
        interval: Some(entity.interval),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ControllerError;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn resolves_script_files_next_to_the_config() {
        let fs = MockFileSystem::new();
        fs.add_file(
            "conf/Tickscript.toml",
            "[entity.porch]\ninterval = 10\nscript_file = \"scripts/porch.js\"\nhtml_template = \"<b>{{ result }}</b>\"\n",
        );
        fs.add_file("conf/scripts/porch.js", "return 'lit'");

        let cfg = load_and_validate(&fs, "conf/Tickscript.toml").unwrap();
        assert_eq!(cfg.base_dir, PathBuf::from("conf"));

        let update = entity_update(&fs, &cfg, &cfg.entity["porch"]).unwrap();
        assert_eq!(update.script_source.as_deref(), Some("return 'lit'"));
        assert_eq!(update.interval, Some(10));
        assert_eq!(update.html_template.as_deref(), Some("<b>{{ result }}</b>"));
        assert_eq!(update.css_styles, None);
    }

    #[test]
    fn missing_files_are_errors() {
        let fs = MockFileSystem::new();
        assert!(load_and_validate(&fs, "Tickscript.toml").is_err());

        fs.add_file("Tickscript.toml", "[entity.a]\nscript_file = \"gone.js\"\n");
        let cfg = load_and_validate(&fs, "Tickscript.toml").unwrap();
        assert_eq!(cfg.base_dir, PathBuf::from("."));
        assert!(matches!(
            read_script(&fs, &cfg, &cfg.entity["a"]),
            Err(ControllerError::Other(_))
        ));
    }
}
