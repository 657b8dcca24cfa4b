// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{ControllerError, Result};
use crate::scheduler::{MAX_INTERVAL_SECONDS, MIN_INTERVAL_SECONDS};

pub const MAX_TIMEOUT_MS: u64 = 600_000;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ControllerError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

pub fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_entities(cfg)?;
    validate_engine(cfg)?;
    validate_entities(cfg)?;
    Ok(())
}

fn ensure_has_entities(cfg: &RawConfigFile) -> Result<()> {
    if cfg.entity.is_empty() {
        return Err(ControllerError::ConfigError(
            "config must contain at least one [entity.<id>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_engine(cfg: &RawConfigFile) -> Result<()> {
    let timeout_ms = cfg.engine.timeout_ms;
    if !(1..=MAX_TIMEOUT_MS).contains(&timeout_ms) {
        return Err(ControllerError::ConfigError(format!(
            "[engine].timeout_ms must be within 1..={MAX_TIMEOUT_MS} (got {timeout_ms})"
        )));
    }
    Ok(())
}

fn validate_entities(cfg: &RawConfigFile) -> Result<()> {
    for (id, entity) in cfg.entity.iter() {
        if id.trim().is_empty() {
            return Err(ControllerError::ConfigError(
                "entity ids must not be empty".to_string(),
            ));
        }

        match (&entity.script, &entity.script_file) {
            (Some(_), Some(_)) => {
                return Err(ControllerError::ConfigError(format!(
                    "entity '{id}' sets both `script` and `script_file`"
                )));
            }
            (None, None) => {
                return Err(ControllerError::ConfigError(format!(
                    "entity '{id}' needs one of `script` or `script_file`"
                )));
            }
            _ => {}
        }

        if !(MIN_INTERVAL_SECONDS..=MAX_INTERVAL_SECONDS).contains(&entity.interval) {
            return Err(ControllerError::ConfigError(format!(
                "entity '{id}': interval must be within {MIN_INTERVAL_SECONDS}..={MAX_INTERVAL_SECONDS} seconds (got {})",
                entity.interval
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<ConfigFile> {
        let raw: RawConfigFile = toml::from_str(text)?;
        ConfigFile::try_from(raw)
    }

    fn message(result: Result<ConfigFile>) -> String {
        match result {
            Err(ControllerError::ConfigError(msg)) => msg,
            other => panic!("expected a config error, got {other:?}"),
        }
    }

    #[test]
    fn accepts_a_minimal_entity() {
        let cfg = parse("[entity.kitchen]\nscript = \"return 1\"\n").unwrap();
        let kitchen = &cfg.entity["kitchen"];
        assert_eq!(kitchen.interval, 30);
        assert_eq!(cfg.engine.timeout_ms, 10_000);
    }

    #[test]
    fn requires_at_least_one_entity() {
        assert!(message(parse("[engine]\nbackend = \"native\"\n")).contains("at least one"));
    }

    #[test]
    fn script_and_script_file_are_exclusive() {
        let both = "[entity.a]\nscript = \"1\"\nscript_file = \"a.js\"\n";
        assert!(message(parse(both)).contains("both"));
        assert!(message(parse("[entity.a]\ninterval = 5\n")).contains("one of"));
    }

    #[test]
    fn bounds_interval_and_timeout() {
        let slow = "[entity.a]\nscript = \"1\"\ninterval = 5000\n";
        assert!(message(parse(slow)).contains("interval"));
        let zero = "[entity.a]\nscript = \"1\"\ninterval = 0\n";
        assert!(message(parse(zero)).contains("interval"));

        let timeout = "[engine]\ntimeout_ms = 0\n[entity.a]\nscript = \"1\"\n";
        assert!(message(parse(timeout)).contains("timeout_ms"));
    }

    #[test]
    fn unknown_backends_fail_to_deserialize() {
        let text = "[engine]\nbackend = \"python\"\n[entity.a]\nscript = \"1\"\n";
        assert!(matches!(parse(text), Err(ControllerError::TomlError(_))));
    }
}
