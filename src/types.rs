use std::str::FromStr;
use serde::{Deserialize, Serialize};

/// Which script backend the engine should use.
///
/// - `Auto`: probe availability once and take the first available backend in
///   the fixed preference order (external > embedded > native).
/// - any other value forces that backend; if it is unavailable the engine
///   still falls back down the same order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    Auto,
    External,
    Embedded,
    Native,
}

impl Default for BackendPreference {
    fn default() -> Self {
        BackendPreference::Auto
    }
}

impl FromStr for BackendPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(BackendPreference::Auto),
            "external" => Ok(BackendPreference::External),
            "embedded" => Ok(BackendPreference::Embedded),
            "native" => Ok(BackendPreference::Native),
            other => Err(format!(
                "invalid backend: {other} (expected \"auto\", \"external\", \"embedded\" or \"native\")"
            )),
        }
    }
}

/// Why an entity's script is being executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    /// Periodic ticker fire.
    Timer,
    /// Manual "execute now" request.
    Manual,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_preference_parses_case_insensitively() {
        assert_eq!(" Native ".parse::<BackendPreference>(), Ok(BackendPreference::Native));
        assert_eq!("AUTO".parse::<BackendPreference>(), Ok(BackendPreference::Auto));
        assert!("python".parse::<BackendPreference>().is_err());
    }
}
