// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `tickscript`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "tickscript",
    version,
    about = "Run small controller scripts on a timer against a snapshot of entity states.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Tickscript.toml")]
    pub config: String,

    /// Execute every entity once, print their attributes as JSON and exit.
    #[arg(long)]
    pub once: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TICKSCRIPT_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the selected backend and each entity's
    /// normalized script, but don't execute anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Reload `script_file` sources when they change on disk.
    #[arg(long)]
    pub watch: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_tickscript_toml() {
        let args = CliArgs::parse_from(["tickscript"]);
        assert_eq!(args.config, "Tickscript.toml");
        assert!(!args.once && !args.dry_run && !args.watch);
        assert!(args.log_level.is_none());
    }

    #[test]
    fn parses_flags() {
        let args = CliArgs::parse_from([
            "tickscript",
            "--config",
            "conf/home.toml",
            "--once",
            "--log-level",
            "debug",
        ]);
        assert_eq!(args.config, "conf/home.toml");
        assert!(args.once);
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    }
}
