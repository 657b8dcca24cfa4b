// src/engine/outcome.rs

//! Values produced by an evaluation, shared by every backend.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A deferred side-effecting request produced during evaluation.
///
/// Consumed exactly once by the dispatcher, in production order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedCall {
    pub id: String,
    pub domain: String,
    pub service: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl QueuedCall {
    /// Id of the `index`-th call queued by one execution.
    pub fn id_for(index: usize) -> String {
        format!("service_call_{index}")
    }
}

/// Severity of a captured `console.*` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl ConsoleLevel {
    /// `console.<method>` name to level; `log` is info.
    pub fn from_method(name: &str) -> Option<Self> {
        match name {
            "log" | "info" => Some(ConsoleLevel::Info),
            "warn" => Some(ConsoleLevel::Warn),
            "error" => Some(ConsoleLevel::Error),
            "debug" => Some(ConsoleLevel::Debug),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleLine {
    pub level: ConsoleLevel,
    pub message: String,
}

/// Forward a user `console.*` line to tracing.
pub fn emit_console_line(line: &ConsoleLine) {
    match line.level {
        ConsoleLevel::Debug => {
            tracing::debug!(target: "tickscript::user_script", "{}", line.message)
        }
        ConsoleLevel::Info => {
            tracing::info!(target: "tickscript::user_script", "{}", line.message)
        }
        ConsoleLevel::Warn => {
            tracing::warn!(target: "tickscript::user_script", "{}", line.message)
        }
        ConsoleLevel::Error => {
            tracing::error!(target: "tickscript::user_script", "{}", line.message)
        }
    }
}

/// Successful evaluation: the produced value plus everything it queued.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub value: Value,
    #[serde(default)]
    pub calls: Vec<QueuedCall>,
    #[serde(default)]
    pub console: Vec<ConsoleLine>,
}
