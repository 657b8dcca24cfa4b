// src/scheduler/entity.rs

//! Observable per-entity state (the sensor side of an entity).

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::ticker::TickerInfo;
use crate::errors::ExecutionError;
use crate::storage::EntityConfig;

pub const STATE_IDLE: &str = "idle";
pub const STATE_EXECUTING: &str = "executing";
pub const STATE_ERROR: &str = "error";

#[derive(Debug, Clone, PartialEq)]
pub struct EntityRuntime {
    pub state: String,
    pub last_execution: Option<DateTime<Utc>>,
    /// Attempts, successful or not.
    pub execution_count: u64,
    pub last_error: Option<String>,
    pub execution_result: Option<Value>,
}

impl Default for EntityRuntime {
    fn default() -> Self {
        Self {
            state: STATE_IDLE.to_string(),
            last_execution: None,
            execution_count: 0,
            last_error: None,
            execution_result: None,
        }
    }
}

impl EntityRuntime {
    pub fn begin(&mut self, now: DateTime<Utc>) {
        self.state = STATE_EXECUTING.to_string();
        self.last_execution = Some(now);
        self.execution_count += 1;
        self.last_error = None;
    }

    pub fn succeed(&mut self, value: &Value) {
        self.state = state_string(value);
        self.execution_result = Some(value.clone());
    }

    pub fn fail(&mut self, err: &ExecutionError) {
        self.state = STATE_ERROR.to_string();
        self.last_error = Some(err.to_string());
        self.execution_result = None;
    }
}

/// Strings verbatim, everything else as compact JSON.
pub fn state_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Attributes the presentation layer reads for one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityAttributes {
    pub entity_id: String,
    pub state: String,
    pub html_template: String,
    pub css_styles: String,
    pub typescript_code: String,
    pub interval: i64,
    pub last_execution: Option<DateTime<Utc>>,
    pub execution_count: u64,
    pub last_error: Option<String>,
    pub execution_result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticker_running: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticker_execution_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticker_error_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticker_next_execution: Option<DateTime<Utc>>,
}

impl EntityAttributes {
    pub fn collect(
        entity_id: &str,
        config: &EntityConfig,
        runtime: &EntityRuntime,
        ticker: Option<TickerInfo>,
    ) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            state: runtime.state.clone(),
            html_template: config.html_template.clone(),
            css_styles: config.css_styles.clone(),
            typescript_code: config.script_source.clone(),
            interval: config.interval_seconds,
            last_execution: runtime.last_execution,
            execution_count: runtime.execution_count,
            last_error: runtime.last_error.clone(),
            execution_result: runtime.execution_result.clone(),
            ticker_running: ticker.as_ref().map(|t| t.is_running),
            ticker_execution_count: ticker.as_ref().map(|t| t.execution_count),
            ticker_error_count: ticker.as_ref().map(|t| t.error_count),
            ticker_next_execution: ticker.and_then(|t| t.next_execution),
        }
    }
}
