#![allow(dead_code)]

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::json;
use tickscript::dispatch::ServiceCaller;
use tickscript::engine::ScriptEngine;
use tickscript::scheduler::Scheduler;
use tickscript::snapshot::{HostState, Snapshot, SnapshotProvider};
use tickscript::storage::{ConfigStore, MemoryStore};

pub use tickscript_test_utils::builders;
pub use tickscript_test_utils::{
    init_tracing, with_timeout, FlakyStore, RecordingServiceCaller, SlowEvaluator,
    StaticSnapshotProvider,
};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// A small house: two lights, a fan switch and a temperature sensor.
pub fn house() -> StaticSnapshotProvider {
    let mut brightness = IndexMap::new();
    brightness.insert("brightness".to_string(), json!(180));
    StaticSnapshotProvider::new(vec![
        HostState {
            entity_id: Some("light.kitchen".into()),
            state: Some("on".into()),
            attributes: Some(brightness),
            ..Default::default()
        },
        HostState {
            entity_id: Some("light.hall".into()),
            state: Some("off".into()),
            ..Default::default()
        },
        HostState {
            entity_id: Some("switch.fan".into()),
            state: Some("off".into()),
            ..Default::default()
        },
        HostState {
            entity_id: Some("sensor.temp".into()),
            state: Some("23.5".into()),
            ..Default::default()
        },
    ])
}

pub fn house_snapshot() -> Snapshot {
    house().read_all()
}

/// Scheduler over [`house`] with an in-memory store.
pub fn scheduler(engine: ScriptEngine, caller: Arc<dyn ServiceCaller>) -> Scheduler {
    scheduler_with_store(engine, caller, Arc::new(MemoryStore::new()))
}

pub fn scheduler_with_store(
    engine: ScriptEngine,
    caller: Arc<dyn ServiceCaller>,
    store: Arc<dyn ConfigStore>,
) -> Scheduler {
    Scheduler::new(engine, Arc::new(house()), caller, store)
}
