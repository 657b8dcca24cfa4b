// tests/app_wiring.rs
mod common;
use crate::common::builders::{ConfigFileBuilder, EntityBuilder};
use crate::common::{
    init_tracing, scheduler_with_store, with_timeout, FlakyStore, RecordingServiceCaller, TestResult,
};

use std::sync::Arc;

use serde_json::{json, Value};
use tickscript::config::load_and_validate;
use tickscript::engine::ScriptEngine;
use tickscript::fs::RealFileSystem;
use tickscript::scheduler::ConfigUpdate;
use tickscript::storage::{ConfigStore, EntityConfig, JsonFileStore};
use tickscript::{bootstrap, build_scheduler, run_once};

const STATES: &str = r#"{
  "states": {
    "light.kitchen": { "state": "on", "attributes": { "friendly_name": "Kitchen" } },
    "sensor.temp": { "state": "19.5" }
  },
  "catalog": [ { "full_name": "org/mushroom", "installed": true, "category": "plugin" } ]
}"#;

#[tokio::test]
async fn once_mode_executes_renders_and_logs_calls() -> TestResult {
    with_timeout(async {
        init_tracing();

        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("states.json"), STATES)?;
        std::fs::create_dir_all(dir.path().join("scripts"))?;
        std::fs::write(
            dir.path().join("scripts/heat.js"),
            "const t = parseFloat(states['sensor.temp'].state);\nif (t < 20) { services.turnOn('switch.heater'); }\nreturn { temp: t, plugins: HACS.repositories.length };",
        )?;
        std::fs::write(
            dir.path().join("Tickscript.toml"),
            r#"
[engine]
backend = "native"
timeout_ms = 2000

[storage]
path = "data/entities.json"

[host]
states = "states.json"
service_log = "calls.jsonl"

[entity.kitchen]
interval = 60
script = "return states['light.kitchen'].state"
html_template = "<p>{{ upper(result) }}</p>"

[entity.heating]
interval = 120
script_file = "scripts/heat.js"
html_template = "{% if temp < 20 %}cold {{ temp }}{% endif %}"
"#,
        )?;

        let fs = RealFileSystem;
        let cfg = load_and_validate(&fs, dir.path().join("Tickscript.toml"))?;
        let engine = ScriptEngine::new(cfg.engine.options()).await;
        let scheduler = build_scheduler(&cfg, engine);
        bootstrap(&scheduler, &cfg, &fs).await?;
        scheduler.stop_all();

        let report = run_once(&scheduler).await;
        assert_eq!(report.keys().collect::<Vec<_>>(), vec!["heating", "kitchen"]);

        let kitchen = &report["kitchen"];
        assert_eq!(kitchen.attributes.state, "on");
        assert_eq!(kitchen.attributes.interval, 60);
        assert_eq!(kitchen.html, "<p>ON</p>");

        let heating = &report["heating"];
        assert_eq!(heating.attributes.execution_result, Some(json!({ "temp": 19.5, "plugins": 1 })));
        assert_eq!(heating.html, "cold 19.5");

        let log = std::fs::read_to_string(dir.path().join("calls.jsonl"))?;
        let lines: Vec<Value> = log.lines().map(serde_json::from_str::<Value>).collect::<Result<_, _>>()?;
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["service"], json!("turn_on"));
        assert_eq!(lines[0]["data"]["entity_id"], json!("switch.heater"));

        // The file configuration was persisted.
        let stored = std::fs::read_to_string(dir.path().join("data/entities.json"))?;
        let doc: Value = serde_json::from_str(&stored)?;
        assert_eq!(doc["version"], json!(1));
        assert_eq!(doc["key"], json!("universal_controller_entities"));
        assert_eq!(doc["data"]["kitchen"]["interval"], json!(60));
        assert_eq!(
            doc["data"]["kitchen"]["typescript_code"],
            json!("return states['light.kitchen'].state")
        );
        Ok(())
    })
    .await
}

#[tokio::test]
async fn stored_configuration_is_loaded_on_register() -> TestResult {
    with_timeout(async {
        init_tracing();

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("entities.json");
        {
            let store = JsonFileStore::new(&path);
            store
                .save(
                    "sensor.porch",
                    EntityConfig {
                        script_source: "return 'stored'".into(),
                        interval_seconds: 90,
                        ..EntityConfig::default()
                    },
                )
                .await?;
        }

        let scheduler = scheduler_with_store(
            ScriptEngine::native(1_000),
            Arc::new(RecordingServiceCaller::new()),
            Arc::new(JsonFileStore::new(&path)),
        );
        scheduler.register("sensor.porch", 30).await?;
        let attrs = scheduler.attributes("sensor.porch").unwrap();
        assert_eq!(attrs.interval, 90);
        assert_eq!(attrs.typescript_code, "return 'stored'");
        assert_eq!(scheduler.ticker_info("sensor.porch").unwrap().interval, 90);

        scheduler.delete("sensor.porch").await?;
        let reopened = JsonFileStore::new(&path);
        assert_eq!(reopened.load("sensor.porch").await?, None);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn persistence_failures_do_not_block_updates() -> TestResult {
    with_timeout(async {
        init_tracing();

        let store = Arc::new(FlakyStore::new());
        store.set_fail_loads(true);
        store.set_fail_saves(true);
        let scheduler = scheduler_with_store(
            ScriptEngine::native(1_000),
            Arc::new(RecordingServiceCaller::new()),
            store.clone(),
        );

        // A failed load falls back to defaults.
        scheduler.register("sensor.x", 45).await?;
        let attrs = scheduler.attributes("sensor.x").unwrap();
        assert_eq!(attrs.interval, 45);
        assert_eq!(attrs.html_template, "<div>Hello from Universal Controller!</div>");

        let changed = scheduler
            .update_configuration(
                "sensor.x",
                ConfigUpdate {
                    css_styles: Some("p { color: red }".into()),
                    ..ConfigUpdate::default()
                },
            )
            .await?;
        assert!(changed);
        assert_eq!(store.save_attempts(), 1);
        assert_eq!(scheduler.attributes("sensor.x").unwrap().css_styles, "p { color: red }");

        // Nothing changed, nothing saved.
        let changed = scheduler
            .update_configuration(
                "sensor.x",
                ConfigUpdate {
                    css_styles: Some("p { color: red }".into()),
                    ..ConfigUpdate::default()
                },
            )
            .await?;
        assert!(!changed);
        assert_eq!(store.save_attempts(), 1);
        scheduler.stop_all();
        Ok(())
    })
    .await
}

#[tokio::test]
async fn builder_configs_bootstrap_without_files() -> TestResult {
    with_timeout(async {
        init_tracing();

        let cfg = ConfigFileBuilder::new()
            .with_entity("greeter", EntityBuilder::script("`hi ${1 + 1}`").interval(10).build())
            .build();
        let scheduler = build_scheduler(&cfg, ScriptEngine::native(1_000));
        bootstrap(&scheduler, &cfg, &RealFileSystem).await?;
        assert_eq!(scheduler.ticker_info("greeter").unwrap().interval, 10);

        scheduler.execute_now("greeter").await?;
        assert_eq!(scheduler.attributes("greeter").unwrap().state, "hi 2");
        scheduler.stop_all();
        Ok(())
    })
    .await
}
