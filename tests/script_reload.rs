// tests/script_reload.rs
mod common;
use crate::common::{init_tracing, scheduler, with_timeout, RecordingServiceCaller, TestResult};

use std::sync::Arc;
use std::time::Duration;

use tickscript::engine::ScriptEngine;
use tickscript::scheduler::ConfigUpdate;
use tickscript::watch::{spawn_watcher, ScriptSource};

#[tokio::test]
async fn edited_script_files_reach_the_entity() -> TestResult {
    with_timeout(async {
        init_tracing();

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("porch.js");
        std::fs::write(&path, "return 'v1'")?;

        let scheduler = scheduler(ScriptEngine::native(1_000), Arc::new(RecordingServiceCaller::new()));
        scheduler.register("sensor.porch", 0).await?;
        scheduler
            .update_configuration(
                "sensor.porch",
                ConfigUpdate {
                    script_source: Some("return 'v1'".into()),
                    ..ConfigUpdate::default()
                },
            )
            .await?;

        let _handle = spawn_watcher(
            vec![ScriptSource {
                entity_id: "sensor.porch".into(),
                path: path.clone(),
            }],
            scheduler.clone(),
        )?;

        std::fs::write(&path, "return 'v2'")?;
        while scheduler.attributes("sensor.porch").unwrap().typescript_code != "return 'v2'" {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        scheduler.execute_now("sensor.porch").await?;
        assert_eq!(scheduler.attributes("sensor.porch").unwrap().state, "v2");
        Ok(())
    })
    .await
}
