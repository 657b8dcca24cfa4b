// tests/scheduler_behaviour.rs
mod common;
use crate::common::{init_tracing, scheduler, with_timeout, RecordingServiceCaller, SlowEvaluator, TestResult};

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tickscript::engine::ScriptEngine;
use tickscript::errors::{ControllerError, ErrorKind};
use tickscript::scheduler::{ConfigUpdate, ExecutionOutcome, Scheduler, FAILURE_THRESHOLD};

fn script(source: &str) -> ConfigUpdate {
    ConfigUpdate {
        script_source: Some(source.to_string()),
        ..ConfigUpdate::default()
    }
}

/// Register `id` without a ticker and give it `source`.
async fn entity(scheduler: &Scheduler, id: &str, source: &str) {
    scheduler.register(id, 0).await.unwrap();
    scheduler.update_configuration(id, script(source)).await.unwrap();
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    while !cond() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn ticker_disables_itself_after_five_consecutive_failures() -> TestResult {
    with_timeout(async {
        init_tracing();

        let caller = RecordingServiceCaller::new();
        let scheduler = scheduler(ScriptEngine::native(1_000), Arc::new(caller.clone()));
        entity(&scheduler, "sensor.flaky", "services.toggle('switch.fan'); throw new Error('offline')").await;

        scheduler.start_ticker_every("sensor.flaky", Duration::from_millis(20))?;
        wait_until(|| scheduler.ticker_info("sensor.flaky").is_some_and(|t| !t.is_running)).await;

        let info = scheduler.ticker_info("sensor.flaky").unwrap();
        assert_eq!(info.error_count, u64::from(FAILURE_THRESHOLD));
        assert_eq!(info.consecutive_error_count, FAILURE_THRESHOLD);
        assert_eq!(info.execution_count, 0);
        assert_eq!(info.last_error.as_deref(), Some("RuntimeError: Error: offline"));

        // No further fires once disabled.
        tokio::time::sleep(Duration::from_millis(120)).await;
        let later = scheduler.ticker_info("sensor.flaky").unwrap();
        assert_eq!(later.error_count, info.error_count);
        assert!(caller.calls().is_empty());

        let attrs = scheduler.attributes("sensor.flaky").unwrap();
        assert_eq!(attrs.state, "error");
        assert_eq!(attrs.ticker_running, Some(false));

        // Starting again gives a fresh, running ticker.
        scheduler.start_ticker("sensor.flaky", 60)?;
        let info = scheduler.ticker_info("sensor.flaky").unwrap();
        assert!(info.is_running);
        assert_eq!(info.error_count, 0);
        scheduler.stop_all();
        Ok(())
    })
    .await
}

#[tokio::test]
async fn a_success_resets_the_consecutive_failure_count() -> TestResult {
    with_timeout(async {
        init_tracing();

        let scheduler = scheduler(ScriptEngine::native(1_000), Arc::new(RecordingServiceCaller::new()));
        entity(&scheduler, "sensor.x", "throw new Error('no')").await;
        scheduler.start_ticker("sensor.x", 3600)?;

        for _ in 0..4 {
            scheduler.execute_now("sensor.x").await?;
        }
        assert_eq!(scheduler.ticker_info("sensor.x").unwrap().consecutive_error_count, 4);

        scheduler.update_configuration("sensor.x", script("return 1")).await?;
        scheduler.execute_now("sensor.x").await?;
        let info = scheduler.ticker_info("sensor.x").unwrap();
        assert_eq!(info.consecutive_error_count, 0);
        assert_eq!(info.error_count, 4);
        assert_eq!(info.execution_count, 1);
        assert!(info.is_running);
        assert_eq!(info.last_error, None);
        scheduler.stop_all();
        Ok(())
    })
    .await
}

#[tokio::test]
async fn restart_resets_counters() -> TestResult {
    with_timeout(async {
        init_tracing();

        let scheduler = scheduler(ScriptEngine::native(1_000), Arc::new(RecordingServiceCaller::new()));
        entity(&scheduler, "sensor.count", "return 'ok'").await;

        scheduler.start_ticker_every("sensor.count", Duration::from_millis(20))?;
        wait_until(|| scheduler.ticker_info("sensor.count").is_some_and(|t| t.execution_count >= 2)).await;

        scheduler.restart_ticker("sensor.count", 120)?;
        let info = scheduler.ticker_info("sensor.count").unwrap();
        assert!(info.is_running);
        assert_eq!(info.interval, 120);
        assert_eq!(info.execution_count, 0);
        assert_eq!(info.error_count, 0);
        assert_eq!(info.consecutive_error_count, 0);
        assert!(info.next_execution.is_some());

        // Entity-level history survives the restart.
        assert!(scheduler.attributes("sensor.count").unwrap().execution_count >= 2);
        scheduler.stop_all();
        Ok(())
    })
    .await
}

#[tokio::test]
async fn at_most_one_execution_per_entity() -> TestResult {
    with_timeout(async {
        init_tracing();

        let evaluator = Arc::new(SlowEvaluator::new(Duration::from_millis(60)));
        let engine = ScriptEngine::with_evaluator(evaluator.clone(), 2_000);
        let scheduler = scheduler(engine, Arc::new(RecordingServiceCaller::new()));
        entity(&scheduler, "sensor.slow", "return 1").await;

        scheduler.start_ticker_every("sensor.slow", Duration::from_millis(15))?;
        let manual = (0..3).map(|_| {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.execute_now("sensor.slow").await })
        });
        for task in manual.collect::<Vec<_>>() {
            let outcome = task.await??;
            assert!(matches!(outcome, ExecutionOutcome::Success { .. }));
        }
        scheduler.stop_all();

        assert!(evaluator.evaluations() >= 3);
        assert_eq!(evaluator.max_concurrency(), 1);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn timed_out_executions_dispatch_nothing() -> TestResult {
    with_timeout(async {
        init_tracing();

        let caller = RecordingServiceCaller::new();
        let scheduler = scheduler(ScriptEngine::native(80), Arc::new(caller.clone()));
        entity(&scheduler, "sensor.loop", "services.turnOn('switch.fan')\nwhile (true) {}").await;

        let outcome = scheduler.execute_now("sensor.loop").await?;
        match outcome {
            ExecutionOutcome::Failure(err) => assert_eq!(err.kind, ErrorKind::Timeout),
            other => panic!("expected a timeout, got {other:?}"),
        }
        assert!(caller.calls().is_empty());
        assert_eq!(scheduler.attributes("sensor.loop").unwrap().state, "error");
        Ok(())
    })
    .await
}

#[tokio::test]
async fn calls_dispatch_in_order_and_failures_stay_isolated() -> TestResult {
    with_timeout(async {
        init_tracing();

        let caller = RecordingServiceCaller::new();
        caller.fail_on("turn_off");
        let scheduler = scheduler(ScriptEngine::native(1_000), Arc::new(caller.clone()));
        entity(
            &scheduler,
            "sensor.scene",
            "services.turnOn('light.hall')\nservices.turnOff('light.kitchen')\nservices.toggle('switch.fan')\nreturn 'scene set'",
        )
        .await;

        let outcome = scheduler.execute_now("sensor.scene").await?;
        let ExecutionOutcome::Success { value, dispatch } = outcome else {
            panic!("expected success");
        };
        assert_eq!(value, json!("scene set"));
        assert_eq!((dispatch.succeeded, dispatch.failed), (2, 1));
        assert_eq!(caller.services(), vec!["turn_on", "turn_off", "toggle"]);

        let attrs = scheduler.attributes("sensor.scene").unwrap();
        assert_eq!(attrs.state, "scene set");
        assert_eq!(attrs.last_error, None);
        assert_eq!(attrs.execution_count, 1);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn interval_updates_are_validated_and_clamped() -> TestResult {
    with_timeout(async {
        init_tracing();

        let scheduler = scheduler(ScriptEngine::native(1_000), Arc::new(RecordingServiceCaller::new()));
        scheduler.register("sensor.clamp", 30).await?;

        let changed = scheduler
            .update_configuration("sensor.clamp", ConfigUpdate { interval: Some(5000), ..ConfigUpdate::default() })
            .await?;
        assert!(changed);
        assert_eq!(scheduler.attributes("sensor.clamp").unwrap().interval, 3600);
        assert_eq!(scheduler.ticker_info("sensor.clamp").unwrap().interval, 3600);

        let err = scheduler
            .update_configuration("sensor.clamp", ConfigUpdate { interval: Some(0), ..ConfigUpdate::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::ConfigError(_)));
        assert_eq!(scheduler.attributes("sensor.clamp").unwrap().interval, 3600);

        let unchanged = scheduler
            .update_configuration("sensor.clamp", ConfigUpdate { interval: Some(9999), ..ConfigUpdate::default() })
            .await?;
        assert!(!unchanged);
        scheduler.stop_all();
        Ok(())
    })
    .await
}

#[tokio::test]
async fn registry_lifecycle() -> TestResult {
    with_timeout(async {
        init_tracing();

        let scheduler = scheduler(ScriptEngine::native(1_000), Arc::new(RecordingServiceCaller::new()));
        scheduler.register("sensor.a", 30).await?;
        scheduler.register("sensor.b", 0).await?;
        assert!(scheduler.register("sensor.a", 30).await.is_err());

        assert_eq!(scheduler.entity_ids(), vec!["sensor.a", "sensor.b"]);
        let tickers = scheduler.all_ticker_info();
        assert_eq!(tickers.keys().collect::<Vec<_>>(), vec!["sensor.a"]);
        assert_eq!(tickers["sensor.a"].interval, 30);

        assert!(scheduler.stop_ticker("sensor.a")?);
        assert!(!scheduler.stop_ticker("sensor.a")?);
        assert!(scheduler.ticker_info("sensor.a").is_none());

        scheduler.unregister("sensor.b")?;
        assert!(matches!(
            scheduler.execute_now("sensor.b").await,
            Err(ControllerError::EntityNotFound(_))
        ));
        assert!(scheduler.start_ticker("sensor.a", -1).is_err());
        Ok(())
    })
    .await
}

#[tokio::test]
async fn empty_scripts_are_skipped() -> TestResult {
    with_timeout(async {
        init_tracing();

        let scheduler = scheduler(ScriptEngine::native(1_000), Arc::new(RecordingServiceCaller::new()));
        entity(&scheduler, "sensor.blank", "  ").await;
        assert_eq!(scheduler.execute_now("sensor.blank").await?, ExecutionOutcome::Skipped);
        let attrs = scheduler.attributes("sensor.blank").unwrap();
        assert_eq!(attrs.state, "idle");
        assert_eq!(attrs.execution_count, 0);
        Ok(())
    })
    .await
}
