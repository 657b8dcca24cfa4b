// src/lib.rs

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod render;
pub mod scheduler;
pub mod script;
pub mod snapshot;
pub mod storage;
pub mod transpile;
pub mod types;
pub mod watch;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{entity_update, load_and_validate, read_script, ConfigFile};
use crate::dispatch::{JsonLinesServiceCaller, LoggingServiceCaller, ServiceCaller};
use crate::engine::ScriptEngine;
use crate::fs::{FileSystem, RealFileSystem};
use crate::scheduler::{EntityAttributes, ExecutionOutcome, Scheduler};
use crate::snapshot::{JsonFileSnapshotProvider, SnapshotProvider, StaticSnapshotProvider};
use crate::storage::{ConfigStore, JsonFileStore, MemoryStore};
use crate::watch::ScriptSource;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - script engine (backend probe)
/// - snapshot provider, service caller, config store
/// - scheduler with one ticker per entity
/// - (optional) script file watcher
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(fs.as_ref(), &config_path)?;

    let engine = ScriptEngine::new(cfg.engine.options()).await;

    if args.dry_run {
        print_dry_run(&cfg, &engine, fs.as_ref())?;
        return Ok(());
    }

    let scheduler = build_scheduler(&cfg, engine);
    bootstrap(&scheduler, &cfg, fs.as_ref()).await?;

    if args.once {
        // Only the explicit executions below should run.
        scheduler.stop_all();
        let report = run_once(&scheduler).await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let _watcher_handle = if args.watch {
        let sources = script_sources(&cfg);
        if sources.is_empty() {
            warn!("--watch given but no entity uses `script_file`");
            None
        } else {
            Some(watch::spawn_watcher(sources, scheduler.clone())?)
        }
    } else {
        None
    };

    info!(entities = cfg.entity.len(), "tickscript running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    scheduler.stop_all();
    Ok(())
}

/// Scheduler wired to the collaborators named in `cfg`.
pub fn build_scheduler(cfg: &ConfigFile, engine: ScriptEngine) -> Scheduler {
    let snapshots: Arc<dyn SnapshotProvider> = match &cfg.host.states {
        Some(path) => Arc::new(JsonFileSnapshotProvider::new(cfg.resolve(path))),
        None => Arc::new(StaticSnapshotProvider::new(Vec::new())),
    };
    let caller: Arc<dyn ServiceCaller> = match &cfg.host.service_log {
        Some(path) => Arc::new(JsonLinesServiceCaller::new(cfg.resolve(path))),
        None => Arc::new(LoggingServiceCaller),
    };
    let store: Arc<dyn ConfigStore> = match &cfg.storage.path {
        Some(path) => Arc::new(JsonFileStore::new(cfg.resolve(path))),
        None => Arc::new(MemoryStore::new()),
    };
    Scheduler::new(engine, snapshots, caller, store)
}

/// Register every configured entity, then apply its file configuration on
/// top of whatever was stored. The config file wins; effective changes are
/// persisted.
pub async fn bootstrap(scheduler: &Scheduler, cfg: &ConfigFile, fs: &dyn FileSystem) -> Result<()> {
    for (id, entity) in cfg.entity.iter() {
        scheduler.register(id, entity.interval).await?;
        let update = entity_update(fs, cfg, entity)?;
        let changed = scheduler.update_configuration(id, update).await?;
        debug!(entity = %id, changed, "applied file configuration");
    }
    Ok(())
}

/// One entry of the `--once` report.
#[derive(Debug, Serialize)]
pub struct EntityReport {
    #[serde(flatten)]
    pub attributes: EntityAttributes,
    pub html: String,
}

/// Execute every registered entity once, in id order.
pub async fn run_once(scheduler: &Scheduler) -> BTreeMap<String, EntityReport> {
    let mut report = BTreeMap::new();
    for id in scheduler.entity_ids() {
        match scheduler.execute_now(&id).await {
            Ok(ExecutionOutcome::Failure(err)) => warn!(entity = %id, error = %err, "execution failed"),
            Ok(_) => {}
            Err(err) => warn!(entity = %id, error = %err, "could not execute"),
        }
        if let (Some(attributes), Some(html)) = (scheduler.attributes(&id), scheduler.rendered_html(&id)) {
            report.insert(id, EntityReport { attributes, html });
        }
    }
    report
}

fn script_sources(cfg: &ConfigFile) -> Vec<ScriptSource> {
    cfg.entity
        .iter()
        .filter_map(|(id, entity)| {
            entity.script_file.as_ref().map(|file| ScriptSource {
                entity_id: id.clone(),
                path: cfg.resolve(file),
            })
        })
        .collect()
}

/// Print the selected backend and each entity's normalized script.
fn print_dry_run(cfg: &ConfigFile, engine: &ScriptEngine, fs: &dyn FileSystem) -> Result<()> {
    println!("tickscript dry-run");
    println!("  engine.backend = {}", engine.backend());
    println!("  engine.timeout_ms = {}", engine.timeout_ms());
    if let Some(path) = &cfg.storage.path {
        println!("  storage.path = {}", cfg.resolve(path).display());
    }
    if let Some(path) = &cfg.host.states {
        println!("  host.states = {}", cfg.resolve(path).display());
    }
    println!();

    println!("entities ({}):", cfg.entity.len());
    for (id, entity) in cfg.entity.iter() {
        println!("  - {id}");
        println!("      interval: {}s", entity.interval);
        if let Some(file) = &entity.script_file {
            println!("      script_file: {}", cfg.resolve(file).display());
        }
        let source = read_script(fs, cfg, entity)?;
        let normalized = engine.normalized(&source);
        println!("      implicit_return: {}", normalized.implicit_return);
        println!("      code:");
        for line in normalized.as_str().lines() {
            println!("        {line}");
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
