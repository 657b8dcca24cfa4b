// src/scheduler/registry.rs

//! Entity registry and timer shell around [`TickerState`].
//!
//! Every entity owns one async execution lock. Timer fires, manual
//! `execute_now` calls and interval-change restarts all go through it, so at
//! most one execution per entity is ever in flight. Bookkeeping lives behind
//! a short synchronous lock that is never held across an `.await`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::entity::{EntityAttributes, EntityRuntime};
use super::ticker::{FailureVerdict, TickerInfo, TickerState};
use super::{clamp_interval, FAILURE_THRESHOLD};
use crate::dispatch::{dispatch_calls, DispatchReport, ServiceCaller};
use crate::engine::ScriptEngine;
use crate::errors::{ControllerError, ExecutionError, Result};
use crate::render;
use crate::snapshot::SnapshotProvider;
use crate::storage::{ConfigStore, EntityConfig};
use crate::types::TriggerSource;

/// Partial configuration change. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigUpdate {
    pub html_template: Option<String>,
    pub css_styles: Option<String>,
    pub script_source: Option<String>,
    pub interval: Option<i64>,
}

/// Result of one execution attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// Empty script, or a timer fire whose ticker stopped while it waited.
    Skipped,
    Success {
        value: Value,
        dispatch: DispatchReport,
    },
    Failure(ExecutionError),
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    engine: ScriptEngine,
    snapshots: Arc<dyn SnapshotProvider>,
    caller: Arc<dyn ServiceCaller>,
    store: Arc<dyn ConfigStore>,
    entities: Mutex<HashMap<String, Arc<EntityHandle>>>,
}

struct EntityHandle {
    id: String,
    exec_lock: tokio::sync::Mutex<()>,
    slot: Mutex<EntitySlot>,
}

struct EntitySlot {
    config: EntityConfig,
    runtime: EntityRuntime,
    ticker: Option<TickerSlot>,
    generations: u64,
}

struct TickerSlot {
    state: TickerState,
    generation: u64,
    /// Dropping or firing this ends the timer task.
    cancel: Option<oneshot::Sender<()>>,
}

impl TickerSlot {
    fn halt(&mut self) {
        self.state.stop();
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
    }
}

impl EntitySlot {
    /// The ticker an execution should report to: the current one for manual
    /// runs, only the same generation for timer runs.
    fn ticker_for(&mut self, generation: Option<u64>) -> Option<&mut TickerSlot> {
        self.ticker
            .as_mut()
            .filter(|t| generation.is_none_or(|g| t.generation == g))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Scheduler {
    pub fn new(
        engine: ScriptEngine,
        snapshots: Arc<dyn SnapshotProvider>,
        caller: Arc<dyn ServiceCaller>,
        store: Arc<dyn ConfigStore>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                snapshots,
                caller,
                store,
                entities: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn engine(&self) -> &ScriptEngine {
        &self.inner.engine
    }

    fn handle(&self, entity_id: &str) -> Result<Arc<EntityHandle>> {
        lock(&self.inner.entities)
            .get(entity_id)
            .cloned()
            .ok_or_else(|| ControllerError::EntityNotFound(entity_id.to_string()))
    }

    /// Register an entity and start its ticker when the effective interval
    /// is positive. A stored configuration overrides the defaults and
    /// `initial_interval`.
    pub async fn register(&self, entity_id: &str, initial_interval: i64) -> Result<()> {
        if lock(&self.inner.entities).contains_key(entity_id) {
            return Err(already_registered(entity_id));
        }

        let mut config = EntityConfig {
            interval_seconds: initial_interval,
            ..EntityConfig::default()
        };
        match self.inner.store.load(entity_id).await {
            Ok(Some(stored)) => {
                info!(entity = %entity_id, "loaded stored configuration");
                config = stored;
            }
            Ok(None) => {}
            Err(err) => {
                error!(entity = %entity_id, error = %err, "failed to load configuration, using defaults")
            }
        }

        let interval = config.interval_seconds;
        let handle = Arc::new(EntityHandle {
            id: entity_id.to_string(),
            exec_lock: tokio::sync::Mutex::new(()),
            slot: Mutex::new(EntitySlot {
                config,
                runtime: EntityRuntime::default(),
                ticker: None,
                generations: 0,
            }),
        });
        {
            let mut entities = lock(&self.inner.entities);
            if entities.contains_key(entity_id) {
                return Err(already_registered(entity_id));
            }
            entities.insert(entity_id.to_string(), handle.clone());
        }
        debug!(entity = %entity_id, interval, "registered entity");

        if interval > 0 {
            self.start_on(&handle, Duration::from_secs(clamp_interval(interval).unsigned_abs()));
        }
        Ok(())
    }

    /// Stop the entity's ticker and drop it from the registry. An execution
    /// already holding the lock finishes on its own.
    pub fn unregister(&self, entity_id: &str) -> Result<()> {
        let handle = lock(&self.inner.entities)
            .remove(entity_id)
            .ok_or_else(|| ControllerError::EntityNotFound(entity_id.to_string()))?;
        if let Some(mut ticker) = lock(&handle.slot).ticker.take() {
            ticker.halt();
        }
        debug!(entity = %entity_id, "unregistered entity");
        Ok(())
    }

    /// Unregister and remove the stored configuration.
    pub async fn delete(&self, entity_id: &str) -> Result<()> {
        self.unregister(entity_id)?;
        if let Err(err) = self.inner.store.remove(entity_id).await {
            error!(entity = %entity_id, error = %err, "failed to remove stored configuration");
        }
        Ok(())
    }

    /// Run the entity's script now, through the same locked path as a timer
    /// fire.
    pub async fn execute_now(&self, entity_id: &str) -> Result<ExecutionOutcome> {
        let handle = self.handle(entity_id)?;
        Ok(self
            .inner
            .execute(&handle, TriggerSource::Manual, None)
            .await)
    }

    /// Apply a partial update. Returns whether anything changed.
    ///
    /// A non-positive interval is rejected before anything is applied;
    /// other intervals are clamped. An effective interval change restarts
    /// the ticker, which resets its counters. Changes are saved afterwards;
    /// a failed save is logged and the in-memory update stands.
    pub async fn update_configuration(&self, entity_id: &str, update: ConfigUpdate) -> Result<bool> {
        if let Some(interval) = update.interval {
            if interval <= 0 {
                return Err(ControllerError::ConfigError(format!(
                    "interval must be positive, got {interval}"
                )));
            }
        }
        let handle = self.handle(entity_id)?;

        let _running = handle.exec_lock.lock().await;
        let (updated, restart, config) = {
            let mut slot = lock(&handle.slot);
            let mut updated = false;
            let mut replace = |field: &mut String, value: Option<String>| {
                if let Some(value) = value {
                    if *field != value {
                        *field = value;
                        updated = true;
                    }
                }
            };
            replace(&mut slot.config.html_template, update.html_template);
            replace(&mut slot.config.css_styles, update.css_styles);
            replace(&mut slot.config.script_source, update.script_source);

            let mut restart = None;
            if let Some(interval) = update.interval.map(clamp_interval) {
                let old = slot.config.interval_seconds;
                if interval != old {
                    slot.config.interval_seconds = interval;
                    updated = true;
                    restart = Some(interval);
                    info!(entity = %entity_id, old, new = interval, "updated ticker interval");
                }
            }
            (updated, restart, slot.config.clone())
        };
        if let Some(interval) = restart {
            self.start_on(&handle, Duration::from_secs(interval.unsigned_abs()));
        }
        drop(_running);

        if updated {
            info!(entity = %entity_id, "updated configuration");
            if let Err(err) = self.inner.store.save(entity_id, config).await {
                error!(entity = %entity_id, error = %err, "failed to save configuration");
            }
        }
        Ok(updated)
    }

    /// Start (or replace) the entity's ticker. Counters start from zero.
    pub fn start_ticker(&self, entity_id: &str, interval: i64) -> Result<()> {
        if interval <= 0 {
            return Err(ControllerError::ConfigError(format!(
                "invalid interval {interval} for entity {entity_id}"
            )));
        }
        self.start_ticker_every(entity_id, Duration::from_secs(clamp_interval(interval).unsigned_abs()))
    }

    /// Like [`start_ticker`](Self::start_ticker) with an arbitrary period.
    pub fn start_ticker_every(&self, entity_id: &str, period: Duration) -> Result<()> {
        if period.is_zero() {
            return Err(ControllerError::ConfigError(format!(
                "zero ticker period for entity {entity_id}"
            )));
        }
        let handle = self.handle(entity_id)?;
        self.start_on(&handle, period);
        Ok(())
    }

    /// Stop and discard the entity's ticker. Returns whether one existed.
    pub fn stop_ticker(&self, entity_id: &str) -> Result<bool> {
        let handle = self.handle(entity_id)?;
        let stopped = match lock(&handle.slot).ticker.take() {
            Some(mut ticker) => {
                ticker.halt();
                true
            }
            None => false,
        };
        if stopped {
            info!(entity = %entity_id, "stopped ticker");
        }
        Ok(stopped)
    }

    /// `stop_ticker` followed by `start_ticker`.
    pub fn restart_ticker(&self, entity_id: &str, interval: i64) -> Result<()> {
        self.stop_ticker(entity_id)?;
        self.start_ticker(entity_id, interval)
    }

    pub fn ticker_info(&self, entity_id: &str) -> Option<TickerInfo> {
        let handle = self.handle(entity_id).ok()?;
        let slot = lock(&handle.slot);
        slot.ticker.as_ref().map(|t| t.state.info())
    }

    pub fn all_ticker_info(&self) -> BTreeMap<String, TickerInfo> {
        self.handles()
            .into_iter()
            .filter_map(|h| {
                let slot = lock(&h.slot);
                slot.ticker.as_ref().map(|t| (h.id.clone(), t.state.info()))
            })
            .collect()
    }

    pub fn attributes(&self, entity_id: &str) -> Option<EntityAttributes> {
        let handle = self.handle(entity_id).ok()?;
        let slot = lock(&handle.slot);
        let ticker = slot.ticker.as_ref().map(|t| t.state.info());
        Some(EntityAttributes::collect(entity_id, &slot.config, &slot.runtime, ticker))
    }

    /// Render the entity's HTML template against its latest result and a
    /// fresh snapshot.
    pub fn rendered_html(&self, entity_id: &str) -> Option<String> {
        let attributes = self.attributes(entity_id)?;
        let snapshot = self.inner.snapshots.read_all();
        Some(render::render_entity(&attributes, &snapshot))
    }

    /// Registered entity ids, sorted.
    pub fn entity_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.inner.entities).keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn stop_all(&self) {
        for handle in self.handles() {
            if let Some(mut ticker) = lock(&handle.slot).ticker.take() {
                ticker.halt();
            }
        }
        info!("stopped all tickers");
    }

    fn handles(&self) -> Vec<Arc<EntityHandle>> {
        lock(&self.inner.entities).values().cloned().collect()
    }

    fn start_on(&self, handle: &Arc<EntityHandle>, period: Duration) {
        let (tx, rx) = oneshot::channel();
        let generation = {
            let mut slot = lock(&handle.slot);
            if let Some(mut old) = slot.ticker.take() {
                old.halt();
            }
            slot.generations += 1;
            let generation = slot.generations;
            slot.ticker = Some(TickerSlot {
                state: TickerState::start(handle.id.clone(), period, Utc::now()),
                generation,
                cancel: Some(tx),
            });
            generation
        };
        spawn_timer(Arc::downgrade(&self.inner), handle.clone(), period, generation, rx);
        info!(
            entity = %handle.id,
            interval_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX),
            "started ticker"
        );
    }
}

fn already_registered(entity_id: &str) -> ControllerError {
    ControllerError::ConfigError(format!("entity {entity_id} is already registered"))
}

/// Periodic timer for one ticker generation. Each fire spawns an execution
/// that queues on the entity lock.
fn spawn_timer(
    inner: Weak<Inner>,
    handle: Arc<EntityHandle>,
    period: Duration,
    generation: u64,
    mut cancel: oneshot::Receiver<()>,
) {
    tokio::spawn(async move {
        let mut ticks = interval_at(Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut cancel => break,
                _ = ticks.tick() => {
                    let fired = match lock(&handle.slot).ticker_for(Some(generation)) {
                        Some(ticker) => ticker.state.on_fire(Utc::now()),
                        None => false,
                    };
                    if !fired {
                        break;
                    }
                    let Some(inner) = inner.upgrade() else {
                        break;
                    };
                    let handle = handle.clone();
                    tokio::spawn(async move {
                        inner.execute(&handle, TriggerSource::Timer, Some(generation)).await;
                    });
                }
            }
        }
        debug!(entity = %handle.id, generation, "ticker task finished");
    });
}

impl Inner {
    async fn execute(
        &self,
        handle: &EntityHandle,
        source: TriggerSource,
        generation: Option<u64>,
    ) -> ExecutionOutcome {
        let _running = handle.exec_lock.lock().await;

        let code = {
            let mut slot = lock(&handle.slot);
            if generation.is_some() {
                // The ticker was stopped or replaced while this fire waited.
                let live = slot.ticker_for(generation).is_some_and(|t| t.state.is_running);
                if !live {
                    debug!(entity = %handle.id, "dropping stale timer fire");
                    return ExecutionOutcome::Skipped;
                }
            }
            if slot.config.script_source.trim().is_empty() {
                debug!(entity = %handle.id, "empty script, nothing to execute");
                return ExecutionOutcome::Skipped;
            }
            let now = Utc::now();
            slot.runtime.begin(now);
            if let Some(ticker) = slot.ticker_for(generation) {
                ticker.state.on_begin(now);
            }
            slot.config.script_source.clone()
        };

        debug!(entity = %handle.id, ?source, backend = %self.engine.backend(), "executing script");
        let snapshot = self.snapshots.read_all();

        match self.engine.run(&code, snapshot).await {
            Ok(evaluation) => {
                {
                    let mut slot = lock(&handle.slot);
                    slot.runtime.succeed(&evaluation.value);
                    if let Some(ticker) = slot.ticker_for(generation) {
                        ticker.state.on_success();
                    }
                }
                let queued = evaluation.calls.len();
                let dispatch = dispatch_calls(self.caller.as_ref(), &handle.id, evaluation.calls).await;
                info!(
                    entity = %handle.id,
                    ?source,
                    calls = queued,
                    failed_calls = dispatch.failed,
                    "script executed"
                );
                ExecutionOutcome::Success {
                    value: evaluation.value,
                    dispatch,
                }
            }
            Err(err) => {
                let verdict = {
                    let mut slot = lock(&handle.slot);
                    slot.runtime.fail(&err);
                    slot.ticker_for(generation).map(|ticker| {
                        let verdict = ticker.state.on_failure(err.to_string());
                        if verdict == FailureVerdict::Disabled {
                            ticker.halt();
                        }
                        (verdict, ticker.state.consecutive_error_count)
                    })
                };
                match verdict {
                    Some((FailureVerdict::Disabled, failures)) => {
                        error!(entity = %handle.id, kind = %err.kind, error = %err.message, consecutive_failures = failures, "script execution failed");
                        error!(
                            entity = %handle.id,
                            threshold = FAILURE_THRESHOLD,
                            "stopping ticker due to repeated failures"
                        );
                    }
                    Some((FailureVerdict::KeepRunning, failures)) => {
                        error!(entity = %handle.id, kind = %err.kind, error = %err.message, consecutive_failures = failures, "script execution failed");
                    }
                    None => {
                        warn!(entity = %handle.id, kind = %err.kind, error = %err.message, "script execution failed");
                    }
                }
                ExecutionOutcome::Failure(err)
            }
        }
    }
}
