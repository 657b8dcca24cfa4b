use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Map, Value};
use tickscript::dispatch::{BoxFuture, ServiceCaller};
use tickscript::engine::backend::{BackendKind, EvalFuture, Evaluator};
use tickscript::engine::native::NativeEvaluator;
use tickscript::errors::ControllerError;
use tickscript::snapshot::Snapshot;
use tickscript::storage::{ConfigStore, EntityConfig, MemoryStore, StoreFuture};
use tickscript::transpile::{Dialect, NormalizedCode};

/// Counts how many holders are inside a section at once and remembers the
/// peak.
#[derive(Debug, Default)]
pub struct ConcurrencyGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyGauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// One call seen by [`RecordingServiceCaller`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub domain: String,
    pub service: String,
    pub data: Map<String, Value>,
}

/// Service caller that records every call.
///
/// Clones share state. Calls to services named in `fail_on` return an
/// error after being recorded; `with_delay` makes each call take that long.
#[derive(Debug, Clone, Default)]
pub struct RecordingServiceCaller {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    delay: Option<Duration>,
    gauge: Arc<ConcurrencyGauge>,
}

impl RecordingServiceCaller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fail_on(&self, service: &str) {
        self.failing.lock().unwrap().insert(service.to_string());
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn services(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.service).collect()
    }

    pub fn max_concurrency(&self) -> usize {
        self.gauge.peak()
    }
}

impl ServiceCaller for RecordingServiceCaller {
    fn call(&self, domain: &str, service: &str, data: Map<String, Value>) -> BoxFuture<'_, anyhow::Result<()>> {
        let call = RecordedCall {
            domain: domain.to_string(),
            service: service.to_string(),
            data,
        };
        Box::pin(async move {
            self.gauge.enter();
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let fail = self.failing.lock().unwrap().contains(&call.service);
            let service = call.service.clone();
            self.calls.lock().unwrap().push(call);
            self.gauge.leave();
            if fail {
                anyhow::bail!("service {service} refused");
            }
            Ok(())
        })
    }
}

/// Evaluator that delegates to the native backend after a fixed delay and
/// tracks how many evaluations overlap.
#[derive(Debug, Clone)]
pub struct SlowEvaluator {
    delay: Duration,
    inner: NativeEvaluator,
    gauge: Arc<ConcurrencyGauge>,
    started: Arc<AtomicUsize>,
}

impl SlowEvaluator {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            inner: NativeEvaluator::new(),
            gauge: Arc::new(ConcurrencyGauge::default()),
            started: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.gauge.peak()
    }

    pub fn evaluations(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

impl Evaluator for SlowEvaluator {
    fn kind(&self) -> BackendKind {
        BackendKind::RestrictedNative
    }

    fn dialect(&self) -> Dialect {
        Dialect::Native
    }

    fn evaluate(&self, code: NormalizedCode, snapshot: Arc<Snapshot>, timeout: Duration) -> EvalFuture<'_> {
        Box::pin(async move {
            self.started.fetch_add(1, Ordering::SeqCst);
            self.gauge.enter();
            tokio::time::sleep(self.delay).await;
            let result = self.inner.evaluate(code, snapshot, timeout).await;
            self.gauge.leave();
            result
        })
    }
}

/// In-memory store whose loads and saves can be made to fail.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_loads: AtomicBool,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of save attempts, failed ones included.
    pub fn save_attempts(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl ConfigStore for FlakyStore {
    fn load(&self, entity_id: &str) -> StoreFuture<'_, Option<EntityConfig>> {
        if self.fail_loads.load(Ordering::SeqCst) {
            let id = entity_id.to_string();
            return Box::pin(async move {
                Err(ControllerError::PersistenceError(format!("load refused for {id}")))
            });
        }
        self.inner.load(entity_id)
    }

    fn save(&self, entity_id: &str, config: EntityConfig) -> StoreFuture<'_, ()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves.load(Ordering::SeqCst) {
            let id = entity_id.to_string();
            return Box::pin(async move {
                Err(ControllerError::PersistenceError(format!("save refused for {id}")))
            });
        }
        self.inner.save(entity_id, config)
    }

    fn remove(&self, entity_id: &str) -> StoreFuture<'_, ()> {
        self.inner.remove(entity_id)
    }
}
