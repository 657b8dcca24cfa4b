// src/engine/mod.rs

//! Scripting engine facade.
//!
//! [`ScriptEngine::execute`] is the one operation the scheduler needs: run a
//! user script against a snapshot and return the produced value plus the
//! service calls it queued. Which backend does the work is decided once, at
//! construction, and is invisible to callers: every backend yields the same
//! [`Evaluation`] shape and the same [`ExecutionError`] classification.

pub mod backend;
#[cfg(feature = "embedded-vm")]
pub mod embedded;
pub mod external;
pub mod native;
pub mod outcome;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

pub use backend::{BackendKind, Evaluator};
pub use outcome::{ConsoleLevel, ConsoleLine, Evaluation, QueuedCall};

use crate::errors::ExecutionError;
use crate::snapshot::Snapshot;
use crate::transpile::{normalize, NormalizedCode};
use crate::types::BackendPreference;

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub backend: BackendPreference,
    pub timeout_ms: u64,
    /// Interpreter used by the external backend.
    pub node_path: PathBuf,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            backend: BackendPreference::Auto,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            node_path: PathBuf::from("node"),
        }
    }
}

#[derive(Clone)]
pub struct ScriptEngine {
    evaluator: Arc<dyn Evaluator>,
    timeout_ms: u64,
}

impl std::fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("backend", &self.evaluator.kind())
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl ScriptEngine {
    /// Build an engine, probing backend availability (once per process)
    /// unless the native backend is forced.
    pub async fn new(options: EngineOptions) -> Self {
        let available = match options.backend {
            BackendPreference::Native => backend::Availability::default(),
            _ => backend::probe_once(&options.node_path).await,
        };
        let selection = backend::select(options.backend, available);

        if let Some(wanted) = selection.fell_back_from {
            if options.backend == BackendPreference::Auto {
                info!(wanted = %wanted, selected = %selection.kind, "script backend unavailable, falling back");
            } else {
                warn!(wanted = %wanted, selected = %selection.kind, "configured script backend unavailable, falling back");
            }
        }
        info!(backend = %selection.kind, timeout_ms = options.timeout_ms, "script engine ready");

        let evaluator: Arc<dyn Evaluator> = match selection.kind {
            BackendKind::ExternalProcess => {
                Arc::new(external::ExternalProcessEvaluator::new(options.node_path))
            }
            #[cfg(feature = "embedded-vm")]
            BackendKind::EmbeddedVm => Arc::new(embedded::EmbeddedVmEvaluator::new()),
            #[cfg(not(feature = "embedded-vm"))]
            BackendKind::EmbeddedVm => Arc::new(native::NativeEvaluator::new()),
            BackendKind::RestrictedNative => Arc::new(native::NativeEvaluator::new()),
        };
        Self::with_evaluator(evaluator, options.timeout_ms)
    }

    /// Engine on the restricted native backend; no probing.
    pub fn native(timeout_ms: u64) -> Self {
        Self::with_evaluator(Arc::new(native::NativeEvaluator::new()), timeout_ms)
    }

    pub fn with_evaluator(evaluator: Arc<dyn Evaluator>, timeout_ms: u64) -> Self {
        Self {
            evaluator,
            timeout_ms: timeout_ms.max(1),
        }
    }

    pub fn backend(&self) -> BackendKind {
        self.evaluator.kind()
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// The code the selected backend would evaluate.
    pub fn normalized(&self, code: &str) -> NormalizedCode {
        normalize(code, self.evaluator.dialect())
    }

    /// Execute with the engine's configured timeout.
    pub async fn run(&self, code: &str, snapshot: Snapshot) -> Result<Evaluation, ExecutionError> {
        self.execute(code, snapshot, self.timeout_ms).await
    }

    /// Run `code` against `snapshot`.
    ///
    /// An empty or whitespace-only script yields `null` without touching a
    /// backend. On failure no queued calls are returned.
    pub async fn execute(
        &self,
        code: &str,
        snapshot: Snapshot,
        timeout_ms: u64,
    ) -> Result<Evaluation, ExecutionError> {
        if code.trim().is_empty() {
            return Ok(Evaluation::default());
        }
        let normalized = self.normalized(code);
        debug!(backend = %self.backend(), implicit_return = normalized.implicit_return, "evaluating script");

        let timeout = Duration::from_millis(timeout_ms.max(1));
        self.evaluator
            .evaluate(normalized, Arc::new(snapshot), timeout)
            .await
    }
}
