// src/engine/native.rs

//! Backend wrapping the restricted evaluator in [`crate::script`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use super::backend::{timeout_millis, BackendKind, EvalFuture, Evaluator};
use crate::errors::ExecutionError;
use crate::script::{self, Limits};
use crate::snapshot::Snapshot;
use crate::transpile::{Dialect, NormalizedCode};

/// Runs the interpreter on a blocking worker. The interpreter checks its own
/// deadline; the outer timeout only guards against a worker that never
/// reaches a check, and raises the cancel flag when it fires.
#[derive(Debug, Clone, Default)]
pub struct NativeEvaluator;

impl NativeEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl Evaluator for NativeEvaluator {
    fn kind(&self) -> BackendKind {
        BackendKind::RestrictedNative
    }

    fn dialect(&self) -> Dialect {
        Dialect::Native
    }

    fn evaluate(
        &self,
        code: NormalizedCode,
        snapshot: Arc<Snapshot>,
        timeout: Duration,
    ) -> EvalFuture<'_> {
        Box::pin(async move {
            let timeout_ms = timeout_millis(timeout);
            let cancel = Arc::new(AtomicBool::new(false));
            let limits = Limits {
                deadline: Instant::now() + timeout,
                timeout_ms,
                cancel: cancel.clone(),
            };

            let worker =
                tokio::task::spawn_blocking(move || script::run(code.as_str(), &snapshot, limits));

            // Grace period on top of the interpreter's own deadline.
            match tokio::time::timeout(timeout + Duration::from_millis(250), worker).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_err)) => {
                    warn!(error = %join_err, "native evaluator worker failed");
                    Err(ExecutionError::runtime(format!("evaluator crashed: {join_err}")))
                }
                Err(_) => {
                    cancel.store(true, Ordering::Relaxed);
                    Err(ExecutionError::timeout(timeout_ms))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::snapshot::StaticSnapshotProvider;
    use crate::snapshot::SnapshotProvider;
    use crate::transpile::normalize;
    use serde_json::json;

    fn snapshot() -> Arc<Snapshot> {
        Arc::new(StaticSnapshotProvider::from_pairs([("switch.fan", "off")]).read_all())
    }

    #[tokio::test]
    async fn evaluates_normalized_code() {
        let code = normalize("const s = states['switch.fan'].state; return `fan is ${s}`", Dialect::Native);
        let out = NativeEvaluator::new()
            .evaluate(code, snapshot(), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(out.value, json!("fan is off"));
    }

    #[tokio::test]
    async fn infinite_loop_reports_timeout() {
        let code = normalize("while (true) { }", Dialect::Native);
        let err = NativeEvaluator::new()
            .evaluate(code, snapshot(), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
    }
}
