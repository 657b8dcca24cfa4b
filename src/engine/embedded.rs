// src/engine/embedded.rs

//! Backend running scripts in a JavaScript VM linked into the binary
//! (`boa_engine`, cargo feature `embedded-vm`).

use std::sync::Arc;
use std::time::{Duration, Instant};

use boa_engine::{context::ContextBuilder, Source};
use tracing::warn;

use super::backend::{
    timeout_millis, BackendKind, Envelope, EvalFuture, Evaluator, HarnessRequest, GUEST_JS,
    SANDBOX_JS,
};
use crate::errors::ExecutionError;
use crate::snapshot::Snapshot;
use crate::transpile::{Dialect, NormalizedCode};

/// Upper bound on loop iterations inside the VM. A script still spinning
/// after this is reported as a timeout.
const LOOP_ITERATION_LIMIT: u64 = 50_000_000;
const RECURSION_LIMIT: usize = 512;

#[derive(Debug, Clone, Default)]
pub struct EmbeddedVmEvaluator;

impl EmbeddedVmEvaluator {
    pub fn new() -> Self {
        Self
    }
}

/// Evaluate on the current thread. Returns the envelope text, or the VM's
/// own error message when the harness itself couldn't finish.
fn run_in_vm(request_json: &str) -> Result<String, String> {
    let mut context = ContextBuilder::new().build().map_err(|e| e.to_string())?;
    context
        .runtime_limits_mut()
        .set_loop_iteration_limit(LOOP_ITERATION_LIMIT);
    context.runtime_limits_mut().set_recursion_limit(RECURSION_LIMIT);

    let program = format!("{SANDBOX_JS}\n{GUEST_JS}\n__tickscriptGuest({request_json});");
    let value = context
        .eval(Source::from_bytes(program.as_bytes()))
        .map_err(|e| e.to_string())?;
    let text = value.to_string(&mut context).map_err(|e| e.to_string())?;
    Ok(text.to_std_string_escaped())
}

impl Evaluator for EmbeddedVmEvaluator {
    fn kind(&self) -> BackendKind {
        BackendKind::EmbeddedVm
    }

    fn dialect(&self) -> Dialect {
        Dialect::JavaScript
    }

    fn evaluate(
        &self,
        code: NormalizedCode,
        snapshot: Arc<Snapshot>,
        timeout: Duration,
    ) -> EvalFuture<'_> {
        Box::pin(async move {
            let timeout_ms = timeout_millis(timeout);
            let request = serde_json::to_string(&HarnessRequest::new(&code, &snapshot, timeout))
                .map_err(|err| ExecutionError::runtime(format!("encoding request: {err}")))?;

            let started = Instant::now();
            let worker = tokio::task::spawn_blocking(move || run_in_vm(&request));

            // A worker that outlives the timeout keeps running until the
            // loop limit stops it; its result is discarded.
            match tokio::time::timeout(timeout, worker).await {
                Ok(Ok(Ok(text))) => Envelope::parse(&text)?.into_result(timeout_ms),
                Ok(Ok(Err(vm_error))) if started.elapsed() >= timeout => {
                    warn!(error = %vm_error, "embedded VM stopped after deadline");
                    Err(ExecutionError::timeout(timeout_ms))
                }
                Ok(Ok(Err(vm_error))) => {
                    if vm_error.contains("iteration limit") {
                        Err(ExecutionError::timeout(timeout_ms))
                    } else {
                        Err(ExecutionError::runtime(vm_error))
                    }
                }
                Ok(Err(join_err)) => Err(ExecutionError::runtime(format!(
                    "evaluator crashed: {join_err}"
                ))),
                Err(_) => Err(ExecutionError::timeout(timeout_ms)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::backend::{escape_script, HOST_ESCAPES};
    use crate::errors::ErrorKind;
    use crate::snapshot::{SnapshotProvider, StaticSnapshotProvider};
    use crate::transpile::normalize;
    use serde_json::json;

    fn snapshot() -> Arc<Snapshot> {
        Arc::new(StaticSnapshotProvider::from_pairs([("switch.pump", "on")]).read_all())
    }

    #[tokio::test]
    async fn evaluates_with_capabilities() {
        let code = normalize(
            "if (utils.isOn('switch.pump')) services.turnOff('switch.pump');\nreturn [1, 2, 3].map(x => x * 2);",
            Dialect::JavaScript,
        );
        let out = EmbeddedVmEvaluator::new()
            .evaluate(code, snapshot(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.value, json!([2, 4, 6]));
        assert_eq!(out.calls[0].service, "turn_off");
    }

    #[tokio::test]
    async fn thrown_errors_are_runtime_errors() {
        let code = normalize("throw new Error('nope')", Dialect::JavaScript);
        let err = EmbeddedVmEvaluator::new()
            .evaluate(code, snapshot(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::RuntimeError);
        assert_eq!(err.message, "Error: nope");
    }

    #[tokio::test]
    async fn host_is_unreachable() {
        for escape in HOST_ESCAPES {
            let code = normalize(&escape_script(escape), Dialect::JavaScript);
            let out = EmbeddedVmEvaluator::new()
                .evaluate(code, snapshot(), Duration::from_secs(5))
                .await
                .unwrap();
            assert!(
                out.value == json!("undefined") || out.value == json!("blocked"),
                "{escape} gave {}",
                out.value
            );
        }
    }
}
