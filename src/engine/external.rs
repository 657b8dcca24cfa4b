// src/engine/external.rs

//! Backend running scripts in an external JavaScript runtime (`node`).
//!
//! One child process per execution. The request goes in on stdin, the
//! envelope comes back as the last line of stdout. The child is killed when
//! the future is dropped, so an outer timeout also reaps the process.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::backend::{
    timeout_millis, BackendKind, Envelope, EvalFuture, Evaluator, HarnessRequest, GUEST_JS,
    SANDBOX_JS,
};
use crate::errors::ExecutionError;
use crate::snapshot::Snapshot;
use crate::transpile::{Dialect, NormalizedCode};

const NODE_ENTRY_JS: &str = include_str!("harness/node.js");

#[derive(Debug, Clone)]
pub struct ExternalProcessEvaluator {
    node_path: PathBuf,
    program: Arc<str>,
}

impl ExternalProcessEvaluator {
    pub fn new(node_path: impl Into<PathBuf>) -> Self {
        Self {
            node_path: node_path.into(),
            program: Arc::from(format!("{SANDBOX_JS}\n{GUEST_JS}\n{NODE_ENTRY_JS}")),
        }
    }

    async fn run_child(&self, payload: Vec<u8>) -> Result<String> {
        let mut cmd = Command::new(&self.node_path);
        cmd.arg("-e")
            .arg(&*self.program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning {:?}", self.node_path))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&payload).await.context("writing script request")?;
            // Dropping stdin closes the pipe so the harness sees `end`.
        }

        let output = child
            .wait_with_output()
            .await
            .context("waiting for evaluator process")?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        let status = output.status;
        if !stderr.trim().is_empty() {
            debug!(stderr = %stderr.trim(), "evaluator stderr");
        }
        if stdout.trim().is_empty() {
            anyhow::bail!("evaluator exited with {status} and no output");
        }
        Ok(stdout)
    }
}

impl Evaluator for ExternalProcessEvaluator {
    fn kind(&self) -> BackendKind {
        BackendKind::ExternalProcess
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
            let payload = serde_json::to_vec(&HarnessRequest::new(&code, &snapshot, timeout))
                .map_err(|err| ExecutionError::runtime(format!("encoding request: {err}")))?;

            // The harness enforces `timeout` on the script itself; the outer
            // bound also covers process start-up.
            let outer = timeout + Duration::from_secs(2);
            match tokio::time::timeout(outer, self.run_child(payload)).await {
                Ok(Ok(stdout)) => Envelope::parse(&stdout)?.into_result(timeout_ms),
                Ok(Err(err)) => {
                    warn!(error = %err, "external evaluator failed");
                    Err(ExecutionError::runtime(format!("{err:#}")))
                }
                Err(_) => Err(ExecutionError::timeout(timeout_ms)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::backend::{escape_script, probe, HOST_ESCAPES};
    use crate::errors::ErrorKind;
    use crate::snapshot::{SnapshotProvider, StaticSnapshotProvider};
    use crate::transpile::normalize;
    use serde_json::json;
    use std::path::Path;

    async fn node() -> Option<ExternalProcessEvaluator> {
        probe(Path::new("node"))
            .await
            .external
            .then(|| ExternalProcessEvaluator::new("node"))
    }

    fn snapshot() -> Arc<Snapshot> {
        Arc::new(StaticSnapshotProvider::from_pairs([("light.kitchen", "on")]).read_all())
    }

    #[tokio::test]
    async fn runs_full_javascript_when_node_is_installed() {
        let Some(evaluator) = node().await else {
            return;
        };
        let code = normalize(
            "const on = utils.filterByDomain('light').filter(id => utils.isOn(id));\n\
             services.turnOff(on[0]);\n\
             console.log('turned off', on.length);\n\
             return { on, label: `${on.length} on` };",
            Dialect::JavaScript,
        );
        let out = evaluator
            .evaluate(code, snapshot(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.value, json!({ "on": ["light.kitchen"], "label": "1 on" }));
        assert_eq!(out.calls.len(), 1);
        assert_eq!(out.calls[0].data["entity_id"], json!("light.kitchen"));
        assert_eq!(out.console[0].message, "turned off 1");
    }

    #[tokio::test]
    async fn classifies_failures_when_node_is_installed() {
        let Some(evaluator) = node().await else {
            return;
        };
        let syntax = evaluator
            .evaluate(normalize("return (", Dialect::JavaScript), snapshot(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(syntax.kind, ErrorKind::SyntaxError);

        let looped = evaluator
            .evaluate(normalize("while (true) {}", Dialect::JavaScript), snapshot(), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert_eq!(looped.kind, ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn host_process_is_unreachable_when_node_is_installed() {
        let Some(evaluator) = node().await else {
            return;
        };
        for escape in HOST_ESCAPES {
            let code = normalize(&escape_script(escape), Dialect::JavaScript);
            let out = evaluator
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

    #[tokio::test]
    async fn equality_never_coerces_when_node_is_installed() {
        let Some(evaluator) = node().await else {
            return;
        };
        let snapshot = Arc::new(StaticSnapshotProvider::from_pairs([("sensor.t", "5")]).read_all());
        let code = normalize(
            "const t = states['sensor.t'].state;\n\
             return [t == 5, t === 5, t != '5', states['sensor.none']?.state == null, t == undefined];",
            Dialect::JavaScript,
        );
        let out = evaluator
            .evaluate(code, snapshot, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.value, json!([false, false, false, true, false]));
    }

    #[tokio::test]
    async fn missing_runtime_is_a_runtime_error() {
        let evaluator = ExternalProcessEvaluator::new("/nonexistent/tickscript-node");
        let err = evaluator
            .evaluate(normalize("return 1", Dialect::JavaScript), snapshot(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::RuntimeError);
    }
}
