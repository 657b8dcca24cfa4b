// src/engine/backend.rs

//! Pluggable evaluator backend abstraction.
//!
//! The facade talks to an [`Evaluator`] instead of a concrete interpreter.
//! Three implementations exist, in preference order:
//!
//! - [`ExternalProcessEvaluator`](super::external::ExternalProcessEvaluator):
//!   a full JavaScript runtime (`node`) in a child process.
//! - `EmbeddedVmEvaluator`: a JavaScript VM linked into the binary (cargo
//!   feature `embedded-vm`).
//! - [`NativeEvaluator`](super::native::NativeEvaluator): the restricted
//!   evaluator in [`crate::script`]. Always available.
//!
//! Which one runs is a pure function ([`select`]) of the configured
//! preference and a one-time availability probe.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::debug;

use super::outcome::{emit_console_line, ConsoleLine, Evaluation, QueuedCall};
use crate::errors::{ErrorKind, ExecutionError};
use crate::snapshot::Snapshot;
use crate::transpile::{Dialect, NormalizedCode};
use crate::types::BackendPreference;

pub type EvalFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Evaluation, ExecutionError>> + Send + 'a>>;

/// Trait abstracting how normalized code is evaluated.
pub trait Evaluator: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Dialect the transpiler must produce for this backend.
    fn dialect(&self) -> Dialect;

    /// Evaluate `code` against `snapshot`, failing with `Timeout` once
    /// `timeout` has elapsed.
    fn evaluate(
        &self,
        code: NormalizedCode,
        snapshot: Arc<Snapshot>,
        timeout: Duration,
    ) -> EvalFuture<'_>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    ExternalProcess,
    EmbeddedVm,
    RestrictedNative,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::ExternalProcess => "external_process",
            BackendKind::EmbeddedVm => "embedded_vm",
            BackendKind::RestrictedNative => "restricted_native",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of probing which optional backends can run in this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Availability {
    pub external: bool,
    pub embedded: bool,
}

/// Outcome of [`select`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub kind: BackendKind,
    /// The backend that was wanted but unavailable, if any.
    pub fell_back_from: Option<BackendKind>,
}

/// Pick a backend.
///
/// `Auto` takes the first available of external > embedded > native. A
/// forced backend that isn't available falls further down the same order.
pub fn select(preference: BackendPreference, available: Availability) -> Selection {
    let order: &[BackendKind] = match preference {
        BackendPreference::Auto | BackendPreference::External => &[
            BackendKind::ExternalProcess,
            BackendKind::EmbeddedVm,
            BackendKind::RestrictedNative,
        ],
        BackendPreference::Embedded => &[BackendKind::EmbeddedVm, BackendKind::RestrictedNative],
        BackendPreference::Native => &[BackendKind::RestrictedNative],
    };
    let is_available = |kind: &BackendKind| match kind {
        BackendKind::ExternalProcess => available.external,
        BackendKind::EmbeddedVm => available.embedded,
        BackendKind::RestrictedNative => true,
    };

    let kind = order
        .iter()
        .copied()
        .find(is_available)
        .unwrap_or(BackendKind::RestrictedNative);
    let wanted = order[0];
    let fell_back_from = (wanted != kind).then_some(wanted);
    Selection { kind, fell_back_from }
}

/// Process-wide probe result; computed on first use.
static AVAILABILITY: OnceCell<Availability> = OnceCell::const_new();

/// Probe once per process. `node_path` is only consulted by the first call.
pub async fn probe_once(node_path: &Path) -> Availability {
    *AVAILABILITY.get_or_init(|| probe(node_path)).await
}

/// Probe backend availability without caching.
pub async fn probe(node_path: &Path) -> Availability {
    let external = node_available(node_path).await;
    let embedded = cfg!(feature = "embedded-vm");
    debug!(external, embedded, "probed evaluator backends");
    Availability { external, embedded }
}

async fn node_available(node_path: &Path) -> bool {
    let mut cmd = Command::new(node_path);
    cmd.arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let Ok(mut child) = cmd.spawn() else {
        return false;
    };
    matches!(
        tokio::time::timeout(Duration::from_secs(5), child.wait()).await,
        Ok(Ok(status)) if status.success()
    )
}

/// Request handed to the JavaScript harness.
#[derive(Debug, Serialize)]
pub(crate) struct HarnessRequest<'a> {
    pub code: &'a str,
    pub states: serde_json::Value,
    pub catalog: serde_json::Value,
    pub timeout_ms: u64,
}

impl<'a> HarnessRequest<'a> {
    pub(crate) fn new(code: &'a NormalizedCode, snapshot: &Snapshot, timeout: Duration) -> Self {
        Self {
            code: code.as_str(),
            states: snapshot.states_json(),
            catalog: snapshot.catalog_json(),
            timeout_ms: timeout_millis(timeout),
        }
    }
}

pub(crate) fn timeout_millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

/// JSON envelope the JavaScript harness prints / returns.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    ok: bool,
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    calls: Vec<QueuedCall>,
    #[serde(default)]
    logs: Vec<ConsoleLine>,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl Envelope {
    pub(crate) fn parse(text: &str) -> Result<Self, ExecutionError> {
        let line = text.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
        serde_json::from_str(line).map_err(|err| {
            ExecutionError::runtime(format!("malformed evaluator output: {err}"))
        })
    }

    /// Forward captured console lines and convert to an execution result.
    pub(crate) fn into_result(self, timeout_ms: u64) -> Result<Evaluation, ExecutionError> {
        for line in &self.logs {
            emit_console_line(line);
        }
        if self.ok {
            return Ok(Evaluation {
                value: self.result,
                calls: self.calls,
                console: self.logs,
            });
        }
        let message = self.message.unwrap_or_default();
        Err(match self.kind.as_deref() {
            Some("SyntaxError") => ExecutionError::new(ErrorKind::SyntaxError, message),
            Some("Timeout") => ExecutionError::timeout(timeout_ms),
            _ => ExecutionError::new(ErrorKind::RuntimeError, message),
        })
    }
}

/// Harness shared by the JavaScript backends: builds the capability
/// namespace and settles a run into an [`Envelope`].
pub(crate) const SANDBOX_JS: &str = include_str!("harness/sandbox.js");

/// Runs one request against the namespace from [`SANDBOX_JS`].
pub(crate) const GUEST_JS: &str = include_str!("harness/guest.js");

/// Expressions that reach the host process if the sandbox leaks; each must
/// throw or evaluate to `undefined`.
#[cfg(test)]
pub(crate) const HOST_ESCAPES: &[&str] = &[
    "process",
    "require",
    "globalThis.process",
    "this.constructor.constructor('return process')()",
    "services.call.constructor('return process')()",
    "utils.getEntity.constructor('return process')()",
    "console.log.constructor('return this.process')()",
    "states.constructor.constructor('return process')()",
    "Function('return process')()",
];

/// Script reporting `typeof <escape>`, or `"blocked"` when it throws.
#[cfg(test)]
pub(crate) fn escape_script(escape: &str) -> String {
    format!("try {{ return typeof ({escape}); }} catch (e) {{ return 'blocked'; }}")
}
